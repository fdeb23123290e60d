use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use k8s_openapi::api::core::v1::{LoadBalancerIngress, Node, Service};
use kube::ResourceExt;

use crate::{
    annotations,
    binding::{self, BindingManager},
    consts,
    desired::{DesiredLBConfig, DesiredStateBuilder},
    error::{VultrLBError, VultrLBResult},
    locator::Locator,
    secrets::SecretRegistry,
    store::ObjectStore,
    vultr::{ForwardingRule, LoadBalancer, VultrApi},
};

/// Reconciliation engine.
///
/// Converges the Vultr load balancer of a service to the state described
/// by its annotations and the backend nodes. Every operation is a single
/// pass; retries and requeues belong to the caller.
pub struct LoadBalancers {
    api: Arc<dyn VultrApi>,
    locator: Locator,
    binding: BindingManager,
    builder: DesiredStateBuilder,
    /// Region new load balancers are created in.
    region: String,
    /// Fingerprint of the TLS material last pushed to each load balancer.
    /// The API never returns certificates, so this is the only way to tell
    /// whether a rotated secret still has to be uploaded.
    ssl_fingerprints: Mutex<HashMap<String, String>>,
}

impl LoadBalancers {
    #[must_use]
    pub fn new(
        api: Arc<dyn VultrApi>,
        store: Arc<dyn ObjectStore>,
        registry: SecretRegistry,
        region: String,
        vpc_id: Option<String>,
    ) -> Self {
        let locator = Locator::new(api.clone());
        Self {
            binding: BindingManager::new(store.clone(), locator.clone()),
            builder: DesiredStateBuilder::new(store, registry, vpc_id),
            api,
            locator,
            region,
            ssl_fingerprints: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn get_load_balancer_name(&self, svc: &Service) -> String {
        annotations::load_balancer_name(svc)
    }

    /// Current ingress of the service's load balancer, and whether it exists.
    pub async fn get_load_balancer(
        &self,
        svc: &Service,
    ) -> VultrLBResult<(Vec<LoadBalancerIngress>, bool)> {
        let Some(lb) = self.locator.locate(svc).await? else {
            return Ok((Vec::new(), false));
        };
        let hostname = annotations::hostname(svc.annotations())?;
        Ok((ingress(svc, &lb, hostname.as_deref()), true))
    }

    /// Create the load balancer if needed, then converge it.
    #[tracing::instrument(skip(self, svc, nodes), fields(service = svc.name_any()))]
    pub async fn ensure_load_balancer(
        &self,
        svc: &Service,
        nodes: &[Node],
    ) -> VultrLBResult<Vec<LoadBalancerIngress>> {
        let Some(lb) = self.locator.locate(svc).await? else {
            if let Some(id) = annotations::load_balancer_id(svc.annotations()) {
                return Err(VultrLBError::BoundLoadBalancerMissing {
                    id: id.to_string(),
                    service: service_key(svc),
                });
            }
            return self.create(svc, nodes).await;
        };
        tracing::info!("Found load balancer {} ({})", lb.label, lb.id);
        let desired = self.converge(svc, nodes, &lb).await?;
        Ok(ingress(svc, &lb, desired.hostname.as_deref()))
    }

    /// Converge an existing load balancer.
    #[tracing::instrument(skip(self, svc, nodes), fields(service = svc.name_any()))]
    pub async fn update_load_balancer(&self, svc: &Service, nodes: &[Node]) -> VultrLBResult<()> {
        let lb = self
            .locator
            .locate(svc)
            .await?
            .ok_or(VultrLBError::LoadBalancerNotFound)?;
        self.converge(svc, nodes, &lb).await?;
        Ok(())
    }

    /// Delete the load balancer. Absence is success.
    ///
    /// A bound balancer labelled for another service is left alone.
    #[tracing::instrument(skip(self, svc), fields(service = svc.name_any()))]
    pub async fn ensure_load_balancer_deleted(&self, svc: &Service) -> VultrLBResult<()> {
        let Some(lb) = self.locator.locate(svc).await? else {
            tracing::debug!("Load balancer does not exist, nothing to delete");
            return Ok(());
        };
        if !binding::belongs_to(svc, &lb) {
            tracing::warn!(
                "Bound load balancer {} is labelled {}, not deleting it",
                lb.id,
                lb.label
            );
            return Ok(());
        }
        tracing::info!("Deleting load balancer {} ({})", lb.label, lb.id);
        self.api.delete_load_balancer(&lb.id).await?;
        self.forget_ssl(&lb.id);
        Ok(())
    }

    async fn create(&self, svc: &Service, nodes: &[Node]) -> VultrLBResult<Vec<LoadBalancerIngress>> {
        if !annotations::creation_enabled(svc.annotations()) {
            return Err(VultrLBError::CreationDisabled(consts::LB_CREATE_ANN_NAME));
        }
        let desired = self.builder.build(svc, nodes).await?;
        tracing::info!(
            "Creating load balancer {} in region {}",
            desired.label,
            self.region
        );
        let lb = self
            .api
            .create_load_balancer(&desired.create_request(&self.region))
            .await?;
        tracing::info!("Created load balancer {}", lb.id);
        if let Some(fingerprint) = desired.ssl_fingerprint() {
            self.remember_ssl(&lb.id, fingerprint);
        }
        self.binding.bind(svc, &lb.id).await?;
        ensure_active(&lb)?;
        Ok(ingress(svc, &lb, desired.hostname.as_deref()))
    }

    /// Verify and bind a located balancer, then bring it to the desired state.
    async fn converge(
        &self,
        svc: &Service,
        nodes: &[Node],
        lb: &LoadBalancer,
    ) -> VultrLBResult<DesiredLBConfig> {
        self.binding.verify(svc, lb).await?;
        self.binding.bind(svc, &lb.id).await?;
        ensure_active(lb)?;
        let desired = self.builder.build(svc, nodes).await?;
        self.reconcile(lb, &desired).await?;
        Ok(desired)
    }

    async fn reconcile(&self, lb: &LoadBalancer, desired: &DesiredLBConfig) -> VultrLBResult<()> {
        self.reconcile_settings(lb, desired).await?;
        self.reconcile_forwarding_rules(lb, desired).await?;
        self.reconcile_instances(lb, desired).await?;
        Ok(())
    }

    /// Everything that goes through the single update call:
    /// health check, algorithm, firewall, VPC, TLS and friends.
    async fn reconcile_settings(
        &self,
        lb: &LoadBalancer,
        desired: &DesiredLBConfig,
    ) -> VultrLBResult<()> {
        let fingerprint = desired.ssl_fingerprint();
        let push_ssl = fingerprint.as_ref().is_some_and(|fingerprint| {
            !lb.has_ssl || self.pushed_ssl(&lb.id).as_ref() != Some(fingerprint)
        });

        if desired.settings_match(lb) && !push_ssl {
            tracing::debug!("Settings of load balancer {} are up to date", lb.id);
        } else {
            tracing::info!(
                "Updating settings of load balancer {} (certificate: {push_ssl})",
                lb.id
            );
            self.api
                .update_load_balancer(&lb.id, &desired.update_request(push_ssl))
                .await?;
            if let Some(fingerprint) = fingerprint.clone().filter(|_| push_ssl) {
                self.remember_ssl(&lb.id, fingerprint);
            }
        }

        if fingerprint.is_none() && lb.has_ssl {
            tracing::info!("Removing certificate from load balancer {}", lb.id);
            self.api.delete_ssl(&lb.id).await?;
            self.forget_ssl(&lb.id);
        }
        Ok(())
    }

    /// Remove the rules that are no longer wanted, then add the missing ones.
    /// Rules present on both sides are never touched.
    async fn reconcile_forwarding_rules(
        &self,
        lb: &LoadBalancer,
        desired: &DesiredLBConfig,
    ) -> VultrLBResult<()> {
        let current = self.api.list_forwarding_rules(&lb.id).await?;
        let wanted = desired
            .forwarding_rules
            .iter()
            .map(ForwardingRule::key)
            .collect::<HashSet<_>>();
        for rule in &current {
            if !wanted.contains(&rule.key()) {
                tracing::info!(
                    "Deleting forwarding rule {}:{} -> {}:{} from load balancer {}",
                    rule.frontend_protocol,
                    rule.frontend_port,
                    rule.backend_protocol,
                    rule.backend_port,
                    lb.id,
                );
                self.api.delete_forwarding_rule(&lb.id, &rule.id).await?;
            }
        }

        let existing = current
            .iter()
            .map(ForwardingRule::key)
            .collect::<HashSet<_>>();
        for rule in &desired.forwarding_rules {
            if !existing.contains(&rule.key()) {
                tracing::info!(
                    "Adding forwarding rule {}:{} -> {}:{} to load balancer {}",
                    rule.frontend_protocol,
                    rule.frontend_port,
                    rule.backend_protocol,
                    rule.backend_port,
                    lb.id,
                );
                self.api.create_forwarding_rule(&lb.id, rule).await?;
            }
        }
        Ok(())
    }

    /// Detach stale backends, then attach the missing ones.
    async fn reconcile_instances(
        &self,
        lb: &LoadBalancer,
        desired: &DesiredLBConfig,
    ) -> VultrLBResult<()> {
        let current = self.api.list_instances(&lb.id).await?;
        for instance in &current {
            if !desired.instances.contains(instance) {
                tracing::info!("Detaching instance {instance} from load balancer {}", lb.id);
                self.api.detach_instance(&lb.id, instance).await?;
            }
        }
        for instance in &desired.instances {
            if !current.contains(instance) {
                tracing::info!("Attaching instance {instance} to load balancer {}", lb.id);
                self.api.attach_instance(&lb.id, instance).await?;
            }
        }
        Ok(())
    }

    fn pushed_ssl(&self, id: &str) -> Option<String> {
        self.ssl_fingerprints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn remember_ssl(&self, id: &str, fingerprint: String) {
        self.ssl_fingerprints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), fingerprint);
    }

    fn forget_ssl(&self, id: &str) {
        self.ssl_fingerprints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

fn service_key(svc: &Service) -> String {
    format!("{}/{}", svc.namespace().unwrap_or_default(), svc.name_any())
}

fn ensure_active(lb: &LoadBalancer) -> VultrLBResult<()> {
    if lb.status == consts::LB_STATUS_ACTIVE {
        Ok(())
    } else {
        Err(VultrLBError::NotActive(lb.status.clone()))
    }
}

/// Whether the service asked for an IPv6 address.
fn dual_stack(svc: &Service) -> bool {
    let Some(spec) = svc.spec.as_ref() else {
        return false;
    };
    spec.ip_families
        .iter()
        .flatten()
        .any(|family| family == "IPv6")
        || matches!(
            spec.ip_family_policy.as_deref(),
            Some("PreferDualStack" | "RequireDualStack")
        )
}

/// Addresses reported in the service status.
///
/// A configured hostname replaces the addresses entirely, so traffic from
/// inside the cluster still goes through the balancer.
fn ingress(svc: &Service, lb: &LoadBalancer, hostname: Option<&str>) -> Vec<LoadBalancerIngress> {
    if let Some(hostname) = hostname {
        return vec![LoadBalancerIngress {
            hostname: Some(hostname.to_string()),
            ..Default::default()
        }];
    }
    let entry = |ip: &str| LoadBalancerIngress {
        hostname: Some(lb.label.clone()),
        ip: Some(ip.to_string()),
        ..Default::default()
    };
    let mut ingress = vec![entry(&lb.ipv4)];
    if dual_stack(svc) {
        ingress.push(entry(&lb.ipv6));
    }
    ingress
}
