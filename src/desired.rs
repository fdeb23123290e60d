//! Desired state of a load balancer.
//!
//! A [`DesiredLBConfig`] is recomputed from the service and the backend
//! nodes on every reconciliation and never mutated afterwards.

use std::{collections::BTreeSet, sync::Arc};

use k8s_openapi::api::core::v1::{Node, Service, ServicePort};
use kube::ResourceExt;
use sha2::{Digest, Sha256};

use crate::{
    annotations::{self, Algorithm, LBAnnotations, Protocol, VpcSetting},
    consts,
    error::{VultrLBError, VultrLBResult},
    secrets::SecretRegistry,
    store::ObjectStore,
    vultr::{
        models::{FirewallRule, HealthCheck, Ssl, StickySessions},
        ForwardingRule, LoadBalancer, LoadBalancerReq,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredLBConfig {
    pub label: String,
    pub forwarding_rules: Vec<ForwardingRule>,
    pub health_check: HealthCheck,
    /// Cookie name, empty when sticky sessions are off.
    pub sticky_cookie: String,
    pub ssl: Option<Ssl>,
    pub firewall_rules: Vec<FirewallRule>,
    pub algorithm: Algorithm,
    pub ssl_redirect: bool,
    pub http2: bool,
    pub http3: bool,
    pub proxy_protocol: bool,
    pub timeout: u32,
    pub vpc: Option<String>,
    pub node_count: u32,
    /// Backend instance ids.
    pub instances: Vec<String>,
    /// Hostname reported as ingress instead of the balancer addresses.
    pub hostname: Option<String>,
}

impl DesiredLBConfig {
    /// Everything the update call accepts. Rules and backends are left out.
    fn settings(&self) -> LoadBalancerReq {
        LoadBalancerReq {
            label: self.label.clone(),
            balancing_algorithm: self.algorithm.as_api_str().to_string(),
            ssl_redirect: self.ssl_redirect,
            http2: self.http2,
            http3: self.http3,
            proxy_protocol: self.proxy_protocol,
            timeout: self.timeout,
            nodes: self.node_count,
            health_check: self.health_check.clone(),
            sticky_session: StickySessions {
                cookie_name: self.sticky_cookie.clone(),
            },
            firewall_rules: self.firewall_rules.clone(),
            // An empty id detaches the balancer from its VPC.
            vpc: Some(self.vpc.clone().unwrap_or_default()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn create_request(&self, region: &str) -> LoadBalancerReq {
        LoadBalancerReq {
            region: Some(region.to_string()),
            ssl: self.ssl.clone(),
            forwarding_rules: Some(self.forwarding_rules.clone()),
            instances: Some(self.instances.clone()),
            vpc: self.vpc.clone(),
            ..self.settings()
        }
    }

    /// Settings update. TLS material is only sent when `include_ssl` is set.
    #[must_use]
    pub fn update_request(&self, include_ssl: bool) -> LoadBalancerReq {
        LoadBalancerReq {
            ssl: self.ssl.clone().filter(|_| include_ssl),
            ..self.settings()
        }
    }

    /// Whether the settings of `lb` already match.
    /// TLS material is not returned by the API and is not compared.
    #[must_use]
    pub fn settings_match(&self, lb: &LoadBalancer) -> bool {
        let info = &lb.generic_info;
        lb.label == self.label
            && info.balancing_algorithm == self.algorithm.as_api_str()
            && info.ssl_redirect == self.ssl_redirect
            && info.http2 == self.http2
            && info.http3 == self.http3
            && info.proxy_protocol == self.proxy_protocol
            && info.timeout == self.timeout
            && info.sticky_sessions.cookie_name == self.sticky_cookie
            && info.vpc == self.vpc.as_deref().unwrap_or_default()
            && lb.nodes == self.node_count
            && lb.health_check == self.health_check
            && firewall_set(&lb.firewall_rules) == firewall_set(&self.firewall_rules)
    }

    /// Hex encoded SHA-256 of the certificate and key.
    #[must_use]
    pub fn ssl_fingerprint(&self) -> Option<String> {
        self.ssl.as_ref().map(|ssl| {
            let mut hasher = Sha256::new();
            hasher.update(ssl.certificate.as_bytes());
            hasher.update(b"\n");
            hasher.update(ssl.private_key.as_bytes());
            format!("{:x}", hasher.finalize())
        })
    }
}

fn firewall_set(rules: &[FirewallRule]) -> BTreeSet<(u16, &str, &str)> {
    rules
        .iter()
        .map(|rule| (rule.port, rule.source.as_str(), rule.ip_type.as_str()))
        .collect()
}

/// Builds [`DesiredLBConfig`] values.
///
/// Reads TLS secrets through the object store and registers every
/// secret it used with the secret watcher.
pub struct DesiredStateBuilder {
    store: Arc<dyn ObjectStore>,
    registry: SecretRegistry,
    /// VPC used when a service asks for one with `true`.
    vpc_id: Option<String>,
}

impl DesiredStateBuilder {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: SecretRegistry,
        vpc_id: Option<String>,
    ) -> Self {
        Self {
            store,
            registry,
            vpc_id,
        }
    }

    /// Compute the desired state of the balancer of `svc`, backed by `nodes`.
    ///
    /// Fails on the first invalid setting, so partial configs are never
    /// produced.
    pub async fn build(&self, svc: &Service, nodes: &[Node]) -> VultrLBResult<DesiredLBConfig> {
        let ann = LBAnnotations::from_service(svc)?;
        let forwarding_rules = forwarding_rules(&ann, annotations::service_ports(svc))?;
        let instances = instance_ids(nodes)?;
        let ssl = match &ann.tls_secret {
            Some(secret) => Some(self.fetch_ssl(svc, secret).await?),
            None => None,
        };

        let health_check = HealthCheck {
            protocol: ann.health_check.protocol.as_str().to_string(),
            port: ann.health_check.port,
            path: ann.health_check.path.clone(),
            check_interval: ann.health_check.interval,
            response_timeout: ann.health_check.response_timeout,
            unhealthy_threshold: ann.health_check.unhealthy_threshold,
            healthy_threshold: ann.health_check.healthy_threshold,
        };
        let firewall_rules = ann
            .firewall_rules
            .iter()
            .map(|rule| FirewallRule {
                id: String::new(),
                port: rule.port,
                source: rule.source.clone(),
                ip_type: rule.ip_family.as_str().to_string(),
            })
            .collect();
        let sticky_cookie = if ann.sticky_session.enabled {
            ann.sticky_session.cookie_name.clone()
        } else {
            String::new()
        };

        let desired = DesiredLBConfig {
            label: annotations::load_balancer_name(svc),
            forwarding_rules,
            health_check,
            sticky_cookie,
            ssl,
            firewall_rules,
            algorithm: ann.algorithm,
            ssl_redirect: ann.ssl_redirect,
            http2: ann.http2,
            http3: ann.http3,
            proxy_protocol: ann.proxy_protocol,
            timeout: ann.timeout,
            vpc: self.resolve_vpc(&ann.vpc),
            node_count: ann.node_count,
            instances,
            hostname: ann.hostname,
        };

        if let (Some(secret), Some(namespace)) = (&ann.tls_secret, svc.namespace()) {
            self.registry.register(&namespace, secret, &svc.name_any());
        }
        Ok(desired)
    }

    async fn fetch_ssl(&self, svc: &Service, secret_name: &str) -> VultrLBResult<Ssl> {
        let namespace = svc.namespace().unwrap_or_default();
        let secret = self.store.get_secret(&namespace, secret_name).await?;
        let data = secret.data.unwrap_or_default();
        let field = |key: &str| -> VultrLBResult<String> {
            let value = data
                .get(key)
                .map(|bytes| String::from_utf8_lossy(&bytes.0).trim().to_string())
                .unwrap_or_default();
            if value.is_empty() {
                return Err(VultrLBError::InvalidSecret(
                    format!("{namespace}/{secret_name}"),
                    format!("{key} is missing"),
                ));
            }
            Ok(value)
        };
        Ok(Ssl {
            certificate: field(consts::TLS_CERT_KEY)?,
            private_key: field(consts::TLS_PRIVATE_KEY_KEY)?,
        })
    }

    fn resolve_vpc(&self, setting: &VpcSetting) -> Option<String> {
        match setting {
            VpcSetting::Disabled => None,
            VpcSetting::Id(id) => Some(id.clone()),
            VpcSetting::Discover => {
                if self.vpc_id.is_none() {
                    tracing::warn!("VPC requested but none was discovered, skipping VPC attachment");
                }
                self.vpc_id.clone()
            }
        }
    }
}

/// One rule per service port: the port on the balancer forwards to the
/// node port of every backend.
pub fn forwarding_rules(
    ann: &LBAnnotations,
    ports: &[ServicePort],
) -> VultrLBResult<Vec<ForwardingRule>> {
    ports
        .iter()
        .map(|port| {
            let protocol = port.protocol.as_deref().unwrap_or("TCP");
            if !protocol.eq_ignore_ascii_case("TCP") {
                return Err(VultrLBError::InvalidServicePort(format!(
                    "port {} uses {protocol}, only TCP is supported",
                    port.port
                )));
            }
            let frontend_port = u16::try_from(port.port)
                .map_err(|_| VultrLBError::InvalidServicePort(format!("port {}", port.port)))?;
            let node_port = port.node_port.ok_or_else(|| {
                VultrLBError::InvalidServicePort(format!(
                    "port {} has no node port allocated",
                    port.port
                ))
            })?;
            let backend_port = u16::try_from(node_port)
                .map_err(|_| VultrLBError::InvalidServicePort(format!("node port {node_port}")))?;

            let frontend = if !ann.https_ports.contains(&frontend_port) {
                ann.frontend_protocol
            } else if ann.ssl_passthrough {
                Protocol::Tcp
            } else {
                Protocol::Https
            };
            let backend = backend_protocol(frontend, ann.backend_protocol);
            Ok(ForwardingRule {
                id: String::new(),
                frontend_protocol: frontend.as_str().to_string(),
                frontend_port,
                backend_protocol: backend.as_str().to_string(),
                backend_port,
            })
        })
        .collect()
}

/// TCP frontends only forward to TCP. HTTP(S) frontends forward to the
/// requested HTTP(S) backend, or to the frontend protocol otherwise.
const fn backend_protocol(frontend: Protocol, requested: Option<Protocol>) -> Protocol {
    match (frontend, requested) {
        (Protocol::Tcp, _) => Protocol::Tcp,
        (_, Some(requested @ (Protocol::Http | Protocol::Https))) => requested,
        (frontend, _) => frontend,
    }
}

pub fn instance_ids(nodes: &[Node]) -> VultrLBResult<Vec<String>> {
    nodes
        .iter()
        .map(|node| {
            let provider_id = node
                .spec
                .as_ref()
                .and_then(|spec| spec.provider_id.as_deref())
                .unwrap_or_default();
            instance_id(provider_id)
        })
        .collect()
}

/// Instance id out of a `vultr://<id>` provider id.
pub fn instance_id(provider_id: &str) -> VultrLBResult<String> {
    let invalid = |reason: &str| VultrLBError::InvalidProviderId {
        provider_id: provider_id.to_string(),
        reason: reason.to_string(),
    };
    if provider_id.is_empty() {
        return Err(invalid("provider ID cannot be empty"));
    }
    let parts = provider_id.split("://").collect::<Vec<_>>();
    let [scheme, id] = parts[..] else {
        return Err(invalid("expected format vultr://<instance id>"));
    };
    if scheme != consts::PROVIDER_NAME {
        return Err(invalid("scheme must be vultr://"));
    }
    if id.is_empty() {
        return Err(invalid("instance id is empty"));
    }
    Ok(id.to_string())
}
