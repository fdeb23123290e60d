//! Durable link between a service and its remote load balancer.
//!
//! The id is stored as an annotation on the service. All writes go through
//! a freshly read copy so concurrent writers are never clobbered, and
//! conflicting writes are retried a bounded number of times.

use std::{sync::Arc, time::Duration};

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

use crate::{
    annotations, consts,
    error::{VultrLBError, VultrLBResult},
    locator::Locator,
    store::ObjectStore,
    vultr::LoadBalancer,
};

pub struct BindingManager {
    store: Arc<dyn ObjectStore>,
    locator: Locator,
}

impl BindingManager {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, locator: Locator) -> Self {
        Self { store, locator }
    }

    /// Make sure `svc` is bound to `expected_id`.
    ///
    /// When the service is bound to another id that no longer resolves to
    /// this service's balancer, the binding is cleared and
    /// [`VultrLBError::RecreationNeeded`] is returned.
    #[tracing::instrument(skip(self, svc), fields(service = svc.name_any()))]
    pub async fn bind(&self, svc: &Service, expected_id: &str) -> VultrLBResult<()> {
        let namespace = svc.namespace().ok_or(VultrLBError::SkipService)?;
        let name = svc.name_any();
        for attempt in 1..=consts::BIND_MAX_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(backoff(attempt - 1)).await;
            }
            match self.try_bind(&namespace, &name, expected_id).await {
                Err(VultrLBError::Conflict(target)) => {
                    tracing::debug!(
                        "Conflict while binding {target} (attempt {attempt}/{})",
                        consts::BIND_MAX_ATTEMPTS
                    );
                }
                result => return result,
            }
        }
        Err(VultrLBError::BindRetriesExhausted(
            format!("{namespace}/{name}"),
            consts::BIND_MAX_ATTEMPTS,
        ))
    }

    async fn try_bind(&self, namespace: &str, name: &str, expected_id: &str) -> VultrLBResult<()> {
        let mut fresh = self.store.get_service(namespace, name).await?;
        if let Some(current) = annotations::load_balancer_id(fresh.annotations()) {
            if current == expected_id {
                tracing::debug!("Service is already bound to load balancer {expected_id}");
                return Ok(());
            }
            let current = current.to_string();
            self.validate_previous(&fresh, &current).await?;
            tracing::warn!(
                "Replacing valid but different load balancer ID {current} with {expected_id}"
            );
        }
        fresh
            .annotations_mut()
            .insert(consts::LB_ID_ANN_NAME.to_string(), expected_id.to_string());
        self.store.replace_service(&fresh).await?;
        tracing::info!("Bound service {namespace}/{name} to load balancer {expected_id}");
        Ok(())
    }

    /// Check the balancer the service's binding resolved to.
    ///
    /// A bound balancer labelled for another service means the binding is
    /// stale, e.g. copied along with a manifest. It is cleared before
    /// anything touches the balancer.
    pub async fn verify(&self, svc: &Service, lb: &LoadBalancer) -> VultrLBResult<()> {
        if annotations::load_balancer_id(svc.annotations()) != Some(lb.id.as_str())
            || belongs_to(svc, lb)
        {
            return Ok(());
        }
        let reason = format!(
            "label {} does not match {}",
            lb.label,
            annotations::load_balancer_name(svc)
        );
        Err(self.clear(svc, &lb.id, reason).await?)
    }

    /// Succeeds if `id` still resolves to a balancer labelled for `svc`.
    /// Otherwise the stale binding is removed.
    async fn validate_previous(&self, svc: &Service, id: &str) -> VultrLBResult<()> {
        let reason = match self.locator.find_by_id(id).await? {
            Some(lb) if belongs_to(svc, &lb) => return Ok(()),
            Some(lb) => format!(
                "label {} does not match {}",
                lb.label,
                annotations::load_balancer_name(svc)
            ),
            None => "load balancer does not exist".to_string(),
        };
        Err(self.clear(svc, id, reason).await?)
    }

    /// Remove the binding from a fresh copy of `svc`.
    /// Returns the error the caller should report.
    async fn clear(&self, svc: &Service, id: &str, reason: String) -> VultrLBResult<VultrLBError> {
        let namespace = svc.namespace().unwrap_or_default();
        let mut fresh = self.store.get_service(&namespace, &svc.name_any()).await?;
        fresh.annotations_mut().remove(consts::LB_ID_ANN_NAME);
        self.store.replace_service(&fresh).await?;
        tracing::info!("Cleared stale load balancer ID {id}: {reason}");
        Ok(VultrLBError::RecreationNeeded {
            id: id.to_string(),
            reason,
        })
    }
}

/// Whether `lb` carries a label this service would look it up by.
#[must_use]
pub fn belongs_to(svc: &Service, lb: &LoadBalancer) -> bool {
    lb.label == annotations::load_balancer_name(svc)
        || lb.label == annotations::default_load_balancer_name(svc)
}

/// Delay before the given retry: 50ms, 100ms, 200ms...
fn backoff(retry: u32) -> Duration {
    Duration::from_millis(consts::BIND_BACKOFF_BASE_MS << (retry - 1))
}
