//! Vultr API collaborator.

use async_trait::async_trait;

use crate::error::VultrLBResult;

pub mod client;
pub mod metadata;
pub mod models;

pub use client::VultrClient;
pub use models::{ForwardingRule, LoadBalancer, LoadBalancerReq, Meta};

/// Operations the operator needs from the Vultr API.
///
/// Lookups that can legitimately miss return `Option`,
/// every other failure is an error.
#[async_trait]
pub trait VultrApi: Send + Sync {
    /// One page of load balancers, starting at `cursor`.
    async fn list_load_balancers(
        &self,
        cursor: Option<&str>,
        per_page: u32,
    ) -> VultrLBResult<(Vec<LoadBalancer>, Meta)>;
    async fn get_load_balancer(&self, id: &str) -> VultrLBResult<Option<LoadBalancer>>;
    async fn create_load_balancer(&self, req: &LoadBalancerReq) -> VultrLBResult<LoadBalancer>;
    async fn update_load_balancer(&self, id: &str, req: &LoadBalancerReq) -> VultrLBResult<()>;
    async fn delete_load_balancer(&self, id: &str) -> VultrLBResult<()>;
    /// Remove the certificate installed on the load balancer.
    async fn delete_ssl(&self, id: &str) -> VultrLBResult<()>;

    async fn list_forwarding_rules(&self, id: &str) -> VultrLBResult<Vec<ForwardingRule>>;
    async fn create_forwarding_rule(&self, id: &str, rule: &ForwardingRule) -> VultrLBResult<()>;
    async fn delete_forwarding_rule(&self, id: &str, rule_id: &str) -> VultrLBResult<()>;

    /// Instance ids currently attached as backends.
    async fn list_instances(&self, id: &str) -> VultrLBResult<Vec<String>>;
    async fn attach_instance(&self, id: &str, instance: &str) -> VultrLBResult<()>;
    async fn detach_instance(&self, id: &str, instance: &str) -> VultrLBResult<()>;
}
