//! Wire models of the Vultr v2 load balancer API.
//!
//! Fields the operator never reads are left out. Every field is
//! defaulted on deserialization since the API omits empty values.

use serde::{Deserialize, Serialize};

/// Load balancer as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancer {
    pub id: String,
    pub date_created: String,
    pub region: String,
    pub label: String,
    pub status: String,
    pub ipv4: String,
    pub ipv6: String,
    pub generic_info: GenericInfo,
    pub health_check: HealthCheck,
    pub has_ssl: bool,
    pub forwarding_rules: Vec<ForwardingRule>,
    pub instances: Vec<String>,
    pub firewall_rules: Vec<FirewallRule>,
    pub nodes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericInfo {
    pub balancing_algorithm: String,
    pub ssl_redirect: bool,
    pub http2: bool,
    pub http3: bool,
    pub proxy_protocol: bool,
    pub timeout: u32,
    pub sticky_sessions: StickySessions,
    pub vpc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheck {
    pub protocol: String,
    pub port: u16,
    pub path: String,
    pub check_interval: u32,
    pub response_timeout: u32,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickySessions {
    pub cookie_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingRule {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub frontend_protocol: String,
    pub frontend_port: u16,
    pub backend_protocol: String,
    pub backend_port: u16,
}

impl ForwardingRule {
    /// Identity of a rule regardless of the id the API assigned to it.
    #[must_use]
    pub fn key(&self) -> (&str, u16, &str, u16) {
        (
            self.frontend_protocol.as_str(),
            self.frontend_port,
            self.backend_protocol.as_str(),
            self.backend_port,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallRule {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub port: u16,
    pub source: String,
    pub ip_type: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ssl {
    pub private_key: String,
    pub certificate: String,
}

impl std::fmt::Debug for Ssl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ssl").finish_non_exhaustive()
    }
}

/// Body of create and update calls.
///
/// `forwarding_rules` and `instances` are only sent on creation.
/// Afterwards they are converged one by one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadBalancerReq {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub label: String,
    pub balancing_algorithm: String,
    pub ssl_redirect: bool,
    pub http2: bool,
    pub http3: bool,
    pub proxy_protocol: bool,
    pub timeout: u32,
    pub nodes: u32,
    pub health_check: HealthCheck,
    pub sticky_session: StickySessions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl: Option<Ssl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarding_rules: Option<Vec<ForwardingRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<String>>,
    pub firewall_rules: Vec<FirewallRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Links {
    pub next: String,
    pub prev: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub total: u64,
    pub links: Links,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoadBalancerList {
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoadBalancerEnvelope {
    pub load_balancer: LoadBalancer,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForwardingRuleList {
    #[serde(default)]
    pub forwarding_rules: Vec<ForwardingRule>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InstancesUpdate<'a> {
    pub instances: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ApiErrorBody {
    pub error: String,
}
