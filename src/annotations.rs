//! Typed view of the service annotations.
//!
//! Every decoder reads the annotation map (and the service ports where
//! relevant) and returns either a typed value or a validation error naming
//! the annotation. A missing key always yields the documented default.
//! [`LBAnnotations::from_service`] runs all of them once, so nothing past
//! this module looks at raw annotation strings.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
    str::FromStr,
};

use k8s_openapi::api::core::v1::{Service, ServicePort};
use kube::ResourceExt;

use crate::{
    consts,
    error::{VultrLBError, VultrLBResult},
};

pub type Annotations = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Http,
    Https,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(format!(
                "unsupported protocol {other}, expected one of tcp, http, https"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
}

impl Algorithm {
    /// Name used by the Vultr API.
    #[must_use]
    pub const fn as_api_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "roundrobin",
            Self::LeastConnections => "leastconn",
        }
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "least_connections" | "leastconn" => Ok(Self::LeastConnections),
            other => Err(format!(
                "unknown algorithm {other}, expected round_robin or least_connections"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    pub protocol: Protocol,
    pub port: u16,
    pub path: String,
    pub interval: u32,
    pub response_timeout: u32,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StickySession {
    pub enabled: bool,
    pub cookie_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V4 => "v4",
            Self::V6 => "v6",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FirewallRuleSpec {
    /// Either a CIDR or a symbolic source such as `cloudflare`.
    pub source: String,
    pub ip_family: IpFamily,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VpcSetting {
    #[default]
    Disabled,
    /// Attach to the VPC of the node the operator runs on.
    Discover,
    Id(String),
}

/// All load balancer settings carried by a service, parsed and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LBAnnotations {
    pub frontend_protocol: Protocol,
    pub https_ports: BTreeSet<u16>,
    pub ssl_passthrough: bool,
    pub tls_secret: Option<String>,
    pub backend_protocol: Option<Protocol>,
    pub hostname: Option<String>,
    pub health_check: HealthCheckSpec,
    pub algorithm: Algorithm,
    pub ssl_redirect: bool,
    pub proxy_protocol: bool,
    pub http2: bool,
    pub http3: bool,
    pub timeout: u32,
    pub sticky_session: StickySession,
    pub firewall_rules: Vec<FirewallRuleSpec>,
    pub vpc: VpcSetting,
    pub node_count: u32,
}

impl LBAnnotations {
    /// Decode every setting, stopping at the first invalid one.
    pub fn from_service(svc: &Service) -> VultrLBResult<Self> {
        let ann = svc.annotations();
        let ports = service_ports(svc);
        Ok(Self {
            frontend_protocol: frontend_protocol(ann)?,
            https_ports: https_ports(ann)?,
            ssl_passthrough: ssl_passthrough(ann)?,
            tls_secret: tls_secret(ann),
            backend_protocol: backend_protocol(ann)?,
            hostname: hostname(ann)?,
            health_check: health_check(ann, ports)?,
            algorithm: algorithm(ann)?,
            ssl_redirect: ssl_redirect(ann)?,
            proxy_protocol: proxy_protocol(ann)?,
            http2: http2(ann)?,
            http3: http3(ann)?,
            timeout: timeout(ann)?,
            sticky_session: sticky_session(ann)?,
            firewall_rules: firewall_rules(ann)?,
            vpc: vpc(ann)?,
            node_count: node_count(ann)?,
        })
    }
}

#[must_use]
pub fn service_ports(svc: &Service) -> &[ServicePort] {
    svc.spec
        .as_ref()
        .and_then(|spec| spec.ports.as_deref())
        .unwrap_or_default()
}

/// Name derived from the service UID, the same way kubernetes cloud
/// providers name balancers by default.
#[must_use]
pub fn default_load_balancer_name(svc: &Service) -> String {
    let uid = svc.uid().unwrap_or_default().replace('-', "");
    let mut name = format!("a{uid}");
    name.truncate(32);
    name
}

/// Label the load balancer of this service must carry.
#[must_use]
pub fn load_balancer_name(svc: &Service) -> String {
    svc.annotations()
        .get(consts::LB_LABEL_ANN_NAME)
        .cloned()
        .unwrap_or_else(|| default_load_balancer_name(svc))
}

#[must_use]
pub fn load_balancer_id(ann: &Annotations) -> Option<&str> {
    ann.get(consts::LB_ID_ANN_NAME).map(String::as_str)
}

/// Creation is enabled unless the annotation says `false`.
#[must_use]
pub fn creation_enabled(ann: &Annotations) -> bool {
    !ann.get(consts::LB_CREATE_ANN_NAME)
        .is_some_and(|value| value.eq_ignore_ascii_case("false"))
}

/// Accepts the usual spellings: `1`, `t`, `true` and their false
/// counterparts, lower, upper or title case.
fn parse_bool(ann: &Annotations, key: &'static str, default: bool) -> VultrLBResult<bool> {
    let Some(value) = ann.get(key) else {
        return Ok(default);
    };
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(VultrLBError::annotation(
            key,
            format!("{other} is not a boolean"),
        )),
    }
}

fn parse_number<T>(ann: &Annotations, key: &'static str, default: T) -> VultrLBResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    ann.get(key)
        .map(|value| T::from_str(value.trim()))
        .transpose()
        .map_err(|err| VultrLBError::annotation(key, err))
        .map(|value| value.unwrap_or(default))
}

pub fn frontend_protocol(ann: &Annotations) -> VultrLBResult<Protocol> {
    ann.get(consts::LB_PROTOCOL_ANN_NAME)
        .map_or(Ok(Protocol::Tcp), |value| Protocol::from_str(value))
        .map_err(|err| VultrLBError::annotation(consts::LB_PROTOCOL_ANN_NAME, err))
}

pub fn backend_protocol(ann: &Annotations) -> VultrLBResult<Option<Protocol>> {
    ann.get(consts::LB_BACKEND_PROTOCOL_ANN_NAME)
        .map(|value| Protocol::from_str(value))
        .transpose()
        .map_err(|err| VultrLBError::annotation(consts::LB_BACKEND_PROTOCOL_ANN_NAME, err))
}

/// Comma separated list of ports served over HTTPS, e.g. `443,8443`.
pub fn https_ports(ann: &Annotations) -> VultrLBResult<BTreeSet<u16>> {
    let Some(ports) = ann.get(consts::LB_HTTPS_PORTS_ANN_NAME) else {
        return Ok(BTreeSet::new());
    };
    ports
        .split(',')
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .map(|port| {
            u16::from_str(port).map_err(|err| {
                VultrLBError::annotation(consts::LB_HTTPS_PORTS_ANN_NAME, format!("{port}: {err}"))
            })
        })
        .collect()
}

pub fn ssl_passthrough(ann: &Annotations) -> VultrLBResult<bool> {
    parse_bool(ann, consts::LB_SSL_PASSTHROUGH_ANN_NAME, false)
}

#[must_use]
pub fn tls_secret(ann: &Annotations) -> Option<String> {
    ann.get(consts::LB_SSL_ANN_NAME)
        .filter(|name| !name.is_empty())
        .cloned()
}

/// Hostname reported as ingress instead of the balancer IPs.
pub fn hostname(ann: &Annotations) -> VultrLBResult<Option<String>> {
    match ann.get(consts::LB_HOSTNAME_ANN_NAME) {
        None => Ok(None),
        Some(name) if name.is_empty() => Ok(None),
        Some(name) if is_dns_name(name) => Ok(Some(name.clone())),
        Some(name) => Err(VultrLBError::annotation(
            consts::LB_HOSTNAME_ANN_NAME,
            format!("{name} is not a valid DNS name"),
        )),
    }
}

fn is_dns_name(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

pub fn health_check(ann: &Annotations, ports: &[ServicePort]) -> VultrLBResult<HealthCheckSpec> {
    let path = health_check_path(ann);
    Ok(HealthCheckSpec {
        protocol: health_check_protocol(ann)?,
        port: health_check_port(ann, ports)?,
        interval: parse_number(ann, consts::HC_INTERVAL_ANN_NAME, consts::DEFAULT_HC_INTERVAL)?,
        response_timeout: parse_number(
            ann,
            consts::HC_RESPONSE_TIMEOUT_ANN_NAME,
            consts::DEFAULT_HC_RESPONSE_TIMEOUT,
        )?,
        unhealthy_threshold: parse_number(
            ann,
            consts::HC_UNHEALTHY_ANN_NAME,
            consts::DEFAULT_HC_UNHEALTHY,
        )?,
        healthy_threshold: parse_number(
            ann,
            consts::HC_HEALTHY_ANN_NAME,
            consts::DEFAULT_HC_HEALTHY,
        )?,
        path,
    })
}

#[must_use]
pub fn health_check_path(ann: &Annotations) -> String {
    ann.get(consts::HC_PATH_ANN_NAME).cloned().unwrap_or_default()
}

/// TCP by default, HTTP as soon as a path is configured.
/// Only lowercase `tcp` and `http` are valid checks.
pub fn health_check_protocol(ann: &Annotations) -> VultrLBResult<Protocol> {
    match ann.get(consts::HC_PROTOCOL_ANN_NAME).map(String::as_str) {
        Some("tcp") => Ok(Protocol::Tcp),
        Some("http") => Ok(Protocol::Http),
        Some(other) if !other.is_empty() => Err(VultrLBError::annotation(
            consts::HC_PROTOCOL_ANN_NAME,
            format!("unsupported health check protocol {other}, expected tcp or http"),
        )),
        _ if health_check_path(ann).is_empty() => Ok(Protocol::Tcp),
        _ => Ok(Protocol::Http),
    }
}

/// An explicit port must be one of the service ports. Without the
/// annotation the node port of the first service port is checked.
pub fn health_check_port(ann: &Annotations, ports: &[ServicePort]) -> VultrLBResult<u16> {
    let Some(value) = ann.get(consts::HC_PORT_ANN_NAME) else {
        let first = ports.first().ok_or_else(|| {
            VultrLBError::InvalidServicePort("service does not declare any port".to_string())
        })?;
        let node_port = first.node_port.ok_or_else(|| {
            VultrLBError::InvalidServicePort(format!(
                "port {} has no node port allocated",
                first.port
            ))
        })?;
        return u16::try_from(node_port)
            .map_err(|_| VultrLBError::InvalidServicePort(format!("node port {node_port}")));
    };
    let port = u16::from_str(value.trim())
        .map_err(|err| VultrLBError::annotation(consts::HC_PORT_ANN_NAME, err))?;
    if ports.iter().any(|p| p.port == i32::from(port)) {
        Ok(port)
    } else {
        Err(VultrLBError::annotation(
            consts::HC_PORT_ANN_NAME,
            format!("port {port} is not declared by the service"),
        ))
    }
}

pub fn algorithm(ann: &Annotations) -> VultrLBResult<Algorithm> {
    ann.get(consts::LB_ALGORITHM_ANN_NAME)
        .map(|value| Algorithm::from_str(value))
        .transpose()
        .map_err(|err| VultrLBError::annotation(consts::LB_ALGORITHM_ANN_NAME, err))
        .map(Option::unwrap_or_default)
}

pub fn ssl_redirect(ann: &Annotations) -> VultrLBResult<bool> {
    parse_bool(ann, consts::LB_SSL_REDIRECT_ANN_NAME, false)
}

pub fn proxy_protocol(ann: &Annotations) -> VultrLBResult<bool> {
    parse_bool(ann, consts::LB_PROXY_PROTOCOL_ANN_NAME, false)
}

pub fn http2(ann: &Annotations) -> VultrLBResult<bool> {
    parse_bool(ann, consts::LB_HTTP2_ANN_NAME, false)
}

pub fn http3(ann: &Annotations) -> VultrLBResult<bool> {
    parse_bool(ann, consts::LB_HTTP3_ANN_NAME, false)
}

pub fn timeout(ann: &Annotations) -> VultrLBResult<u32> {
    parse_number(ann, consts::LB_TIMEOUT_ANN_NAME, consts::DEFAULT_LB_TIMEOUT)
}

/// Sticky sessions are `on` or `off`; when on, a cookie name is required.
pub fn sticky_session(ann: &Annotations) -> VultrLBResult<StickySession> {
    let enabled = match ann
        .get(consts::LB_STICKY_SESSION_ANN_NAME)
        .map(|value| value.to_ascii_lowercase())
        .as_deref()
    {
        None | Some("off" | "false") => false,
        Some("on" | "true") => true,
        Some(other) => {
            return Err(VultrLBError::annotation(
                consts::LB_STICKY_SESSION_ANN_NAME,
                format!("{other} is neither on nor off"),
            ))
        }
    };
    if !enabled {
        return Ok(StickySession::default());
    }
    let cookie_name = ann
        .get(consts::LB_STICKY_COOKIE_ANN_NAME)
        .filter(|name| !name.is_empty())
        .cloned()
        .ok_or_else(|| {
            VultrLBError::annotation(
                consts::LB_STICKY_COOKIE_ANN_NAME,
                "cookie name is required when sticky sessions are on",
            )
        })?;
    Ok(StickySession {
        enabled,
        cookie_name,
    })
}

/// Semicolon separated `source,port` pairs, e.g. `cloudflare,80;10.0.0.0/8,443`.
pub fn firewall_rules(ann: &Annotations) -> VultrLBResult<Vec<FirewallRuleSpec>> {
    let Some(rules) = ann.get(consts::LB_FIREWALL_RULES_ANN_NAME) else {
        return Ok(Vec::new());
    };
    let invalid = |reason: String| VultrLBError::annotation(consts::LB_FIREWALL_RULES_ANN_NAME, reason);
    rules
        .split(';')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(|rule| {
            let [source, port] = rule.split(',').map(str::trim).collect::<Vec<_>>()[..] else {
                return Err(invalid(format!("rule {rule} must be source,port")));
            };
            let ip_family = if source == consts::FIREWALL_SOURCE_CLOUDFLARE {
                IpFamily::V4
            } else {
                cidr_family(source).ok_or_else(|| invalid(format!("source {source} is invalid")))?
            };
            let port = u16::from_str(port)
                .map_err(|err| invalid(format!("port {port} is invalid: {err}")))?;
            Ok(FirewallRuleSpec {
                source: source.to_string(),
                ip_family,
                port,
            })
        })
        .collect()
}

fn cidr_family(source: &str) -> Option<IpFamily> {
    let (addr, prefix) = source.split_once('/')?;
    let addr = IpAddr::from_str(addr).ok()?;
    let prefix = u8::from_str(prefix).ok()?;
    match addr {
        IpAddr::V4(_) if prefix <= 32 => Some(IpFamily::V4),
        IpAddr::V6(_) if prefix <= 128 => Some(IpFamily::V6),
        _ => None,
    }
}

/// The deprecated private network annotation and the VPC annotation are
/// mutually exclusive. `false` disables, `true` attaches the node's VPC,
/// anything else is taken as a VPC id.
pub fn vpc(ann: &Annotations) -> VultrLBResult<VpcSetting> {
    let value = match (
        ann.get(consts::LB_PRIVATE_NETWORK_ANN_NAME),
        ann.get(consts::LB_VPC_ANN_NAME),
    ) {
        (Some(_), Some(_)) => {
            return Err(VultrLBError::ConflictingAnnotations(
                consts::LB_PRIVATE_NETWORK_ANN_NAME,
                consts::LB_VPC_ANN_NAME,
            ))
        }
        (Some(value), None) | (None, Some(value)) => value.trim(),
        (None, None) => return Ok(VpcSetting::Disabled),
    };
    if value.is_empty() || value.eq_ignore_ascii_case("false") {
        Ok(VpcSetting::Disabled)
    } else if value.eq_ignore_ascii_case("true") {
        Ok(VpcSetting::Discover)
    } else {
        Ok(VpcSetting::Id(value.to_string()))
    }
}

/// Number of balancer nodes. Must be odd.
pub fn node_count(ann: &Annotations) -> VultrLBResult<u32> {
    let count = parse_number(ann, consts::LB_NODE_COUNT_ANN_NAME, consts::DEFAULT_NODE_COUNT)?;
    if count % 2 == 0 {
        return Err(VultrLBError::annotation(
            consts::LB_NODE_COUNT_ANN_NAME,
            format!("{count} must be odd"),
        ));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(pairs: &[(&str, &str)]) -> Annotations {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn port(port: i32, node_port: i32) -> ServicePort {
        ServicePort {
            port,
            node_port: Some(node_port),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_for_missing_keys() {
        let empty = Annotations::new();
        let ports = [port(80, 30080)];

        assert_eq!(frontend_protocol(&empty).unwrap(), Protocol::Tcp);
        assert_eq!(backend_protocol(&empty).unwrap(), None);
        assert!(https_ports(&empty).unwrap().is_empty());
        assert!(!ssl_passthrough(&empty).unwrap());
        assert_eq!(tls_secret(&empty), None);
        assert_eq!(hostname(&empty).unwrap(), None);
        assert_eq!(algorithm(&empty).unwrap(), Algorithm::RoundRobin);
        assert!(!ssl_redirect(&empty).unwrap());
        assert!(!proxy_protocol(&empty).unwrap());
        assert!(!http2(&empty).unwrap());
        assert!(!http3(&empty).unwrap());
        assert_eq!(timeout(&empty).unwrap(), 600);
        assert_eq!(sticky_session(&empty).unwrap(), StickySession::default());
        assert!(firewall_rules(&empty).unwrap().is_empty());
        assert_eq!(vpc(&empty).unwrap(), VpcSetting::Disabled);
        assert_eq!(node_count(&empty).unwrap(), 1);
        assert!(creation_enabled(&empty));

        assert_eq!(
            health_check(&empty, &ports).unwrap(),
            HealthCheckSpec {
                protocol: Protocol::Tcp,
                port: 30080,
                path: String::new(),
                interval: 15,
                response_timeout: 5,
                unhealthy_threshold: 5,
                healthy_threshold: 5,
            }
        );
    }

    #[test]
    fn health_check_path_switches_protocol_to_http() {
        let ann = ann(&[(consts::HC_PATH_ANN_NAME, "/healthz")]);
        assert_eq!(health_check_protocol(&ann).unwrap(), Protocol::Http);
    }

    #[test]
    fn explicit_health_check_protocol_wins() {
        let ann = ann(&[
            (consts::HC_PATH_ANN_NAME, "/healthz"),
            (consts::HC_PROTOCOL_ANN_NAME, "tcp"),
        ]);
        assert_eq!(health_check_protocol(&ann).unwrap(), Protocol::Tcp);

        let bad = ann_with(consts::HC_PROTOCOL_ANN_NAME, "udp");
        assert!(health_check_protocol(&bad).is_err());
    }

    #[test]
    fn health_check_protocol_is_tcp_or_http_only() {
        for value in ["https", "HTTP", "Tcp"] {
            assert!(
                health_check_protocol(&ann_with(consts::HC_PROTOCOL_ANN_NAME, value)).is_err(),
                "{value} should be rejected"
            );
        }
        assert_eq!(
            health_check_protocol(&ann_with(consts::HC_PROTOCOL_ANN_NAME, "http")).unwrap(),
            Protocol::Http
        );
    }

    #[test]
    fn booleans_accept_short_and_numeric_forms() {
        for value in ["1", "t", "T", "TRUE", "true", "True"] {
            assert!(
                proxy_protocol(&ann_with(consts::LB_PROXY_PROTOCOL_ANN_NAME, value)).unwrap(),
                "{value} should be true"
            );
        }
        for value in ["0", "f", "F", "FALSE", "false", "False"] {
            assert!(
                !proxy_protocol(&ann_with(consts::LB_PROXY_PROTOCOL_ANN_NAME, value)).unwrap(),
                "{value} should be false"
            );
        }
        for value in ["yes", "on", "2", "tRUE", ""] {
            assert!(
                proxy_protocol(&ann_with(consts::LB_PROXY_PROTOCOL_ANN_NAME, value)).is_err(),
                "{value} should be rejected"
            );
        }
    }

    fn ann_with(key: &str, value: &str) -> Annotations {
        ann(&[(key, value)])
    }

    #[test]
    fn health_check_port_must_be_declared() {
        let ports = [port(80, 30080), port(443, 30443)];
        assert_eq!(
            health_check_port(&ann_with(consts::HC_PORT_ANN_NAME, "443"), &ports).unwrap(),
            443
        );
        let err = health_check_port(&ann_with(consts::HC_PORT_ANN_NAME, "8080"), &ports)
            .unwrap_err();
        assert!(matches!(
            err,
            VultrLBError::InvalidAnnotation {
                annotation: consts::HC_PORT_ANN_NAME,
                ..
            }
        ));
    }

    #[test]
    fn numeric_errors_name_the_annotation() {
        let err = health_check(
            &ann_with(consts::HC_HEALTHY_ANN_NAME, "many"),
            &[port(80, 30080)],
        )
        .unwrap_err();
        assert!(err.to_string().contains(consts::HC_HEALTHY_ANN_NAME));
    }

    #[test]
    fn node_count_must_be_odd() {
        let err = node_count(&ann_with(consts::LB_NODE_COUNT_ANN_NAME, "4")).unwrap_err();
        assert!(err.to_string().contains("must be odd"));
        assert_eq!(
            node_count(&ann_with(consts::LB_NODE_COUNT_ANN_NAME, "5")).unwrap(),
            5
        );
        assert!(node_count(&ann_with(consts::LB_NODE_COUNT_ANN_NAME, "-1")).is_err());
    }

    #[test]
    fn private_network_and_vpc_are_exclusive() {
        for (pn, vpc_value) in [("true", "true"), ("false", "false"), ("", "vpc-1")] {
            let both = ann(&[
                (consts::LB_PRIVATE_NETWORK_ANN_NAME, pn),
                (consts::LB_VPC_ANN_NAME, vpc_value),
            ]);
            assert!(matches!(
                vpc(&both),
                Err(VultrLBError::ConflictingAnnotations(..))
            ));
        }
    }

    #[test]
    fn vpc_values() {
        assert_eq!(
            vpc(&ann_with(consts::LB_VPC_ANN_NAME, "TRUE")).unwrap(),
            VpcSetting::Discover
        );
        assert_eq!(
            vpc(&ann_with(consts::LB_PRIVATE_NETWORK_ANN_NAME, "false")).unwrap(),
            VpcSetting::Disabled
        );
        assert_eq!(
            vpc(&ann_with(consts::LB_VPC_ANN_NAME, "vpc-42")).unwrap(),
            VpcSetting::Id("vpc-42".to_string())
        );
    }

    #[test]
    fn firewall_rules_accept_cidrs_and_cloudflare() {
        let rules = firewall_rules(&ann_with(
            consts::LB_FIREWALL_RULES_ANN_NAME,
            "cloudflare,80;10.0.0.0/8,443;2001:db8::/32,443;",
        ))
        .unwrap();
        assert_eq!(
            rules,
            vec![
                FirewallRuleSpec {
                    source: "cloudflare".to_string(),
                    ip_family: IpFamily::V4,
                    port: 80
                },
                FirewallRuleSpec {
                    source: "10.0.0.0/8".to_string(),
                    ip_family: IpFamily::V4,
                    port: 443
                },
                FirewallRuleSpec {
                    source: "2001:db8::/32".to_string(),
                    ip_family: IpFamily::V6,
                    port: 443
                },
            ]
        );
    }

    #[test]
    fn firewall_rules_reject_garbage() {
        for value in ["10.0.0.1,80", "10.0.0.0/33,80", "10.0.0.0/8", "10.0.0.0/8,http"] {
            assert!(
                firewall_rules(&ann_with(consts::LB_FIREWALL_RULES_ANN_NAME, value)).is_err(),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn protocols_outside_the_supported_set_are_rejected() {
        assert!(frontend_protocol(&ann_with(consts::LB_PROTOCOL_ANN_NAME, "udp")).is_err());
        assert!(backend_protocol(&ann_with(consts::LB_BACKEND_PROTOCOL_ANN_NAME, "grpc")).is_err());
        assert_eq!(
            frontend_protocol(&ann_with(consts::LB_PROTOCOL_ANN_NAME, "HTTP")).unwrap(),
            Protocol::Http
        );
    }

    #[test]
    fn sticky_sessions_need_a_cookie() {
        assert!(sticky_session(&ann_with(consts::LB_STICKY_SESSION_ANN_NAME, "on")).is_err());
        let sticky = sticky_session(&ann(&[
            (consts::LB_STICKY_SESSION_ANN_NAME, "on"),
            (consts::LB_STICKY_COOKIE_ANN_NAME, "session"),
        ]))
        .unwrap();
        assert!(sticky.enabled);
        assert_eq!(sticky.cookie_name, "session");
    }

    #[test]
    fn https_ports_and_algorithm() {
        let ports = https_ports(&ann_with(consts::LB_HTTPS_PORTS_ANN_NAME, "443, 8443")).unwrap();
        assert_eq!(ports.into_iter().collect::<Vec<_>>(), vec![443, 8443]);
        assert!(https_ports(&ann_with(consts::LB_HTTPS_PORTS_ANN_NAME, "443,abc")).is_err());
        assert_eq!(
            algorithm(&ann_with(consts::LB_ALGORITHM_ANN_NAME, "least_connections")).unwrap(),
            Algorithm::LeastConnections
        );
    }

    #[test]
    fn hostname_must_be_a_dns_name() {
        assert_eq!(
            hostname(&ann_with(consts::LB_HOSTNAME_ANN_NAME, "lb.example.com")).unwrap(),
            Some("lb.example.com".to_string())
        );
        assert!(hostname(&ann_with(consts::LB_HOSTNAME_ANN_NAME, "not a host")).is_err());
    }

    #[test]
    fn creation_is_disabled_only_by_false() {
        assert!(!creation_enabled(&ann_with(consts::LB_CREATE_ANN_NAME, "False")));
        assert!(creation_enabled(&ann_with(consts::LB_CREATE_ANN_NAME, "true")));
    }

    #[test]
    fn default_name_is_derived_from_uid() {
        let svc = Service {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("web".to_string()),
                uid: Some("6f1c2d3e-4b5a-6978-8a9b-0c1d2e3f4a5b".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            default_load_balancer_name(&svc),
            "a6f1c2d3e4b5a69788a9b0c1d2e3f4a5"
        );
        assert_eq!(load_balancer_name(&svc), default_load_balancer_name(&svc));
    }
}
