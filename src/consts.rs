/// Overrides the label (name) of the load balancer.
pub const LB_LABEL_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-label";
/// Durable id of the bound load balancer. Managed by the operator.
pub const LB_ID_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-id";
/// Set to `false` to forbid creating a load balancer for the service.
pub const LB_CREATE_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-create";

// Forwarding
pub const LB_PROTOCOL_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-protocol";
pub const LB_HTTPS_PORTS_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-https-ports";
pub const LB_SSL_PASSTHROUGH_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-ssl-pass-through";
pub const LB_SSL_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-ssl";
pub const LB_BACKEND_PROTOCOL_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-backend-protocol";
pub const LB_HOSTNAME_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-hostname";

// Health check
pub const HC_PATH_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-healthcheck-path";
pub const HC_PROTOCOL_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-healthcheck-protocol";
pub const HC_PORT_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-healthcheck-port";
pub const HC_INTERVAL_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-healthcheck-check-interval";
pub const HC_RESPONSE_TIMEOUT_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-healthcheck-response-timeout";
pub const HC_UNHEALTHY_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-healthcheck-unhealthy-threshold";
pub const HC_HEALTHY_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-healthcheck-healthy-threshold";

// Balancer settings
pub const LB_ALGORITHM_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-algorithm";
pub const LB_SSL_REDIRECT_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-ssl-redirect";
pub const LB_PROXY_PROTOCOL_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-proxy-protocol";
pub const LB_HTTP2_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-http2";
pub const LB_HTTP3_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-http3";
pub const LB_TIMEOUT_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-timeout";

pub const LB_STICKY_SESSION_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-sticky-session-enabled";
pub const LB_STICKY_COOKIE_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-sticky-session-cookie-name";

pub const LB_FIREWALL_RULES_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-firewall-rules";
/// Deprecated in favour of [`LB_VPC_ANN_NAME`].
pub const LB_PRIVATE_NETWORK_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-private-network";
pub const LB_VPC_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-vpc";

pub const LB_NODE_COUNT_ANN_NAME: &str = "service.beta.kubernetes.io/vultr-loadbalancer-node-count";
pub const LB_NODE_SELECTOR_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-node-selector";

/// Bumped by the secret watcher to force a resync after TLS rotation.
pub const LB_SSL_LAST_UPDATED_ANN_NAME: &str =
    "service.beta.kubernetes.io/vultr-loadbalancer-ssl-last-updated";

pub const EXCLUDE_FROM_LB_LABEL_NAME: &str = "node.kubernetes.io/exclude-from-external-load-balancers";

pub const PROVIDER_NAME: &str = "vultr";
pub const FIREWALL_SOURCE_CLOUDFLARE: &str = "cloudflare";
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

pub const DEFAULT_HC_INTERVAL: u32 = 15;
pub const DEFAULT_HC_RESPONSE_TIMEOUT: u32 = 5;
pub const DEFAULT_HC_UNHEALTHY: u32 = 5;
pub const DEFAULT_HC_HEALTHY: u32 = 5;
pub const DEFAULT_LB_TIMEOUT: u32 = 600;
pub const DEFAULT_NODE_COUNT: u32 = 1;

pub const LB_STATUS_ACTIVE: &str = "active";
pub const LIST_PAGE_SIZE: u32 = 25;
pub const BIND_MAX_ATTEMPTS: u32 = 3;
pub const BIND_BACKOFF_BASE_MS: u64 = 50;

pub const FINALIZER_NAME: &str = "vultrlb/finalizer";
