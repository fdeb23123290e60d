use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Parser)]
pub struct OperatorConfig {
    /// Vultr API key.
    #[arg(short = 't', long, env = "VULTR_API_KEY")]
    pub api_key: String,

    /// Base URL of the Vultr API.
    #[arg(long, env = "VULTRLB_API_URL", default_value = "https://api.vultr.com")]
    pub api_url: String,

    /// User agent sent with every Vultr API request.
    #[arg(long, env = "VULTRLB_USER_AGENT", default_value = concat!("vultrlb/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,

    /// Base URL of the instance metadata service.
    /// It is used to discover the region and the VPC of the current node.
    #[arg(
        long,
        env = "VULTRLB_METADATA_URL",
        default_value = "http://169.254.169.254"
    )]
    pub metadata_url: String,

    /// Region where load balancers are created.
    /// If not set, the region of the current node is used.
    #[arg(long, env = "VULTRLB_REGION", default_value = None)]
    pub region: Option<String>,

    /// VPC attached to load balancers that request one with `true`.
    /// If not set, the VPC of the current node is used.
    #[arg(long, env = "VULTRLB_VPC_ID", default_value = None)]
    pub vpc_id: Option<String>,

    /// Interval in seconds between two reconcilations of the same service.
    #[arg(long, env = "VULTRLB_REQUEUE_INTERVAL", default_value = "30")]
    pub requeue_interval: u64,

    /// Interval in seconds between reconcilations while a load balancer is still pending.
    #[arg(long, env = "VULTRLB_NOT_ACTIVE_REQUEUE", default_value = "10")]
    pub not_active_requeue: u64,

    /// Timeout in seconds for Vultr API and metadata requests.
    #[arg(long, env = "VULTRLB_HTTP_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    // Log level of the operator.
    #[arg(long, env = "VULTRLB_LOG_LEVEL", default_value = "INFO")]
    pub log_level: LevelFilter,
}
