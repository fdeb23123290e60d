use thiserror::Error;

pub type VultrLBResult<T> = Result<T, VultrLBError>;

#[derive(Debug, Error)]
pub enum VultrLBError {
    #[error("Cannot parse node filter: {0}")]
    InvalidNodeFilter(String),
    #[error("Service was skipped")]
    SkipService,

    #[error("Invalid value for annotation {annotation}: {reason}")]
    InvalidAnnotation {
        annotation: &'static str,
        reason: String,
    },
    #[error("Annotations {0} and {1} can not be used together, use {1} as {0} is deprecated")]
    ConflictingAnnotations(&'static str, &'static str),
    #[error("Invalid service port: {0}")]
    InvalidServicePort(String),
    #[error("Invalid provider ID {provider_id}: {reason}")]
    InvalidProviderId { provider_id: String, reason: String },
    #[error("Secret {0} is not a valid TLS secret: {1}")]
    InvalidSecret(String, String),
    #[error("{0} is set to false - load balancer will not be created")]
    CreationDisabled(&'static str),

    #[error("Load balancer not found")]
    LoadBalancerNotFound,
    #[error("Load balancer ID {id} for service {service} not found")]
    BoundLoadBalancerMissing { id: String, service: String },
    #[error("Multiple load balancers found with label {label}: IDs {ids:?} - unique label required")]
    DuplicateLabel { label: String, ids: Vec<String> },
    #[error("Load balancer is not yet active - current status: {0}")]
    NotActive(String),
    #[error("Cleared load balancer ID {id}: {reason}, load balancer must be recreated")]
    RecreationNeeded { id: String, reason: String },

    #[error("Conflicting write to service {0}")]
    Conflict(String),
    #[error("Failed to set load balancer ID annotation on service {0} after {1} attempts")]
    BindRetriesExhausted(String, u32),

    #[error("Vultr API error while {operation} (status {status}): {message}")]
    VultrApi {
        operation: String,
        status: u16,
        message: String,
    },
    #[error("HTTP error while {operation}: {source}")]
    Http {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Metadata error: {0}")]
    Metadata(String),
    #[error("Kube error: {0}")]
    KubeError(#[from] kube::Error),
}

impl VultrLBError {
    /// Helper for annotation parsing failures.
    pub fn annotation(annotation: &'static str, reason: impl ToString) -> Self {
        Self::InvalidAnnotation {
            annotation,
            reason: reason.to_string(),
        }
    }
}
