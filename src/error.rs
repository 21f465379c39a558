//! Error types for PVC unmount runs

use thiserror::Error;

/// A failure to resolve one Pod to its scale-down target.
#[derive(Error, Debug)]
#[error("Pod {namespace}/{name}: {source}")]
pub struct PodResolutionError {
    pub namespace: String,
    pub name: String,
    #[source]
    pub source: Box<Error>,
}

/// Error variants are named with the `Error` suffix where they wrap another error type.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to read kubeconfig: {0}")]
    KubeconfigError(#[from] kube::config::KubeconfigError),

    #[error("Failed to infer cluster config: {0}")]
    InferConfigError(#[from] kube::config::InferConfigError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Refusing to modify the cluster without confirmation (pass --yes or use --dry-run)")]
    ConfirmationRequired,

    #[error(
        "Owner chain of {kind}/{namespace}/{name} exceeds {max_depth} hops or contains a cycle"
    )]
    OwnerChainTooDeep {
        kind: String,
        namespace: String,
        name: String,
        max_depth: usize,
    },

    #[error("All {count} scale-down targets failed")]
    AllTargetsFailed { count: usize },

    #[error("Nothing was scaled down ({skipped} skipped, {failed} failed)")]
    NothingScaled { skipped: usize, failed: usize },

    #[error("Confirmation prompt failed: {0}")]
    PromptError(String),
}

impl Error {
    /// Check if this error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError(e) => is_not_found(e),
            _ => false,
        }
    }
}

/// Check if a kube error is a 404 from the API server.
pub fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 404)
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
