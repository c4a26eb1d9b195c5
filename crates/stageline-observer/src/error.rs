//! Observer error types.

use thiserror::Error;

/// Failures reported by a cluster provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("cluster unreachable: {0}")]
    Connectivity(String),

    #[error("cluster query failed: {0}")]
    Query(String),

    #[error("watch failed: {0}")]
    Watch(String),
}

/// Errors surfaced by the workload observer.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("no instances found in namespace {0}")]
    EmptyNamespace(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("failed to list instances in namespace '{namespace}' after {attempts} attempts: {source}")]
    RetriesExhausted {
        namespace: String,
        attempts: u32,
        #[source]
        source: Box<ObserverError>,
    },

    #[error("instance `{name}` not found in namespace `{namespace}`")]
    InstanceNotFound { namespace: String, name: String },

    #[error("no instances with label `{0}` found in any namespace")]
    LabelNotFoundAnywhere(String),
}

pub type ObserverResult<T> = Result<T, ObserverError>;
