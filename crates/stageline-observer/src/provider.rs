//! The cluster state contract.

use async_trait::async_trait;
use futures::stream::BoxStream;

use stageline_core::{InstanceEvent, InstanceSnapshot};

use crate::error::ClusterError;

/// Stream of lifecycle events for one namespace. An `Err` item or the end
/// of the stream means the subscription is over.
pub type InstanceStream = BoxStream<'static, Result<InstanceEvent, ClusterError>>;

/// Live cluster state for a set of namespaces.
///
/// Handles are long-lived and shared; implementations must be cheap to
/// call concurrently.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Verify the connection, rebuilding it once if it was lost.
    async fn ensure_connected(&self) -> Result<(), ClusterError>;

    /// Snapshot every instance in `namespace`.
    async fn list_instances(&self, namespace: &str) -> Result<Vec<InstanceSnapshot>, ClusterError>;

    /// Fetch a single instance by name.
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<InstanceSnapshot>, ClusterError>;

    /// Subscribe to instance lifecycle events in `namespace`.
    async fn watch_instances(&self, namespace: &str) -> Result<InstanceStream, ClusterError>;
}
