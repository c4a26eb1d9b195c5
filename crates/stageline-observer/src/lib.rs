//! stageline-observer - read-through view of live workload state.
//!
//! The observer never caches: every call re-queries the cluster through a
//! [`ClusterProvider`]. Listing is wrapped in bounded retry because pods
//! that are starting or being replaced make single queries
//! flaky.
//!
//! # Architecture
//!
//! ```text
//! WorkloadObserver
//!   ├── ClusterProvider (trait)
//!   │   ├── KubeCluster      - kube-rs client, reconnects on ensure_connected()
//!   │   └── InMemoryCluster  - scripted state for tests
//!   ├── list_instances / list_instances_with_retry / list_with_status
//!   ├── status(namespace, name) → waiting reason or phase
//!   ├── current_version(namespace, label)
//!   └── drift(stages, label) → per-stage versions
//! ```

pub mod error;
pub mod kubernetes;
pub mod memory;
pub mod observer;
pub mod provider;

pub use error::{ClusterError, ObserverError, ObserverResult};
pub use kubernetes::KubeCluster;
pub use memory::InMemoryCluster;
pub use observer::{DriftReport, InstanceListing, RetryPolicy, StageVersion, WorkloadObserver};
pub use provider::{ClusterProvider, InstanceStream};
