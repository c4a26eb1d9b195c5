//! stageline-gitops - the external mutation behind promote and rollback.
//!
//! Stageline never touches workloads directly. It rewrites the version
//! pin in a GitOps repository and lets the delivery tooling reconcile.
//!
//! - **`pin`**: pure rewrite of the `range: '...'` field
//! - **`setter`**: the [`VersionSetter`] seam
//! - **`github`**: GitHub contents API implementation
//! - **`memory`**: recording fake for tests

pub mod error;
pub mod github;
pub mod memory;
pub mod pin;
pub mod setter;

pub use error::{GitOpsError, GitOpsResult};
pub use github::GitHubPinFile;
pub use memory::{InMemoryVersionSetter, SetCall};
pub use pin::patch_pin;
pub use setter::{SetOutcome, VersionSetter};
