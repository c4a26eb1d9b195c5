use async_trait::async_trait;

use crate::error::GitOpsResult;

/// Result of a successful pin write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// A commit was pushed.
    Committed,
    /// The pin already named the requested version; nothing was written.
    Unchanged,
}

/// Records the desired version for a namespace in the system of record.
///
/// Implementations must either commit the change or return an error;
/// a partial write is never reported as success.
#[async_trait]
pub trait VersionSetter: Send + Sync {
    async fn set_version(
        &self,
        namespace: &str,
        version: &str,
        change_description: &str,
    ) -> GitOpsResult<SetOutcome>;
}
