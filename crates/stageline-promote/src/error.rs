use thiserror::Error;

use stageline_core::PipelineError;
use stageline_gitops::GitOpsError;
use stageline_ledger::LedgerError;
use stageline_observer::ObserverError;

#[derive(Debug, Error)]
pub enum PromoteError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Observer(#[from] ObserverError),

    #[error("no instances with label `{label}` found in namespace `{namespace}`")]
    LabelNotFound { namespace: String, label: String },

    #[error("no instances with label `{label}` found in source namespace `{source_namespace}`")]
    LabelNotFoundInSource {
        source_namespace: String,
        label: String,
    },

    #[error("version `{version}` is already deployed in namespace `{namespace}`; no promotion needed")]
    AlreadyCurrent { namespace: String, version: String },

    #[error("no previous version of `{label}` recorded in namespace `{namespace}` before `{current_version}`")]
    NoPriorVersion {
        namespace: String,
        label: String,
        current_version: String,
    },

    #[error("failed to set version `{version}` in namespace `{namespace}`: {source}")]
    ExternalMutationFailed {
        namespace: String,
        version: String,
        #[source]
        source: GitOpsError,
    },

    /// The version change was pushed but the ledger write failed.
    #[error("version `{version}` was pushed to namespace `{namespace}` but history was not recorded: {source}")]
    HistoryNotRecorded {
        namespace: String,
        version: String,
        #[source]
        source: LedgerError,
    },

    #[error("failed to read release history: {0}")]
    History(#[source] LedgerError),

    #[error("a promotion or rollback of `{label}` in namespace `{namespace}` is already in progress")]
    PromotionInProgress { namespace: String, label: String },
}

impl PromoteError {
    /// Informational outcome rather than a failure.
    pub fn is_noop(&self) -> bool {
        matches!(self, PromoteError::AlreadyCurrent { .. })
    }
}

pub type PromoteResult<T> = Result<T, PromoteError>;
