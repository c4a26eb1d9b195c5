//! Promotion and rollback decision engine.
//!
//! Both paths follow the same order within one call: decide, push the
//! new version through the [`VersionSetter`], write history (promotion
//! only), then detach a [`ConfirmationWatcher`]. The caller gets its
//! answer without waiting for confirmation.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use stageline_core::Pipeline;
use stageline_gitops::{SetOutcome, VersionSetter};
use stageline_ledger::{HistoryEntry, HistoryLedger};
use stageline_observer::{DriftReport, InstanceListing, WorkloadObserver};

use crate::error::{PromoteError, PromoteResult};
use crate::lock::{PromotionGuard, PromotionLocks};
use crate::notify::NotifyContext;
use crate::watcher::{ConfirmationRequest, ConfirmationWatcher, WatchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Promote,
    Rollback,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Promote => f.write_str("Promote"),
            ChangeKind::Rollback => f.write_str("Rollback"),
        }
    }
}

/// Commit message for a version change.
pub fn change_description(kind: ChangeKind, label: &str, version: &str, namespace: &str) -> String {
    format!("{kind} {label} version {version} to {namespace}")
}

/// A version change that was pushed and is now being confirmed.
#[derive(Debug)]
pub struct PromotionOutcome {
    pub kind: ChangeKind,
    pub namespace: String,
    pub label: String,
    /// Upstream stage the version came from; `None` for rollbacks.
    pub source_namespace: Option<String>,
    pub previous_version: String,
    pub version: String,
    pub set_outcome: SetOutcome,
    pub message: String,
    /// The detached confirmation task.
    pub confirmation: JoinHandle<WatchOutcome>,
}

#[derive(Clone)]
pub struct PromotionEngine {
    pipeline: Pipeline,
    observer: WorkloadObserver,
    ledger: Arc<dyn HistoryLedger>,
    setter: Arc<dyn VersionSetter>,
    watcher: ConfirmationWatcher,
    locks: PromotionLocks,
}

impl PromotionEngine {
    pub fn new(
        pipeline: Pipeline,
        observer: WorkloadObserver,
        ledger: Arc<dyn HistoryLedger>,
        setter: Arc<dyn VersionSetter>,
        watcher: ConfirmationWatcher,
    ) -> Self {
        Self {
            pipeline,
            observer,
            ledger,
            setter,
            watcher,
            locks: PromotionLocks::new(),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn observer(&self) -> &WorkloadObserver {
        &self.observer
    }

    pub fn locks(&self) -> &PromotionLocks {
        &self.locks
    }

    /// Promote `label` in `namespace` to whatever its upstream stage runs.
    pub async fn promote(
        &self,
        namespace: &str,
        label: &str,
        context: &NotifyContext,
    ) -> PromoteResult<PromotionOutcome> {
        let source = self.pipeline.source_of(namespace)?.to_string();
        let _guard = self.acquire(namespace, label)?;

        let current = self
            .observer
            .current_version(namespace, label)
            .await?
            .ok_or_else(|| PromoteError::LabelNotFound {
                namespace: namespace.to_string(),
                label: label.to_string(),
            })?;
        let candidate = self
            .observer
            .current_version(&source, label)
            .await?
            .ok_or_else(|| PromoteError::LabelNotFoundInSource {
                source_namespace: source.clone(),
                label: label.to_string(),
            })?;
        debug!(%namespace, %label, %source, %current, %candidate, "promotion decision");

        if current == candidate {
            info!(%namespace, %label, version = %current, "already current, nothing to promote");
            return Err(PromoteError::AlreadyCurrent {
                namespace: namespace.to_string(),
                version: current,
            });
        }

        let set_outcome = self
            .set_version(ChangeKind::Promote, namespace, label, &candidate)
            .await?;

        let recorded = self.ledger.append(namespace, &candidate, label);
        let confirmation = self.watch(namespace, label, &candidate, context);

        if let Err(e) = recorded {
            error!(%namespace, %label, version = %candidate, error = %e, "version pushed but history not recorded");
            return Err(PromoteError::HistoryNotRecorded {
                namespace: namespace.to_string(),
                version: candidate,
                source: e,
            });
        }

        info!(%namespace, %label, from = %current, to = %candidate, "promotion initiated");
        Ok(PromotionOutcome {
            kind: ChangeKind::Promote,
            message: format!(
                "Promotion of version `{candidate}` to namespace `{namespace}` has been initiated. Please wait for the deployment to complete."
            ),
            namespace: namespace.to_string(),
            label: label.to_string(),
            source_namespace: Some(source),
            previous_version: current,
            version: candidate,
            set_outcome,
            confirmation,
        })
    }

    /// Restore the version recorded before the one `namespace` runs now.
    ///
    /// Rollbacks are not written to history, so repeated rollbacks keep
    /// walking further back.
    pub async fn rollback(
        &self,
        namespace: &str,
        label: &str,
        context: &NotifyContext,
    ) -> PromoteResult<PromotionOutcome> {
        self.pipeline.ensure_promotable(namespace)?;
        let _guard = self.acquire(namespace, label)?;

        let current = self
            .observer
            .current_version(namespace, label)
            .await?
            .ok_or_else(|| PromoteError::LabelNotFound {
                namespace: namespace.to_string(),
                label: label.to_string(),
            })?;
        let target = self
            .ledger
            .find_previous(namespace, &current, label)
            .map_err(PromoteError::History)?
            .ok_or_else(|| PromoteError::NoPriorVersion {
                namespace: namespace.to_string(),
                label: label.to_string(),
                current_version: current.clone(),
            })?;
        debug!(%namespace, %label, %current, %target, "rollback decision");

        let set_outcome = self
            .set_version(ChangeKind::Rollback, namespace, label, &target)
            .await?;
        let confirmation = self.watch(namespace, label, &target, context);

        info!(%namespace, %label, from = %current, to = %target, "rollback initiated");
        Ok(PromotionOutcome {
            kind: ChangeKind::Rollback,
            message: format!(
                "Rollback to version `{target}` in namespace `{namespace}` has been initiated. Please wait for the deployment to complete."
            ),
            namespace: namespace.to_string(),
            label: label.to_string(),
            source_namespace: None,
            previous_version: current,
            version: target,
            set_outcome,
            confirmation,
        })
    }

    /// Instances of any pipeline stage, with status.
    pub async fn list(&self, namespace: &str) -> PromoteResult<Vec<InstanceListing>> {
        self.pipeline.ensure_known(namespace)?;
        Ok(self.observer.list_with_status(namespace).await?)
    }

    /// Versions of `label` across the whole pipeline.
    pub async fn drift(&self, label: &str) -> PromoteResult<DriftReport> {
        Ok(self.observer.drift(self.pipeline.stages(), label).await?)
    }

    /// Recorded promotions of `label` in `namespace`, oldest first.
    pub fn history(&self, namespace: &str, label: &str) -> PromoteResult<Vec<HistoryEntry>> {
        self.pipeline.ensure_known(namespace)?;
        self.ledger
            .entries(namespace, label)
            .map_err(PromoteError::History)
    }

    /// Send the single operator notification for a finished request.
    pub async fn report(&self, context: &NotifyContext, result: &PromoteResult<PromotionOutcome>) {
        let notifier = self.watcher.notifier();
        match result {
            Ok(outcome) => notifier.notify_success(context, &outcome.message).await,
            Err(e) if e.is_noop() => notifier.notify_success(context, &e.to_string()).await,
            Err(e) => notifier.notify_failure(context, &e.to_string()).await,
        }
    }

    fn acquire(&self, namespace: &str, label: &str) -> PromoteResult<PromotionGuard> {
        self.locks
            .try_acquire(namespace, label)
            .ok_or_else(|| PromoteError::PromotionInProgress {
                namespace: namespace.to_string(),
                label: label.to_string(),
            })
    }

    async fn set_version(
        &self,
        kind: ChangeKind,
        namespace: &str,
        label: &str,
        version: &str,
    ) -> PromoteResult<SetOutcome> {
        let description = change_description(kind, label, version, namespace);
        self.setter
            .set_version(namespace, version, &description)
            .await
            .map_err(|source| PromoteError::ExternalMutationFailed {
                namespace: namespace.to_string(),
                version: version.to_string(),
                source,
            })
    }

    fn watch(
        &self,
        namespace: &str,
        label: &str,
        version: &str,
        context: &NotifyContext,
    ) -> JoinHandle<WatchOutcome> {
        self.watcher.spawn(ConfirmationRequest {
            namespace: namespace.to_string(),
            label: label.to_string(),
            target_version: version.to_string(),
            context: context.clone(),
        })
    }
}
