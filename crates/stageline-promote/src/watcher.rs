//! Confirmation watcher - follows instance events after a version change.
//!
//! ```text
//!            Added/Modified, Running, version == target
//! Watching ─────────────────────────────────────────────▶ Confirmed
//!    │  ▲
//!    │  └── Failed/Unknown: notify failure, keep watching
//!    │
//!    └── stream error or end ──▶ Aborted (logged, no notification)
//! ```
//!
//! Failing to open the subscription is reported straight away and never
//! enters the state machine.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stageline_core::{DEFAULT_LABEL_KEY, EventKind, InstanceEvent, Phase};
use stageline_observer::ClusterProvider;

use crate::notify::{Notifier, NotifyContext};

/// Parameters copied into a watcher at spawn time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub namespace: String,
    pub label: String,
    pub target_version: String,
    pub context: NotifyContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Watching,
    Confirmed { instance: String },
    Aborted { reason: String },
}

/// What the driver should do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    Ignore,
    NotifySuccess(String),
    NotifyFailure(String),
}

/// Final result of one watcher run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Confirmed { instance: String },
    Aborted { reason: String },
    SetupFailed { reason: String },
}

/// Pure confirmation state machine for one request.
#[derive(Debug, Clone)]
pub struct Confirmation {
    request: ConfirmationRequest,
    label_key: String,
    state: WatchState,
}

impl Confirmation {
    pub fn new(request: ConfirmationRequest, label_key: &str) -> Self {
        Self {
            request,
            label_key: label_key.to_string(),
            state: WatchState::Watching,
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state != WatchState::Watching
    }

    /// Feed one event. Terminal states ignore everything.
    pub fn on_event(&mut self, event: &InstanceEvent) -> WatchAction {
        if self.is_terminal() {
            return WatchAction::Ignore;
        }
        if !matches!(event.kind, EventKind::Added | EventKind::Modified) {
            return WatchAction::Ignore;
        }
        let instance = &event.instance;
        if instance.label(&self.label_key) != self.request.label {
            return WatchAction::Ignore;
        }
        let Some(version) = instance.version() else {
            debug!(
                instance = %instance.name,
                namespace = %self.request.namespace,
                "no version on instance, skipping event"
            );
            return WatchAction::Ignore;
        };

        let namespace = &self.request.namespace;
        if instance.phase == Phase::Running && version == self.request.target_version {
            self.state = WatchState::Confirmed {
                instance: instance.name.clone(),
            };
            return WatchAction::NotifySuccess(format!(
                "Pod `{}` with version `{version}` in namespace `{namespace}` is successfully running.",
                instance.name
            ));
        }
        if instance.phase.is_failure() {
            return WatchAction::NotifyFailure(format!(
                "Pod `{}` with version `{version}` in namespace `{namespace}` has failed to start.",
                instance.name
            ));
        }
        WatchAction::Ignore
    }

    pub fn abort(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.state = WatchState::Aborted {
                reason: reason.into(),
            };
        }
    }
}

/// Runs confirmations against a cluster and reports through a notifier.
#[derive(Clone)]
pub struct ConfirmationWatcher {
    cluster: Arc<dyn ClusterProvider>,
    notifier: Arc<dyn Notifier>,
    label_key: String,
}

impl ConfirmationWatcher {
    pub fn new(cluster: Arc<dyn ClusterProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            cluster,
            notifier,
            label_key: DEFAULT_LABEL_KEY.to_string(),
        }
    }

    pub fn with_label_key(mut self, label_key: impl Into<String>) -> Self {
        self.label_key = label_key.into();
        self
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Detach a watcher task. Its lifetime is independent of the caller.
    pub fn spawn(&self, request: ConfirmationRequest) -> JoinHandle<WatchOutcome> {
        let watcher = self.clone();
        tokio::spawn(async move { watcher.run(request).await })
    }

    /// Watch until confirmed or until the event stream ends.
    pub async fn run(&self, request: ConfirmationRequest) -> WatchOutcome {
        let namespace = request.namespace.clone();
        let context = request.context.clone();

        let mut events = match self.cluster.watch_instances(&namespace).await {
            Ok(events) => events,
            Err(e) => {
                warn!(%namespace, error = %e, "failed to watch instances");
                self.notifier
                    .notify_failure(
                        &context,
                        &format!("Failed to watch pods in namespace `{namespace}`"),
                    )
                    .await;
                return WatchOutcome::SetupFailed {
                    reason: e.to_string(),
                };
            }
        };

        debug!(%namespace, label = %request.label, target = %request.target_version, "confirmation watch started");
        let mut confirmation = Confirmation::new(request, &self.label_key);

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => match confirmation.on_event(&event) {
                    WatchAction::Ignore => {}
                    WatchAction::NotifySuccess(message) => {
                        self.notifier.notify_success(&context, &message).await;
                    }
                    WatchAction::NotifyFailure(message) => {
                        warn!(%namespace, instance = %event.instance.name, "instance failed during confirmation");
                        self.notifier.notify_failure(&context, &message).await;
                    }
                },
                Err(e) => confirmation.abort(e.to_string()),
            }
            if confirmation.is_terminal() {
                break;
            }
        }
        confirmation.abort("watch stream closed");

        match confirmation.state().clone() {
            WatchState::Confirmed { instance } => {
                info!(%namespace, %instance, "version change confirmed");
                WatchOutcome::Confirmed { instance }
            }
            WatchState::Aborted { reason } => {
                warn!(%namespace, %reason, "confirmation watch aborted");
                WatchOutcome::Aborted { reason }
            }
            WatchState::Watching => WatchOutcome::Aborted {
                reason: "watch stream closed".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelNotifier, Severity};
    use stageline_observer::ClusterError;
    use stageline_observer::memory::{InMemoryCluster, event, instance};

    fn request(version: &str) -> ConfirmationRequest {
        ConfirmationRequest {
            namespace: "qa".to_string(),
            label: "web".to_string(),
            target_version: version.to_string(),
            context: NotifyContext::new("/promote qa web", "alice"),
        }
    }

    #[test]
    fn running_target_confirms() {
        let mut c = Confirmation::new(request("1.1"), DEFAULT_LABEL_KEY);
        let action = c.on_event(&event(
            EventKind::Modified,
            instance("web-7", "org/web:1.1", "web", Phase::Running),
        ));
        assert!(matches!(action, WatchAction::NotifySuccess(m) if m.contains("`web-7`") && m.contains("`1.1`")));
        assert_eq!(c.state(), &WatchState::Confirmed { instance: "web-7".to_string() });

        // Terminal: later events change nothing.
        let action = c.on_event(&event(
            EventKind::Modified,
            instance("web-8", "org/web:1.1", "web", Phase::Failed),
        ));
        assert_eq!(action, WatchAction::Ignore);
    }

    #[test]
    fn old_version_running_is_ignored() {
        let mut c = Confirmation::new(request("1.1"), DEFAULT_LABEL_KEY);
        let action = c.on_event(&event(
            EventKind::Added,
            instance("web-1", "org/web:1.0", "web", Phase::Running),
        ));
        assert_eq!(action, WatchAction::Ignore);
        assert_eq!(c.state(), &WatchState::Watching);
    }

    #[test]
    fn failure_keeps_watching() {
        let mut c = Confirmation::new(request("1.1"), DEFAULT_LABEL_KEY);
        let action = c.on_event(&event(
            EventKind::Modified,
            instance("web-2", "org/web:1.1", "web", Phase::Unknown),
        ));
        assert!(matches!(action, WatchAction::NotifyFailure(m) if m.contains("has failed to start")));
        assert_eq!(c.state(), &WatchState::Watching);
    }

    #[test]
    fn deletes_other_labels_and_untagged_are_ignored() {
        let mut c = Confirmation::new(request("1.1"), DEFAULT_LABEL_KEY);
        let ignored = [
            event(EventKind::Deleted, instance("web-1", "org/web:1.1", "web", Phase::Running)),
            event(EventKind::Other, instance("web-1", "org/web:1.1", "web", Phase::Running)),
            event(EventKind::Added, instance("api-1", "org/api:1.1", "api", Phase::Running)),
            event(EventKind::Added, instance("web-1", "org/web", "web", Phase::Failed)),
        ];
        for e in &ignored {
            assert_eq!(c.on_event(e), WatchAction::Ignore);
        }
        assert_eq!(c.state(), &WatchState::Watching);
    }

    #[tokio::test]
    async fn failure_then_running_confirms_with_two_notifications() {
        let cluster = InMemoryCluster::new();
        cluster.script_watch(
            "qa",
            vec![
                event(EventKind::Modified, instance("web-1", "org/web:1.1", "web", Phase::Failed)),
                event(EventKind::Modified, instance("web-2", "org/web:1.1", "web", Phase::Running)),
            ],
        );
        let (notifier, mut rx) = ChannelNotifier::new();
        let watcher = ConfirmationWatcher::new(Arc::new(cluster), Arc::new(notifier));

        let outcome = watcher.spawn(request("1.1")).await.unwrap();
        assert_eq!(outcome, WatchOutcome::Confirmed { instance: "web-2".to_string() });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.severity, Severity::Failure);
        assert!(first.message.contains("web-1"));
        assert_eq!(second.severity, Severity::Success);
        assert!(second.message.contains("web-2"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_stream_aborts_silently() {
        let cluster = InMemoryCluster::new();
        cluster.script_watch(
            "qa",
            vec![event(EventKind::Added, instance("web-1", "org/web:1.0", "web", Phase::Running))],
        );
        let (notifier, mut rx) = ChannelNotifier::new();
        let watcher = ConfirmationWatcher::new(Arc::new(cluster), Arc::new(notifier));

        let outcome = watcher.run(request("1.1")).await;
        assert!(matches!(outcome, WatchOutcome::Aborted { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn setup_failure_notifies_immediately() {
        let cluster = InMemoryCluster::new();
        cluster.fail_watches(Some(ClusterError::Watch("forbidden".into())));
        let (notifier, mut rx) = ChannelNotifier::new();
        let watcher = ConfirmationWatcher::new(Arc::new(cluster), Arc::new(notifier));

        let outcome = watcher.run(request("1.1")).await;
        assert!(matches!(outcome, WatchOutcome::SetupFailed { reason } if reason.contains("forbidden")));
        let n = rx.recv().await.unwrap();
        assert_eq!(n.severity, Severity::Failure);
        assert_eq!(n.message, "Failed to watch pods in namespace `qa`");
    }
}
