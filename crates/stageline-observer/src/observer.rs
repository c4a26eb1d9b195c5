//! Workload observer - resilient queries over live cluster state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use stageline_core::{InstanceStatus, WorkloadInstance, DEFAULT_LABEL_KEY};

use crate::error::{ObserverError, ObserverResult};
use crate::provider::ClusterProvider;

/// Bounded retry for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(30),
        }
    }
}

/// One row of a namespace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceListing {
    pub name: String,
    pub version: String,
    pub label: String,
    pub status: String,
}

/// The version a stage is running for one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageVersion {
    pub namespace: String,
    pub version: Option<String>,
    pub status: Option<String>,
}

/// Per-stage versions of one label across the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub label: String,
    pub stages: Vec<StageVersion>,
    /// Every stage that runs the label runs the same version.
    pub in_sync: bool,
}

impl DriftReport {
    pub fn summary(&self) -> String {
        if self.in_sync {
            return "All applications are running the same version across namespaces. No promotion needed."
                .to_string();
        }
        let lines: Vec<String> = self
            .stages
            .iter()
            .filter_map(|s| {
                let version = s.version.as_deref()?;
                Some(format!(
                    "Namespace: `{}`, Version: `{}`, Status: `{}`",
                    s.namespace,
                    version,
                    s.status.as_deref().unwrap_or("")
                ))
            })
            .collect();
        format!(
            "Differences found in application versions across namespaces:\n{}",
            lines.join("\n")
        )
    }
}

/// Read-through view of workload instances.
#[derive(Clone)]
pub struct WorkloadObserver {
    cluster: Arc<dyn ClusterProvider>,
    label_key: String,
    retry: RetryPolicy,
}

impl WorkloadObserver {
    pub fn new(cluster: Arc<dyn ClusterProvider>) -> Self {
        Self {
            cluster,
            label_key: DEFAULT_LABEL_KEY.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_label_key(mut self, label_key: impl Into<String>) -> Self {
        self.label_key = label_key.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// List every instance in `namespace`. Zero instances is an error.
    pub async fn list_instances(&self, namespace: &str) -> ObserverResult<Vec<WorkloadInstance>> {
        self.cluster.ensure_connected().await?;
        let snapshots = self.cluster.list_instances(namespace).await?;
        if snapshots.is_empty() {
            return Err(ObserverError::EmptyNamespace(namespace.to_string()));
        }
        Ok(snapshots
            .iter()
            .map(|s| WorkloadInstance::from_snapshot(s, &self.label_key))
            .collect())
    }

    /// Retry the full list query up to `max_attempts` times, sleeping
    /// `delay` between attempts. The final error is wrapped with the
    /// namespace and the number of attempts made.
    pub async fn list_instances_with_retry(
        &self,
        namespace: &str,
        max_attempts: u32,
        delay: Duration,
    ) -> ObserverResult<Vec<WorkloadInstance>> {
        let attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.list_instances(namespace).await {
                Ok(instances) => return Ok(instances),
                Err(e) => {
                    warn!(
                        %namespace,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "error listing instances"
                    );
                    if attempt >= attempts {
                        return Err(ObserverError::RetriesExhausted {
                            namespace: namespace.to_string(),
                            attempts,
                            source: Box::new(e),
                        });
                    }
                }
            }
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }

    /// [`list_instances_with_retry`](Self::list_instances_with_retry) with
    /// the configured policy.
    pub async fn list_retrying(&self, namespace: &str) -> ObserverResult<Vec<WorkloadInstance>> {
        self.list_instances_with_retry(namespace, self.retry.max_attempts, self.retry.delay)
            .await
    }

    /// Every instance in `namespace` with its operator-facing status.
    pub async fn list_with_status(&self, namespace: &str) -> ObserverResult<Vec<InstanceListing>> {
        let instances = self.list_retrying(namespace).await?;
        Ok(instances
            .into_iter()
            .map(|i| InstanceListing {
                status: i.status().to_string(),
                name: i.name,
                version: i.version,
                label: i.label,
            })
            .collect())
    }

    /// Operator-facing status of one instance: the first container
    /// waiting reason if any, otherwise the phase.
    pub async fn status(&self, namespace: &str, name: &str) -> ObserverResult<InstanceStatus> {
        self.cluster.ensure_connected().await?;
        let snapshot = self
            .cluster
            .get_instance(namespace, name)
            .await?
            .ok_or_else(|| ObserverError::InstanceNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        Ok(snapshot.status())
    }

    /// Version of the first instance in `namespace` carrying `label`.
    ///
    /// `None` when no instance carries the label or its image has no
    /// usable tag.
    pub async fn current_version(
        &self,
        namespace: &str,
        label: &str,
    ) -> ObserverResult<Option<String>> {
        let instances = self.list_retrying(namespace).await?;
        let version = instances
            .into_iter()
            .find(|i| i.label == label)
            .map(|i| i.version)
            .filter(|v| !v.is_empty());
        debug!(%namespace, %label, version = version.as_deref().unwrap_or("<none>"), "resolved current version");
        Ok(version)
    }

    /// Compare the running version of `label` across `stages`.
    ///
    /// Per stage, the first *running* instance with the label counts.
    /// Any query failure aborts the report.
    pub async fn drift(&self, stages: &[String], label: &str) -> ObserverResult<DriftReport> {
        let mut found_label = false;
        let mut rows = Vec::with_capacity(stages.len());

        for namespace in stages {
            let instances = self.list_retrying(namespace).await?;
            let mut row = StageVersion {
                namespace: namespace.clone(),
                version: None,
                status: None,
            };
            for instance in instances.iter().filter(|i| i.label == label) {
                found_label = true;
                let status = instance.status();
                if status.is_running() {
                    row.version = Some(instance.version.clone()).filter(|v| !v.is_empty());
                    row.status = Some(status.to_string());
                    break;
                }
            }
            rows.push(row);
        }

        if !found_label {
            return Err(ObserverError::LabelNotFoundAnywhere(label.to_string()));
        }

        let mut versions = rows.iter().filter_map(|r| r.version.as_deref());
        let in_sync = match versions.next() {
            Some(first) => versions.all(|v| v == first),
            None => true,
        };

        Ok(DriftReport {
            label: label.to_string(),
            stages: rows,
            in_sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClusterError;
    use crate::memory::{instance, InMemoryCluster};
    use stageline_core::Phase;

    fn observer(cluster: &InMemoryCluster) -> WorkloadObserver {
        WorkloadObserver::new(Arc::new(cluster.clone())).with_retry(RetryPolicy {
            max_attempts: 3,
            delay: Duration::ZERO,
        })
    }

    fn stages() -> Vec<String> {
        ["dev", "qa", "stage", "prod"].iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn list_maps_snapshots() {
        let cluster = InMemoryCluster::new();
        cluster.put_instance("qa", instance("web-1", "org/web:1.4", "web", Phase::Running));
        cluster.put_instance("qa", instance("db-1", "postgres", "", Phase::Running));

        let listed = observer(&cluster).list_instances("qa").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].version, "1.4");
        assert_eq!(listed[0].label, "web");
        assert_eq!(listed[1].version, "");
        assert_eq!(listed[1].label, "");
    }

    #[tokio::test]
    async fn empty_namespace_is_an_error() {
        let cluster = InMemoryCluster::new();
        let err = observer(&cluster).list_instances("qa").await.unwrap_err();
        assert!(matches!(err, ObserverError::EmptyNamespace(ns) if ns == "qa"));
    }

    #[tokio::test]
    async fn retry_makes_exactly_max_attempts() {
        let cluster = InMemoryCluster::new();
        cluster.fail_lists(Some(ClusterError::Query("connection reset".into())));

        let err = observer(&cluster)
            .list_instances_with_retry("prod", 3, Duration::ZERO)
            .await
            .unwrap_err();

        assert_eq!(cluster.list_calls(), 3);
        match &err {
            ObserverError::RetriesExhausted { namespace, attempts, .. } => {
                assert_eq!(namespace, "prod");
                assert_eq!(*attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("'prod'"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_sleeps_only_between_attempts() {
        let cluster = InMemoryCluster::new();
        cluster.fail_lists(Some(ClusterError::Query("down".into())));

        let started = tokio::time::Instant::now();
        let _ = observer(&cluster)
            .list_instances_with_retry("qa", 3, Duration::from_secs(30))
            .await;
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn retry_recovers_when_namespace_fills() {
        let cluster = InMemoryCluster::new();
        let obs = observer(&cluster);

        // Empty namespace counts as a failure and is retried.
        assert!(obs.list_instances_with_retry("qa", 2, Duration::ZERO).await.is_err());
        assert_eq!(cluster.list_calls(), 2);

        cluster.put_instance("qa", instance("web-1", "org/web:1.0", "web", Phase::Running));
        let listed = obs.list_instances_with_retry("qa", 2, Duration::ZERO).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(cluster.list_calls(), 3);
    }

    #[tokio::test]
    async fn disconnected_cluster_fails_before_query() {
        let cluster = InMemoryCluster::new();
        cluster.set_connected(false);
        let err = observer(&cluster).list_instances("qa").await.unwrap_err();
        assert!(matches!(err, ObserverError::Cluster(ClusterError::Connectivity(_))));
        assert_eq!(cluster.list_calls(), 0);
    }

    #[tokio::test]
    async fn status_prefers_waiting_reason() {
        let cluster = InMemoryCluster::new();
        let mut snap = instance("web-1", "org/web:1.0", "web", Phase::Pending);
        snap.waiting_reasons = vec!["CrashLoopBackOff".to_string()];
        cluster.put_instance("qa", snap);
        cluster.put_instance("qa", instance("web-2", "org/web:1.0", "web", Phase::Running));

        let obs = observer(&cluster);
        assert_eq!(
            obs.status("qa", "web-1").await.unwrap(),
            InstanceStatus::Waiting("CrashLoopBackOff".to_string())
        );
        assert_eq!(
            obs.status("qa", "web-2").await.unwrap(),
            InstanceStatus::Phase(Phase::Running)
        );
        assert!(matches!(
            obs.status("qa", "nope").await,
            Err(ObserverError::InstanceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn listing_carries_status() {
        let cluster = InMemoryCluster::new();
        let mut snap = instance("web-1", "org/web:1.0", "web", Phase::Pending);
        snap.waiting_reasons = vec!["ImagePullBackOff".to_string()];
        cluster.put_instance("dev", snap);
        cluster.put_instance("dev", instance("api-1", "org/api:2.0", "api", Phase::Running));

        let rows = observer(&cluster).list_with_status("dev").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, "ImagePullBackOff");
        assert_eq!(rows[1].status, "Running");
        assert_eq!(rows[1].version, "2.0");
    }

    #[tokio::test]
    async fn current_version_takes_first_label_match() {
        let cluster = InMemoryCluster::new();
        cluster.put_instance("qa", instance("api-1", "org/api:3.0", "api", Phase::Running));
        cluster.put_instance("qa", instance("web-1", "org/web:1.1", "web", Phase::Running));
        cluster.put_instance("qa", instance("web-2", "org/web:1.2", "web", Phase::Running));

        let obs = observer(&cluster);
        assert_eq!(obs.current_version("qa", "web").await.unwrap().as_deref(), Some("1.1"));
        assert_eq!(obs.current_version("qa", "cache").await.unwrap(), None);
    }

    #[tokio::test]
    async fn drift_reports_differences() {
        let cluster = InMemoryCluster::new();
        cluster.put_instance("dev", instance("web-1", "org/web:1.3", "web", Phase::Running));
        cluster.put_instance("qa", instance("web-1", "org/web:1.2", "web", Phase::Running));
        cluster.put_instance("stage", instance("web-1", "org/web:1.2", "web", Phase::Running));
        cluster.put_instance("prod", instance("web-1", "org/web:1.1", "web", Phase::Failed));
        cluster.put_instance("prod", instance("api-1", "org/api:1.0", "api", Phase::Running));

        let report = observer(&cluster).drift(&stages(), "web").await.unwrap();
        assert!(!report.in_sync);
        assert_eq!(report.stages[0].version.as_deref(), Some("1.3"));
        // Prod's only web instance isn't running, so it doesn't count.
        assert_eq!(report.stages[3].version, None);
        let summary = report.summary();
        assert!(summary.contains("Namespace: `dev`, Version: `1.3`, Status: `Running`"));
        assert!(!summary.contains("`prod`"));
    }

    #[tokio::test]
    async fn drift_in_sync() {
        let cluster = InMemoryCluster::new();
        for ns in stages() {
            cluster.put_instance(&ns, instance("web-1", "org/web:2.0", "web", Phase::Running));
        }
        let report = observer(&cluster).drift(&stages(), "web").await.unwrap();
        assert!(report.in_sync);
        assert!(report.summary().contains("No promotion needed"));
    }

    #[tokio::test]
    async fn drift_unknown_label() {
        let cluster = InMemoryCluster::new();
        for ns in stages() {
            cluster.put_instance(&ns, instance("api-1", "org/api:2.0", "api", Phase::Running));
        }
        let err = observer(&cluster).drift(&stages(), "web").await.unwrap_err();
        assert!(matches!(err, ObserverError::LabelNotFoundAnywhere(l) if l == "web"));
    }
}
