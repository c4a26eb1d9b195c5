//! Kubernetes-backed cluster provider.
//!
//! Connection settings are resolved in this order:
//! 1. `KUBECONFIG` set: inferred configuration from that file.
//! 2. `KUBE_SERVER` + `KUBE_TOKEN` + `KUBE_CA` (base64 CA bundle).
//! 3. Inferred configuration (default kubeconfig, then in-cluster).

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher;
use kube::{Client, Config, ResourceExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use stageline_core::{EventKind, InstanceEvent, InstanceSnapshot, Phase};

use crate::error::ClusterError;
use crate::provider::{ClusterProvider, InstanceStream};

const CONTEXT_NAME: &str = "stageline";

/// Cluster provider talking to a Kubernetes API server.
pub struct KubeCluster {
    client: RwLock<Client>,
}

impl KubeCluster {
    /// Build a client from the environment.
    pub async fn connect() -> Result<Self, ClusterError> {
        let client = build_client().await?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client: RwLock::new(client),
        }
    }

    async fn client(&self) -> Client {
        self.client.read().await.clone()
    }

    async fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client().await, namespace)
    }
}

#[async_trait]
impl ClusterProvider for KubeCluster {
    async fn ensure_connected(&self) -> Result<(), ClusterError> {
        let client = self.client().await;
        if let Err(e) = client.apiserver_version().await {
            warn!(error = %e, "cluster connection lost, reconnecting");
            let fresh = build_client().await?;
            fresh
                .apiserver_version()
                .await
                .map_err(|e| ClusterError::Connectivity(e.to_string()))?;
            *self.client.write().await = fresh;
            info!("cluster connection re-established");
        }
        Ok(())
    }

    async fn list_instances(&self, namespace: &str) -> Result<Vec<InstanceSnapshot>, ClusterError> {
        let pods = self
            .pods(namespace)
            .await
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::Query(format!("failed to list pods in namespace {namespace}: {e}")))?;
        debug!(%namespace, count = pods.items.len(), "listed pods");
        Ok(pods.items.iter().map(pod_snapshot).collect())
    }

    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<InstanceSnapshot>, ClusterError> {
        let pod = self
            .pods(namespace)
            .await
            .get_opt(name)
            .await
            .map_err(|e| ClusterError::Query(format!("failed to get pod details: {e}")))?;
        Ok(pod.as_ref().map(pod_snapshot))
    }

    async fn watch_instances(&self, namespace: &str) -> Result<InstanceStream, ClusterError> {
        let api = self.pods(namespace).await;
        // Fail fast on an unreachable namespace instead of surfacing the
        // error as the first stream item.
        api.list(&ListParams::default().limit(1))
            .await
            .map_err(|e| ClusterError::Watch(format!("failed to watch pods in namespace {namespace}: {e}")))?;

        let events = watcher(api, watcher::Config::default()).filter_map(|item| async move {
            match item {
                Ok(watcher::Event::InitApply(pod)) => Some(Ok(InstanceEvent {
                    kind: EventKind::Added,
                    instance: pod_snapshot(&pod),
                })),
                Ok(watcher::Event::Apply(pod)) => Some(Ok(InstanceEvent {
                    kind: EventKind::Modified,
                    instance: pod_snapshot(&pod),
                })),
                Ok(watcher::Event::Delete(pod)) => Some(Ok(InstanceEvent {
                    kind: EventKind::Deleted,
                    instance: pod_snapshot(&pod),
                })),
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                Err(e) => Some(Err(ClusterError::Watch(e.to_string()))),
            }
        });
        Ok(events.boxed())
    }
}

/// Convert a pod into the provider-neutral snapshot.
pub fn pod_snapshot(pod: &Pod) -> InstanceSnapshot {
    let images = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .filter_map(|c| c.image.clone())
                .collect()
        })
        .unwrap_or_default();

    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(Phase::parse)
        .unwrap_or(Phase::Pending);
    let waiting_reasons = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|cs| cs.state.as_ref()?.waiting.as_ref()?.reason.clone())
                .collect()
        })
        .unwrap_or_default();

    InstanceSnapshot {
        name: pod.name_any(),
        images,
        labels: pod.labels().clone(),
        phase,
        waiting_reasons,
    }
}

async fn build_client() -> Result<Client, ClusterError> {
    let config = build_config().await?;
    Client::try_from(config).map_err(|e| ClusterError::Connectivity(e.to_string()))
}

async fn build_config() -> Result<Config, ClusterError> {
    if std::env::var_os("KUBECONFIG").is_some() {
        info!("using KUBECONFIG for configuration");
        return infer_config().await;
    }
    match config_from_env().await {
        Ok(config) => {
            info!("using KUBE_SERVER/KUBE_TOKEN/KUBE_CA for configuration");
            Ok(config)
        }
        Err(e) => {
            debug!(error = %e, "falling back to inferred configuration");
            infer_config().await
        }
    }
}

async fn infer_config() -> Result<Config, ClusterError> {
    Config::infer()
        .await
        .map_err(|e| ClusterError::Connectivity(e.to_string()))
}

async fn config_from_env() -> Result<Config, ClusterError> {
    let server = std::env::var("KUBE_SERVER").unwrap_or_default();
    let token = std::env::var("KUBE_TOKEN").unwrap_or_default();
    let ca = std::env::var("KUBE_CA").unwrap_or_default();
    let kubeconfig = env_kubeconfig(&server, &token, &ca)?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ClusterError::Connectivity(e.to_string()))
}

/// Assemble a single-context kubeconfig from explicit credentials.
///
/// JSON is valid YAML, so the document is built with `serde_json`.
fn env_kubeconfig(server: &str, token: &str, ca: &str) -> Result<Kubeconfig, ClusterError> {
    if server.is_empty() || token.is_empty() || ca.is_empty() {
        return Err(ClusterError::Connectivity(
            "KUBE_SERVER, KUBE_CA, and KUBE_TOKEN environment variables must be set".to_string(),
        ));
    }
    let doc = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": CONTEXT_NAME,
            "cluster": { "server": server, "certificate-authority-data": ca }
        }],
        "users": [{ "name": CONTEXT_NAME, "user": { "token": token } }],
        "contexts": [{
            "name": CONTEXT_NAME,
            "context": { "cluster": CONTEXT_NAME, "user": CONTEXT_NAME }
        }],
        "current-context": CONTEXT_NAME,
    });
    Kubeconfig::from_yaml(&doc.to_string()).map_err(|e| ClusterError::Connectivity(e.to_string()))
}
