//! In-memory cluster provider for tests and dry runs.
//!
//! Namespaces hold plain snapshots. Watches replay a scripted list of
//! events and then close, which lets confirmation logic be driven
//! deterministically.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;

use stageline_core::{
    EventKind, InstanceEvent, InstanceSnapshot, Phase, DEFAULT_LABEL_KEY,
};

use crate::error::ClusterError;
use crate::provider::{ClusterProvider, InstanceStream};

#[derive(Default)]
struct Inner {
    namespaces: BTreeMap<String, Vec<InstanceSnapshot>>,
    watch_scripts: HashMap<String, VecDeque<Vec<InstanceEvent>>>,
    list_failure: Option<ClusterError>,
    watch_failure: Option<ClusterError>,
    disconnected: bool,
    list_calls: u32,
    watch_calls: u32,
}

/// Shared, cloneable fake of live cluster state.
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic in another test thread must not cascade.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add or replace an instance (matched by name) in `namespace`.
    pub fn put_instance(&self, namespace: &str, snapshot: InstanceSnapshot) {
        let mut inner = self.lock();
        let instances = inner.namespaces.entry(namespace.to_string()).or_default();
        match instances.iter_mut().find(|i| i.name == snapshot.name) {
            Some(existing) => *existing = snapshot,
            None => instances.push(snapshot),
        }
    }

    /// Make every list call fail with `error` until cleared with `None`.
    pub fn fail_lists(&self, error: Option<ClusterError>) {
        self.lock().list_failure = error;
    }

    /// Make watch subscriptions fail to establish.
    pub fn fail_watches(&self, error: Option<ClusterError>) {
        self.lock().watch_failure = error;
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().disconnected = !connected;
    }

    /// Queue events for the next watch on `namespace`. Each call queues
    /// one subscription's worth; the stream closes after the last event.
    pub fn script_watch(&self, namespace: &str, events: Vec<InstanceEvent>) {
        self.lock()
            .watch_scripts
            .entry(namespace.to_string())
            .or_default()
            .push_back(events);
    }

    /// Number of list calls served so far, failed ones included.
    pub fn list_calls(&self) -> u32 {
        self.lock().list_calls
    }

    pub fn watch_calls(&self) -> u32 {
        self.lock().watch_calls
    }
}

#[async_trait]
impl ClusterProvider for InMemoryCluster {
    async fn ensure_connected(&self) -> Result<(), ClusterError> {
        if self.lock().disconnected {
            return Err(ClusterError::Connectivity("in-memory cluster disconnected".to_string()));
        }
        Ok(())
    }

    async fn list_instances(&self, namespace: &str) -> Result<Vec<InstanceSnapshot>, ClusterError> {
        let mut inner = self.lock();
        inner.list_calls += 1;
        if let Some(err) = &inner.list_failure {
            return Err(err.clone());
        }
        Ok(inner.namespaces.get(namespace).cloned().unwrap_or_default())
    }

    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<InstanceSnapshot>, ClusterError> {
        let inner = self.lock();
        Ok(inner
            .namespaces
            .get(namespace)
            .and_then(|instances| instances.iter().find(|i| i.name == name))
            .cloned())
    }

    async fn watch_instances(&self, namespace: &str) -> Result<InstanceStream, ClusterError> {
        let mut inner = self.lock();
        inner.watch_calls += 1;
        if let Some(err) = &inner.watch_failure {
            return Err(err.clone());
        }
        let events = inner
            .watch_scripts
            .get_mut(namespace)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
    }
}

/// Build a snapshot with a single container and the default label key.
pub fn instance(name: &str, image: &str, label: &str, phase: Phase) -> InstanceSnapshot {
    let mut labels = BTreeMap::new();
    if !label.is_empty() {
        labels.insert(DEFAULT_LABEL_KEY.to_string(), label.to_string());
    }
    InstanceSnapshot {
        name: name.to_string(),
        images: vec![image.to_string()],
        labels,
        phase,
        waiting_reasons: Vec::new(),
    }
}

/// Build a watch event for `instance`.
pub fn event(kind: EventKind, instance: InstanceSnapshot) -> InstanceEvent {
    InstanceEvent { kind, instance }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_replaces_by_name() {
        let cluster = InMemoryCluster::new();
        cluster.put_instance("qa", instance("web-1", "org/web:1.0", "web", Phase::Pending));
        cluster.put_instance("qa", instance("web-1", "org/web:1.0", "web", Phase::Running));

        let listed = cluster.list_instances("qa").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].phase, Phase::Running);
        assert_eq!(cluster.list_calls(), 1);
    }

    #[tokio::test]
    async fn scripted_watch_replays_then_closes() {
        let cluster = InMemoryCluster::new();
        let snap = instance("web-1", "org/web:1.0", "web", Phase::Running);
        cluster.script_watch("qa", vec![event(EventKind::Added, snap.clone())]);

        let mut stream = cluster.watch_instances("qa").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.instance, snap);
        assert!(stream.next().await.is_none());

        // Script consumed; the next watch is empty.
        let mut stream = cluster.watch_instances("qa").await.unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(cluster.watch_calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_injectable() {
        let cluster = InMemoryCluster::new();
        cluster.fail_lists(Some(ClusterError::Query("boom".into())));
        assert!(cluster.list_instances("qa").await.is_err());

        cluster.fail_watches(Some(ClusterError::Watch("denied".into())));
        assert!(cluster.watch_instances("qa").await.is_err());

        cluster.set_connected(false);
        assert!(matches!(
            cluster.ensure_connected().await,
            Err(ClusterError::Connectivity(_))
        ));
    }
}
