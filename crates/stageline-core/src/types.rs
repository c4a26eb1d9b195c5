//! Shared types used across Stageline crates.
//!
//! Instances are read-through views of cluster state. Nothing here is
//! cached or mutated by the controller; every request re-fetches.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default label key used to group instances into a logical workload.
pub const DEFAULT_LABEL_KEY: &str = "app.kubernetes.io/name";

/// Coarse lifecycle phase of an instance, as reported by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl Phase {
    /// Parse an orchestrator phase string. Anything unrecognized is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => Phase::Pending,
            "Running" => Phase::Running,
            "Succeeded" => Phase::Succeeded,
            "Failed" => Phase::Failed,
            _ => Phase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
            Phase::Unknown => "Unknown",
        }
    }

    /// Phases that count as a failed start during confirmation.
    pub fn is_failure(&self) -> bool {
        matches!(self, Phase::Failed | Phase::Unknown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-facing status of an instance.
///
/// A container waiting reason (e.g. `CrashLoopBackOff`) is more useful
/// than the coarse phase, so it wins when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InstanceStatus {
    Phase(Phase),
    Waiting(String),
}

impl InstanceStatus {
    /// A waiting reason, when present, takes precedence over `phase`.
    pub fn resolve(phase: Phase, waiting_reason: Option<&str>) -> Self {
        match waiting_reason {
            Some(reason) => InstanceStatus::Waiting(reason.to_string()),
            None => InstanceStatus::Phase(phase),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, InstanceStatus::Phase(Phase::Running))
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Phase(phase) => write!(f, "{phase}"),
            InstanceStatus::Waiting(reason) => f.write_str(reason),
        }
    }
}

/// Raw instance data as returned by a cluster provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub name: String,
    /// Container image references, in container order.
    pub images: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub phase: Phase,
    /// Waiting reasons reported by containers; empty strings are ignored.
    pub waiting_reasons: Vec<String>,
}

impl InstanceSnapshot {
    /// Version of the first container whose image carries an unambiguous tag.
    pub fn version(&self) -> Option<&str> {
        self.images.iter().find_map(|image| extract_version(image))
    }

    /// Value of `label_key`, or an empty string when the label is absent.
    pub fn label(&self, label_key: &str) -> &str {
        self.labels.get(label_key).map(String::as_str).unwrap_or("")
    }

    /// First non-empty container waiting reason.
    pub fn waiting_reason(&self) -> Option<&str> {
        self.waiting_reasons
            .iter()
            .map(String::as_str)
            .find(|r| !r.is_empty())
    }

    pub fn status(&self) -> InstanceStatus {
        InstanceStatus::resolve(self.phase, self.waiting_reason())
    }
}

/// One running unit of a workload within a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadInstance {
    pub name: String,
    /// Image tag; empty when missing or ambiguous.
    pub version: String,
    /// Deployment group identifier; empty when unlabelled.
    pub label: String,
    pub phase: Phase,
    pub waiting_reason: Option<String>,
}

impl WorkloadInstance {
    pub fn from_snapshot(snapshot: &InstanceSnapshot, label_key: &str) -> Self {
        Self {
            name: snapshot.name.clone(),
            version: snapshot.version().unwrap_or_default().to_string(),
            label: snapshot.label(label_key).to_string(),
            phase: snapshot.phase,
            waiting_reason: snapshot.waiting_reason().map(str::to_string),
        }
    }

    pub fn status(&self) -> InstanceStatus {
        InstanceStatus::resolve(self.phase, self.waiting_reason.as_deref())
    }
}

/// Kind of lifecycle change carried by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Other,
}

/// A single instance lifecycle event from a watch subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceEvent {
    pub kind: EventKind,
    pub instance: InstanceSnapshot,
}

/// Extract the version tag from an image reference.
///
/// The reference is split on `:`. Exactly one separator yields the text
/// after it; zero separators (untagged) or more than one (registry port
/// plus tag, digests) yield `None`.
pub fn extract_version(image: &str) -> Option<&str> {
    let mut parts = image.split(':');
    let _repo = parts.next()?;
    let tag = parts.next()?;
    if parts.next().is_some() || tag.is_empty() {
        return None;
    }
    Some(tag)
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(images: &[&str], phase: Phase, waiting: &[&str]) -> InstanceSnapshot {
        let mut labels = BTreeMap::new();
        labels.insert(DEFAULT_LABEL_KEY.to_string(), "web".to_string());
        InstanceSnapshot {
            name: "web-7d9f".to_string(),
            images: images.iter().map(|s| s.to_string()).collect(),
            labels,
            phase,
            waiting_reasons: waiting.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn version_from_single_separator() {
        assert_eq!(extract_version("grafana/loki:2.6.1"), Some("2.6.1"));
        assert_eq!(extract_version("nginx:latest"), Some("latest"));
    }

    #[test]
    fn version_absent_or_ambiguous() {
        assert_eq!(extract_version("nginx"), None);
        assert_eq!(extract_version("registry.local:5000/app:1.2"), None);
        assert_eq!(extract_version("app:"), None);
    }

    #[test]
    fn snapshot_takes_first_tagged_container() {
        let snap = snapshot(&["sidecar", "org/api:1.4.0", "org/proxy:9.9"], Phase::Running, &[]);
        assert_eq!(snap.version(), Some("1.4.0"));
    }

    #[test]
    fn missing_label_is_empty() {
        let snap = snapshot(&["org/api:1.0"], Phase::Running, &[]);
        assert_eq!(snap.label("team"), "");
        assert_eq!(snap.label(DEFAULT_LABEL_KEY), "web");
    }

    #[test]
    fn waiting_reason_overrides_phase() {
        let snap = snapshot(&["org/api:1.0"], Phase::Pending, &["", "CrashLoopBackOff"]);
        assert_eq!(snap.status(), InstanceStatus::Waiting("CrashLoopBackOff".into()));
        assert_eq!(snap.status().to_string(), "CrashLoopBackOff");

        let inst = WorkloadInstance::from_snapshot(&snap, DEFAULT_LABEL_KEY);
        assert_eq!(inst.waiting_reason.as_deref(), Some("CrashLoopBackOff"));
        assert_eq!(inst.version, "1.0");
        assert_eq!(inst.label, "web");
    }

    #[test]
    fn status_falls_back_to_phase() {
        let snap = snapshot(&["org/api:1.0"], Phase::Running, &[""]);
        assert!(snap.status().is_running());
        assert_eq!(snap.status().to_string(), "Running");
    }

    #[test]
    fn snapshot_and_instance_agree_on_status() {
        for (phase, waiting) in [
            (Phase::Pending, &["", "ImagePullBackOff"][..]),
            (Phase::Running, &[""][..]),
            (Phase::Failed, &[][..]),
        ] {
            let snap = snapshot(&["org/api:1.0"], phase, waiting);
            let inst = WorkloadInstance::from_snapshot(&snap, DEFAULT_LABEL_KEY);
            assert_eq!(inst.status(), snap.status());
        }
    }

    #[test]
    fn phase_parse() {
        assert_eq!(Phase::parse("Running"), Phase::Running);
        assert_eq!(Phase::parse("Failed"), Phase::Failed);
        assert_eq!(Phase::parse("bogus"), Phase::Unknown);
        assert!(Phase::Unknown.is_failure());
        assert!(!Phase::Pending.is_failure());
    }
}
