//! Recording version setter for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{GitOpsError, GitOpsResult};
use crate::setter::{SetOutcome, VersionSetter};

/// One `set_version` invocation, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCall {
    pub namespace: String,
    pub version: String,
    pub change_description: String,
}

#[derive(Default)]
struct Inner {
    pins: HashMap<String, String>,
    calls: Vec<SetCall>,
    failure: Option<GitOpsError>,
}

#[derive(Clone, Default)]
pub struct InMemoryVersionSetter {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryVersionSetter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail every subsequent call with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<GitOpsError>) {
        self.lock().failure = error;
    }

    pub fn calls(&self) -> Vec<SetCall> {
        self.lock().calls.clone()
    }

    pub fn pinned(&self, namespace: &str) -> Option<String> {
        self.lock().pins.get(namespace).cloned()
    }
}

#[async_trait]
impl VersionSetter for InMemoryVersionSetter {
    async fn set_version(
        &self,
        namespace: &str,
        version: &str,
        change_description: &str,
    ) -> GitOpsResult<SetOutcome> {
        let mut inner = self.lock();
        inner.calls.push(SetCall {
            namespace: namespace.to_string(),
            version: version.to_string(),
            change_description: change_description.to_string(),
        });
        if let Some(err) = &inner.failure {
            return Err(err.clone());
        }
        let previous = inner.pins.insert(namespace.to_string(), version.to_string());
        if previous.as_deref() == Some(version) {
            Ok(SetOutcome::Unchanged)
        } else {
            Ok(SetOutcome::Committed)
        }
    }
}
