//! Promotion pipeline - the ordered chain of stages.
//!
//! Each stage's source is the stage immediately before it. The first
//! stage has no source and can't be promoted into.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("namespace `{namespace}` is not a pipeline stage; choose from: {allowed}")]
    UnknownStage { namespace: String, allowed: String },

    #[error("namespace `{0}` is the first stage and has no upstream source")]
    NoUpstream(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    stages: Vec<String>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(["dev", "qa", "stage", "prod"])
    }
}

impl Pipeline {
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }

    /// All stages, upstream first.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Stages that have an upstream source (everything but the first).
    pub fn promotable(&self) -> &[String] {
        self.stages.get(1..).unwrap_or(&[])
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.stages.iter().any(|s| s == namespace)
    }

    /// Resolve the source stage for `namespace`.
    pub fn source_of(&self, namespace: &str) -> Result<&str, PipelineError> {
        match self.stages.iter().position(|s| s == namespace) {
            Some(0) => Err(PipelineError::NoUpstream(namespace.to_string())),
            Some(i) => Ok(&self.stages[i - 1]),
            None => Err(PipelineError::UnknownStage {
                namespace: namespace.to_string(),
                allowed: self.promotable().join(", "),
            }),
        }
    }

    /// Reject namespaces that can't be promoted into or rolled back.
    pub fn ensure_promotable(&self, namespace: &str) -> Result<(), PipelineError> {
        self.source_of(namespace).map(|_| ())
    }

    /// Reject namespaces outside the pipeline. The first stage is allowed.
    pub fn ensure_known(&self, namespace: &str) -> Result<(), PipelineError> {
        if self.contains(namespace) {
            Ok(())
        } else {
            Err(PipelineError::UnknownStage {
                namespace: namespace.to_string(),
                allowed: self.stages.join(", "),
            })
        }
    }
}
