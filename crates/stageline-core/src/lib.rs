//! stageline-core - shared types for the Stageline promotion controller.
//!
//! - **`types`** - workload instances as observed in the cluster, image
//!   version and label extraction
//! - **`pipeline`** - the ordered stage chain (dev → qa → stage → prod)
//! - **`config`** - `stageline.toml` parsing

pub mod config;
pub mod pipeline;
pub mod types;

pub use config::StagelineConfig;
pub use pipeline::{Pipeline, PipelineError};
pub use types::*;
