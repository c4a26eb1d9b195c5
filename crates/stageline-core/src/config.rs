//! stageline.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::Pipeline;
use crate::types::DEFAULT_LABEL_KEY;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagelineConfig {
    pub pipeline: PipelineConfig,
    pub observer: ObserverConfig,
    pub ledger: LedgerConfig,
    pub gitops: GitOpsConfig,
    pub notify: NotifyConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stages: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: Pipeline::default().stages().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub label_key: String,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            label_key: DEFAULT_LABEL_KEY.to_string(),
            max_attempts: 3,
            retry_delay_secs: 30,
        }
    }
}

impl ObserverConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/history.redb"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitOpsConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    /// Path of the version-pin file; `{namespace}` is substituted.
    pub path_template: String,
    pub default_branch: String,
    /// Per-namespace branch overrides.
    pub branches: HashMap<String, String>,
    /// Environment variable holding the API token.
    pub token_env: String,
}

impl Default for GitOpsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            path_template: "clusters/kbot/{namespace}/image-policy.yaml".to_string(),
            default_branch: "main".to_string(),
            branches: HashMap::from([("prod".to_string(), "prod".to_string())]),
            token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

impl GitOpsConfig {
    pub fn pin_path(&self, namespace: &str) -> String {
        self.path_template.replace("{namespace}", namespace)
    }

    pub fn branch_for(&self, namespace: &str) -> &str {
        self.branches
            .get(namespace)
            .map(String::as_str)
            .unwrap_or(&self.default_branch)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Environment variable holding an incoming-webhook URL. Unset means
    /// notifications only go to the log.
    pub webhook_url_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8088 }
    }
}

impl StagelineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: StagelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let stages = &self.pipeline.stages;
        if stages.len() < 2 {
            anyhow::bail!("pipeline needs at least two stages, got {}", stages.len());
        }
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].contains(stage) {
                anyhow::bail!("pipeline stage `{stage}` listed twice");
            }
        }
        if self.observer.max_attempts == 0 {
            anyhow::bail!("observer.max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.pipeline.stages.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = StagelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.pipeline().stages(), Pipeline::default().stages());
        assert_eq!(config.observer.max_attempts, 3);
        assert_eq!(config.observer.retry_delay(), Duration::from_secs(30));
        assert_eq!(config.observer.label_key, DEFAULT_LABEL_KEY);
        assert_eq!(config.gitops.branch_for("prod"), "prod");
        assert_eq!(config.gitops.branch_for("qa"), "main");
    }

    #[test]
    fn parse_partial() {
        let toml_str = r#"
[pipeline]
stages = ["build", "canary", "live"]

[observer]
max_attempts = 5

[gitops]
owner = "acme"
repo = "fleet"
path_template = "envs/{namespace}/pin.yaml"
"#;
        let config = StagelineConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.pipeline().source_of("live").unwrap(), "canary");
        assert_eq!(config.observer.max_attempts, 5);
        assert_eq!(config.observer.retry_delay_secs, 30);
        assert_eq!(config.gitops.pin_path("canary"), "envs/canary/pin.yaml");
        assert_eq!(config.gitops.default_branch, "main");
    }

    #[test]
    fn rejects_short_or_duplicate_pipeline() {
        assert!(StagelineConfig::from_toml_str("[pipeline]\nstages = [\"dev\"]").is_err());
        assert!(
            StagelineConfig::from_toml_str("[pipeline]\nstages = [\"dev\", \"qa\", \"dev\"]")
                .is_err()
        );
    }

    #[test]
    fn rejects_zero_attempts() {
        assert!(StagelineConfig::from_toml_str("[observer]\nmax_attempts = 0").is_err());
    }

    #[test]
    fn serializes_back_to_toml() {
        let toml_str = StagelineConfig::default().to_toml_string().unwrap();
        assert!(toml_str.contains("app.kubernetes.io/name"));
        assert!(toml_str.contains("image-policy.yaml"));
    }
}
