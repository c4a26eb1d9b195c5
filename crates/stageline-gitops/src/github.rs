//! GitHub contents API version setter.
//!
//! Reads the pin file for a namespace from the branch that namespace
//! deploys from, rewrites its `range:` field, and commits the result
//! with the file's current blob SHA so concurrent edits are rejected
//! by GitHub rather than overwritten.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stageline_core::config::GitOpsConfig;

use crate::error::{GitOpsError, GitOpsResult};
use crate::pin::patch_pin;
use crate::setter::{SetOutcome, VersionSetter};

const USER_AGENT: &str = concat!("stageline/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    branch: &'a str,
}

/// Version setter writing to a pin file in a GitHub repository.
pub struct GitHubPinFile {
    client: reqwest::Client,
    config: GitOpsConfig,
    token: String,
}

impl GitHubPinFile {
    pub fn new(config: GitOpsConfig, token: impl Into<String>) -> GitOpsResult<Self> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(GitOpsError::Config(
                "gitops.owner and gitops.repo must be set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GitOpsError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            token: token.into(),
        })
    }

    /// Build from configuration, reading the token from `config.token_env`.
    pub fn from_config(config: GitOpsConfig) -> GitOpsResult<Self> {
        let token = std::env::var(&config.token_env).map_err(|_| {
            GitOpsError::Config(format!("{} environment variable must be set", config.token_env))
        })?;
        Self::new(config, token)
    }

    fn contents_url(&self, namespace: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.config.pin_path(namespace)
        )
    }

    async fn check(
        method: &'static str,
        url: &str,
        response: reqwest::Response,
    ) -> GitOpsResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GitOpsError::Status {
            method,
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl VersionSetter for GitHubPinFile {
    async fn set_version(
        &self,
        namespace: &str,
        version: &str,
        change_description: &str,
    ) -> GitOpsResult<SetOutcome> {
        let url = self.contents_url(namespace);
        let branch = self.config.branch_for(namespace);

        let response = self
            .client
            .get(&url)
            .query(&[("ref", branch)])
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| GitOpsError::Http(format!("GET {url}: {e}")))?;
        let file: ContentsResponse = Self::check("GET", &url, response)
            .await?
            .json()
            .await
            .map_err(|e| GitOpsError::Decode(e.to_string()))?;

        let current = decode_content(&file.content, &file.encoding)?;
        let Some(patched) = patch_pin(&current, version)? else {
            info!(%namespace, %version, %branch, "pin already at requested version, skipping commit");
            return Ok(SetOutcome::Unchanged);
        };

        let body = UpdateRequest {
            message: change_description,
            content: general_purpose::STANDARD.encode(patched.as_bytes()),
            sha: &file.sha,
            branch,
        };
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GitOpsError::Http(format!("PUT {url}: {e}")))?;
        Self::check("PUT", &url, response).await?;

        debug!(%namespace, %version, %branch, message = %change_description, "pin file committed");
        Ok(SetOutcome::Committed)
    }
}

/// Decode a contents-API payload. GitHub wraps base64 at 60 columns.
fn decode_content(content: &str, encoding: &str) -> GitOpsResult<String> {
    if !encoding.is_empty() && encoding != "base64" {
        return Err(GitOpsError::Decode(format!("unsupported encoding `{encoding}`")));
    }
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| GitOpsError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GitOpsError::Decode(e.to_string()))
}
