use anyhow::Context;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// A file inside a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubLocation {
    pub owner: String,
    pub repo: String,
    pub path: String,
}

impl GitHubLocation {
    /// Parse `owner/repo` plus a file path
    pub fn parse(repository: &str, path: &str) -> Option<Self> {
        let (owner, repo) = repository.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') || path.trim().is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.trim_start_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// Client for the repository contents API
pub struct GitHubContentClient {
    client: Client,
    token: String,
    api_base: String,
}

impl GitHubContentClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Fetch a JSON file and decode it
    #[tracing::instrument(skip(self))]
    pub async fn fetch_json(&self, location: &GitHubLocation) -> Result<Value> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base.trim_end_matches('/'),
            location.owner,
            location.repo,
            location.path
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", concat!("transcript-harvester/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .context("Failed to reach the contents API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Contents API returned HTTP {}: {}", status, body);
        }

        let contents: ContentsResponse = response
            .json()
            .await
            .context("Failed to parse contents API response")?;

        if let Some(encoding) = contents.encoding.as_deref() {
            if encoding != "base64" {
                anyhow::bail!("Unsupported content encoding: {}", encoding);
            }
        }

        decode_content(&contents.content)
    }
}

/// Decode the newline-wrapped base64 `content` field into JSON
pub fn decode_content(encoded: &str) -> Result<Value> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .context("Invalid base64 content")?;
    let text = String::from_utf8(bytes).context("Content is not UTF-8")?;
    let value = serde_json::from_str(&text).context("Content is not valid JSON")?;
    Ok(value)
}
