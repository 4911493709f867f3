use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub mod github;

pub use github::{GitHubContentClient, GitHubLocation};

/// Container keys searched in a keyed input document, in priority order.
pub const CONTAINER_KEYS: &[&str] = &["livestreams", "episodes", "videos"];

/// Fields that mark a nested record as describing a video.
const VIDEO_FIELDS: &[&str] = &["url", "videoId", "id"];

/// One candidate video as it appeared in the input document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VideoReference {
    /// A URL or bare string
    Raw(String),
    /// A record with one of `id` / `videoId` / `url` and optionally `title`
    Record(Map<String, Value>),
    /// Anything else the input happened to contain
    Other(Value),
}

impl VideoReference {
    /// Display title carried by the reference itself, if any
    pub fn title(&self) -> Option<&str> {
        match self {
            VideoReference::Record(fields) => fields
                .get("title")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty()),
            _ => None,
        }
    }

    /// Short human-readable form for log lines
    pub fn describe(&self) -> String {
        match self {
            VideoReference::Raw(raw) => raw.clone(),
            VideoReference::Record(fields) => self
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(fields.clone()).to_string()),
            VideoReference::Other(value) => value.to_string(),
        }
    }
}

impl From<Value> for VideoReference {
    fn from(value: Value) -> Self {
        match value {
            Value::String(raw) => VideoReference::Raw(raw),
            Value::Object(fields) => VideoReference::Record(fields),
            other => VideoReference::Other(other),
        }
    }
}

/// Turn an arbitrary decoded JSON document into an ordered list of references.
///
/// Never fails: unexpected shapes degrade to a partial or empty list.
pub fn normalize(input: Value) -> Vec<VideoReference> {
    match input {
        Value::Array(items) => items.into_iter().map(VideoReference::from).collect(),
        Value::Object(mut map) => {
            tracing::debug!(keys = ?map.keys().collect::<Vec<_>>(), "Input is a keyed document");

            for key in CONTAINER_KEYS {
                match map.get(*key) {
                    Some(Value::Array(_)) => {
                        tracing::debug!(key = *key, "Using container key");
                        if let Some(Value::Array(items)) = map.remove(*key) {
                            return items.into_iter().map(VideoReference::from).collect();
                        }
                    }
                    Some(other) => {
                        tracing::debug!(key = *key, kind = json_kind(other), "Container key is not a list");
                    }
                    None => {}
                }
            }

            let embedded: Vec<VideoReference> = map
                .values()
                .filter(|value| looks_like_video(value))
                .cloned()
                .map(VideoReference::from)
                .collect();
            if !embedded.is_empty() {
                tracing::debug!(count = embedded.len(), "Collected embedded video entries");
                return embedded;
            }

            tracing::debug!("No video entries recognized, using all document values");
            map.into_iter().map(|(_, v)| VideoReference::from(v)).collect()
        }
        Value::String(raw) => vec![VideoReference::Raw(raw)],
        Value::Null | Value::Bool(_) | Value::Number(_) => Vec::new(),
    }
}

fn looks_like_video(value: &Value) -> bool {
    match value {
        Value::Object(fields) => VIDEO_FIELDS.iter().any(|f| fields.contains_key(*f)),
        Value::String(s) => s.contains("youtube.com") || s.contains("youtu.be"),
        _ => false,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Where the candidate list is read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// A JSON document on local disk
    File(PathBuf),
    /// A JSON document in a remote repository, fetched through the contents API
    GitHub(GitHubLocation),
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::File(path) => write!(f, "{}", path.display()),
            InputSource::GitHub(loc) => write!(f, "github:{}/{}/{}", loc.owner, loc.repo, loc.path),
        }
    }
}

/// Read the input document.
pub async fn load_input(source: &InputSource, github: Option<&GitHubContentClient>) -> crate::Result<Value> {
    match source {
        InputSource::File(path) => {
            let content = fs_err::read_to_string(path)?;
            let value = serde_json::from_str(&content)?;
            Ok(value)
        }
        InputSource::GitHub(location) => {
            let client = github.ok_or_else(|| {
                crate::HarvestError::Input("no GitHub client configured for remote input".to_string())
            })?;
            client.fetch_json(location).await
        }
    }
}

/// Read and normalize the input. Load failures are logged and yield an empty list.
pub async fn load_references(source: &InputSource, github: Option<&GitHubContentClient>) -> Vec<VideoReference> {
    match load_input(source, github).await {
        Ok(value) => {
            let references = normalize(value);
            tracing::info!(count = references.len(), source = %source, "Loaded video references");
            references
        }
        Err(e) => {
            tracing::error!(error = %e, source = %source, "Failed to load input, treating it as empty");
            Vec::new()
        }
    }
}
