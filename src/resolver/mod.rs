use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::source::VideoReference;

/// Watch URLs (`youtube.com/watch?v=<id>`, also with leading query parameters) and short
/// URLs (`youtu.be/<id>`). The identifier must not continue past 11 characters.
static VIDEO_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?(?:[^#\s]*&)?v=|youtu\.be/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)")
        .expect("video URL pattern is valid")
});

/// Record fields holding an explicit identifier, in priority order.
const ID_FIELDS: &[&str] = &["id", "videoId"];

/// Record field holding the canonical URL.
const URL_FIELD: &str = "url";

/// Canonical 11-character YouTube video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoIdentifier(String);

impl VideoIdentifier {
    pub const LEN: usize = 11;

    /// Accepts exactly 11 characters of `[A-Za-z0-9_-]`
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = raw.len() == Self::LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        valid.then(|| Self(raw.to_string()))
    }

    /// Extract an identifier embedded in a watch or short URL
    pub fn from_url(url: &str) -> Option<Self> {
        VIDEO_URL_PATTERN
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VideoIdentifier {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not a video identifier: {value:?}"))
    }
}

impl From<VideoIdentifier> for String {
    fn from(id: VideoIdentifier) -> Self {
        id.0
    }
}

/// Resolve a reference to its canonical identifier.
///
/// Resolution order:
/// 1. an explicit `id` / `videoId` field holding a syntactically valid identifier
/// 2. the `url` field, matched against the watch and short URL shapes
/// 3. a bare string reference, matched the same way
/// 4. any other string field of a record that embeds a video URL
///
/// The first match wins. `None` means "unresolvable", which is an expected outcome.
pub fn resolve(reference: &VideoReference) -> Option<VideoIdentifier> {
    match reference {
        VideoReference::Raw(raw) => VideoIdentifier::from_url(raw),
        VideoReference::Record(fields) => {
            let explicit = ID_FIELDS
                .iter()
                .filter_map(|key| fields.get(*key).and_then(|v| v.as_str()))
                .find_map(VideoIdentifier::parse);
            if explicit.is_some() {
                return explicit;
            }

            let from_url_field = fields
                .get(URL_FIELD)
                .and_then(|v| v.as_str())
                .and_then(VideoIdentifier::from_url);
            if from_url_field.is_some() {
                return from_url_field;
            }

            fields
                .values()
                .filter_map(|v| v.as_str())
                .find_map(VideoIdentifier::from_url)
        }
        VideoReference::Other(_) => None,
    }
}
