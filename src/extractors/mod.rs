use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod data_api;
pub mod oembed;
pub mod player;
pub mod youtube;

pub use data_api::YouTubeDataApi;
pub use oembed::OEmbedLookup;
pub use player::PlayerCaptions;
pub use youtube::{DownloadVariant, YtDlp};

use crate::resolver::VideoIdentifier;
use crate::transcribe::TranscriptSegment;

/// Failure reported by an upstream capability
#[derive(thiserror::Error, Debug)]
pub enum CapabilityError {
    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Transcripts are disabled: {0}")]
    TranscriptsDisabled(String),

    #[error("No transcript in the requested languages: {0}")]
    NoTranscript(String),

    #[error("No caption tracks available: {0}")]
    NoCaptions(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service error (HTTP {status}): {message}")]
    Service { status: u16, message: String },

    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected response: {0}")]
    Parse(String),
}

impl CapabilityError {
    /// The content itself has nothing to offer; retrying cannot help
    pub fn is_content_absence(&self) -> bool {
        matches!(
            self,
            CapabilityError::NotFound(_)
                | CapabilityError::TranscriptsDisabled(_)
                | CapabilityError::NoTranscript(_)
                | CapabilityError::NoCaptions(_)
        )
    }

    /// Default retry classification: everything except content absence and client errors
    pub fn is_retryable(&self) -> bool {
        match self {
            _ if self.is_content_absence() => false,
            CapabilityError::Service { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => true,
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = body.chars().take(300).collect::<String>();
        match status.as_u16() {
            404 => CapabilityError::NotFound(message),
            429 => CapabilityError::RateLimited(message),
            code => CapabilityError::Service { status: code, message },
        }
    }
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CapabilityError::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            CapabilityError::from_status(status, &e.to_string())
        } else {
            CapabilityError::Network(e.to_string())
        }
    }
}

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
    Ogg,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" | "mp4" => Some(AudioFormat::M4a),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" | "opus" => Some(AudioFormat::Ogg),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }
}

/// A caption track as listed by the captions API
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub id: String,
    pub language: String,
    pub name: Option<String>,
    pub is_auto_generated: bool,
    /// Opaque handle used to download the track
    pub locator: String,
}

/// Direct caption listing and download, keyed by identifier and language
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionsApi: Send + Sync {
    async fn list_tracks(&self, id: &VideoIdentifier) -> Result<Vec<CaptionTrack>, CapabilityError>;

    /// Download a track and parse its cues
    async fn download_track(&self, track: &CaptionTrack) -> Result<Vec<TranscriptSegment>, CapabilityError>;
}

/// A transcript offered by the transcript service
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptListing {
    pub language_code: String,
    pub language: String,
    pub is_generated: bool,
    /// Opaque handle the service uses to fetch this transcript
    pub locator: String,
}

/// Transcript listing and fetch, keyed by identifier and a language preference list
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptService: Send + Sync {
    async fn list(&self, id: &VideoIdentifier) -> Result<Vec<TranscriptListing>, CapabilityError>;

    async fn fetch(
        &self,
        id: &VideoIdentifier,
        listing: &TranscriptListing,
    ) -> Result<Vec<TranscriptSegment>, CapabilityError>;
}

/// Audio acquisition: a remote stream URL, or a download into `dest_dir` using one variant
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Direct URL of the best audio stream, for services that fetch audio themselves
    async fn stream_url(&self, id: &VideoIdentifier) -> Result<String, CapabilityError>;

    async fn download(
        &self,
        id: &VideoIdentifier,
        variant: DownloadVariant,
        dest_dir: &Path,
    ) -> Result<PathBuf, CapabilityError>;
}

/// Audio handed to speech-to-text
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    File(PathBuf),
    RemoteUrl(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// `verbose_json` transcription response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechToTextResponse {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Option<Vec<SpeechSegment>>,
}

/// Speech-to-text over a local audio file or remote audio URL
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Model name recorded in document metadata
    fn model(&self) -> String;

    async fn transcribe(
        &self,
        input: &AudioInput,
        language: Option<&str>,
    ) -> Result<SpeechToTextResponse, CapabilityError>;
}

/// Display-title lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn title(&self, id: &VideoIdentifier) -> Result<Option<String>, CapabilityError>;
}

/// How a channel URL names its channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLocator {
    /// `/channel/UC...`
    Id(String),
    /// `/@handle`
    Handle(String),
    /// `/user/name`
    Username(String),
    /// `/c/name`
    Custom(String),
}

impl ChannelLocator {
    pub fn from_url(input: &str) -> Option<Self> {
        let input = input.trim();
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };
        let url = url::Url::parse(&with_scheme).ok()?;
        let host = url.host_str()?;
        if host.trim_start_matches("www.").trim_start_matches("m.") != "youtube.com" {
            return None;
        }

        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let first = segments.next()?;
        if let Some(handle) = first.strip_prefix('@') {
            return (!handle.is_empty()).then(|| ChannelLocator::Handle(handle.to_string()));
        }
        let name = segments.next()?.to_string();
        match first {
            "channel" => Some(ChannelLocator::Id(name)),
            "user" => Some(ChannelLocator::Username(name)),
            "c" => Some(ChannelLocator::Custom(name)),
            _ => None,
        }
    }
}

/// Channel details recorded alongside a livestream listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: Option<String>,
    pub view_count: Option<String>,
    pub subscriber_count: String,
    pub video_count: Option<String>,
    /// Playlist holding every upload of the channel
    #[serde(skip)]
    pub uploads_playlist: Option<String>,
}

/// One page of a playlist listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistPage {
    pub video_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// A video that was broadcast live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivestreamEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: Option<String>,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    pub thumbnails: serde_json::Value,
    pub duration: Option<String>,
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    pub comment_count: Option<String>,
    pub actual_start_time: Option<String>,
    pub actual_end_time: Option<String>,
    pub scheduled_start_time: Option<String>,
    pub concurrent_viewers: Option<String>,
    pub url: String,
}

/// Channel lookup and upload listing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelCatalog: Send + Sync {
    /// Channel id for a locator that does not carry one, `None` when nothing matches
    async fn find_channel_id(&self, locator: &ChannelLocator) -> Result<Option<String>, CapabilityError>;

    async fn channel(&self, channel_id: &str) -> Result<ChannelInfo, CapabilityError>;

    async fn playlist_page(
        &self,
        playlist_id: &str,
        page_token: Option<String>,
    ) -> Result<PlaylistPage, CapabilityError>;

    /// Details of up to 50 videos, keeping only those with live streaming details
    async fn livestreams(&self, video_ids: &[String]) -> Result<Vec<LivestreamEntry>, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_locator_from_url() {
        assert_eq!(
            ChannelLocator::from_url("https://www.youtube.com/channel/UCabcdefghijklmnopqrstuv"),
            Some(ChannelLocator::Id("UCabcdefghijklmnopqrstuv".into()))
        );
        assert_eq!(
            ChannelLocator::from_url("youtube.com/@somecreator/streams"),
            Some(ChannelLocator::Handle("somecreator".into()))
        );
        assert_eq!(
            ChannelLocator::from_url("https://m.youtube.com/user/oldname"),
            Some(ChannelLocator::Username("oldname".into()))
        );
        assert_eq!(
            ChannelLocator::from_url("https://www.youtube.com/c/Custom"),
            Some(ChannelLocator::Custom("Custom".into()))
        );
        assert_eq!(ChannelLocator::from_url("https://www.youtube.com/watch?v=abc12345678"), None);
        assert_eq!(ChannelLocator::from_url("https://example.com/@someone"), None);
        assert_eq!(ChannelLocator::from_url("https://www.youtube.com/channel/"), None);
    }

    #[test]
    fn test_content_absence_is_never_retryable() {
        for e in [
            CapabilityError::NotFound("x".into()),
            CapabilityError::TranscriptsDisabled("x".into()),
            CapabilityError::NoTranscript("x".into()),
            CapabilityError::NoCaptions("x".into()),
        ] {
            assert!(e.is_content_absence());
            assert!(!e.is_retryable());
        }
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(CapabilityError::Network("reset".into()).is_retryable());
        assert!(CapabilityError::RateLimited("slow down".into()).is_retryable());
        assert!(CapabilityError::Service { status: 503, message: String::new() }.is_retryable());
        assert!(!CapabilityError::Service { status: 400, message: String::new() }.is_retryable());
        assert!(!CapabilityError::Service { status: 401, message: String::new() }.is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            CapabilityError::from_status(reqwest::StatusCode::NOT_FOUND, "gone"),
            CapabilityError::NotFound(_)
        ));
        assert!(matches!(
            CapabilityError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            CapabilityError::RateLimited(_)
        ));
        assert!(matches!(
            CapabilityError::from_status(reqwest::StatusCode::BAD_GATEWAY, ""),
            CapabilityError::Service { status: 502, .. }
        ));
    }

    #[test]
    fn test_audio_format_from_path() {
        assert_eq!(AudioFormat::from_path(Path::new("/tmp/a.MP3")), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_path(Path::new("a.m4a")), Some(AudioFormat::M4a));
        assert_eq!(AudioFormat::from_path(Path::new("a.part")), None);
        assert_eq!(AudioFormat::Wav.mime_type(), "audio/wav");
    }
}
