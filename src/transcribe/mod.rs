use serde::{Deserialize, Serialize};

use crate::resolver::VideoIdentifier;

pub mod groq;
pub mod processor;

pub use groq::GroqTranscriber;

/// Individual transcript segment with timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start offset in seconds
    pub start: f64,

    /// Duration in seconds
    pub duration: f64,

    /// Segment text
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, duration: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            duration: duration.max(0.0),
            text: text.into(),
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Transcript content: timed segments when the upstream provides timing, flat text otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TranscriptBody {
    Segments(Vec<TranscriptSegment>),
    PlainText(String),
}

impl TranscriptBody {
    /// True when there is no non-whitespace text at all
    pub fn is_blank(&self) -> bool {
        match self {
            TranscriptBody::Segments(segments) => segments.iter().all(|s| s.text.trim().is_empty()),
            TranscriptBody::PlainText(text) => text.trim().is_empty(),
        }
    }

    /// All text joined with single spaces
    pub fn plain_text(&self) -> String {
        match self {
            TranscriptBody::Segments(segments) => segments
                .iter()
                .map(|s| s.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            TranscriptBody::PlainText(text) => text.trim().to_string(),
        }
    }
}

/// How a transcript was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Name of the acquisition strategy that produced it
    pub strategy: String,

    /// Strategy-specific detail (caption track, transcript language, model, download variant)
    pub detail: Option<String>,

    /// Set when the transcript was derived from placeholder audio rather than the real video
    pub synthetic: bool,
}

/// What a strategy hands back on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub language: String,
    pub is_auto_generated: bool,
    pub body: TranscriptBody,
    pub provenance: Provenance,
}

/// A complete, immutable transcript ready to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub identifier: VideoIdentifier,
    pub title: String,
    pub language: String,
    pub is_auto_generated: bool,
    pub body: TranscriptBody,
    pub provenance: Provenance,
    pub acquired_at: chrono::DateTime<chrono::Utc>,
}

impl TranscriptDocument {
    pub fn new(identifier: VideoIdentifier, title: impl Into<String>, transcript: Transcript) -> Self {
        Self {
            identifier,
            title: title.into(),
            language: transcript.language,
            is_auto_generated: transcript.is_auto_generated,
            body: transcript.body,
            provenance: transcript.provenance,
            acquired_at: chrono::Utc::now(),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.provenance.synthetic
    }
}
