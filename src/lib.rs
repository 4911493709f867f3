//! Transcript Harvester - a best-effort batch pipeline for YouTube transcripts
//!
//! This library turns a loosely shaped list of video references into one Markdown transcript
//! per video. Transcripts are obtained through an ordered chain of strategies (caption tracks,
//! a transcript service, audio download plus speech-to-text), each attempt guarded by retries
//! and paced by a rate limiter. A progress record makes re-runs idempotent.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod livestreams;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod rate_limit;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod transcribe;
pub mod utils;

pub use acquire::{AcquisitionStrategy, AttemptOutcome, StrategyChain};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::CapabilityError;
pub use output::DocumentWriter;
pub use pipeline::{HarvestPipeline, RunStatus, RunSummary};
pub use progress::ProgressStore;
pub use rate_limit::RateLimiter;
pub use resolver::{resolve, VideoIdentifier};
pub use retry::RetryPolicy;
pub use source::{normalize, VideoReference};
pub use transcribe::{Transcript, TranscriptBody, TranscriptDocument, TranscriptSegment};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the harvester
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input could not be loaded: {0}")]
    Input(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}
