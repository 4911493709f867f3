//! Sequential harvesting run.
//!
//! Each reference is processed to completion (resolve, skip check, acquire, write, mark done)
//! before the next one starts. The stop flag is only consulted between references.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::acquire::{
    AcquisitionStrategy, AudioTranscriptionStrategy, CaptionsStrategy, ChainOutcome, StrategyChain,
    TranscriptServiceStrategy,
};
use crate::config::{Config, StrategyKind};
use crate::extractors::{MetadataLookup, OEmbedLookup, PlayerCaptions, YouTubeDataApi, YtDlp};
use crate::output::DocumentWriter;
use crate::progress::ProgressStore;
use crate::rate_limit::RateLimiter;
use crate::resolver::{resolve, VideoIdentifier};
use crate::source::VideoReference;
use crate::transcribe::{GroqTranscriber, TranscriptDocument};
use crate::utils::format_duration;
use crate::HarvestError;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Processed { count: usize },
    NoEligibleItems,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Processed { count: 1 } => write!(f, "Processed 1 new video"),
            RunStatus::Processed { count } => write!(f, "Processed {} new videos", count),
            RunStatus::NoEligibleItems => write!(f, "No eligible videos found"),
        }
    }
}

/// Counters collected over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// References looked at before the run stopped
    pub candidates: usize,
    pub unresolvable: usize,
    /// Same identifier seen earlier in this run
    pub duplicates: usize,
    pub already_done: usize,
    /// Every strategy failed, or the document could not be written
    pub failed: usize,
    pub processed: usize,
    pub stopped_early: bool,
}

impl RunSummary {
    pub fn status(&self) -> RunStatus {
        if self.processed > 0 {
            RunStatus::Processed { count: self.processed }
        } else {
            RunStatus::NoEligibleItems
        }
    }
}

/// Drives references through the strategy chain into written documents
pub struct HarvestPipeline {
    chain: StrategyChain,
    metadata: Option<Arc<dyn MetadataLookup>>,
    progress: ProgressStore,
    writer: DocumentWriter,
    limit: usize,
    stop: Arc<AtomicBool>,
}

impl HarvestPipeline {
    pub fn new(chain: StrategyChain, progress: ProgressStore, writer: DocumentWriter) -> Self {
        Self {
            chain,
            metadata: None,
            progress,
            writer,
            limit: 1,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataLookup>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Maximum number of new documents per run
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Wire the production capabilities described by `config`
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        config.validate()?;

        let limiter = Arc::new(RateLimiter::new(config.rate_limit_delay()));
        let retry = config.retry_policy();
        let languages = config.run.languages.clone();
        let yt_dlp = Arc::new(YtDlp::new(&config.tools.yt_dlp_path).with_progress(config.run.show_progress));

        let mut strategies: Vec<Box<dyn AcquisitionStrategy>> = Vec::new();
        for kind in &config.run.strategies {
            let strategy: Box<dyn AcquisitionStrategy> = match kind {
                StrategyKind::Captions => Box::new(CaptionsStrategy::new(
                    Arc::new(PlayerCaptions::new()),
                    languages.clone(),
                    retry,
                )),
                StrategyKind::TranscriptService => Box::new(TranscriptServiceStrategy::new(
                    yt_dlp.clone(),
                    languages.clone(),
                    retry,
                )),
                StrategyKind::Audio => {
                    let key = credential(&config.credentials.stt_api_key, "GROQ_API_KEY")?;
                    let stt = GroqTranscriber::new(key)
                        .with_base_url(&config.speech_to_text.base_url)
                        .with_model(&config.speech_to_text.model);
                    Box::new(
                        AudioTranscriptionStrategy::new(yt_dlp.clone(), Arc::new(stt), &languages, retry)
                            .with_variants(config.tools.download_variants.clone())
                            .with_remote_audio(config.speech_to_text.remote_audio)
                            .with_rate_limiter(limiter.clone()),
                    )
                }
            };
            strategies.push(strategy);
        }

        let writer = DocumentWriter::new(&config.output.dir)
            .with_raw_json(config.output.raw_json)
            .with_paragraph_minutes(config.output.paragraph_minutes)
            .with_timestamps(config.output.timestamps);
        let progress = ProgressStore::open(config.progress_path(), &config.output.dir);

        // the Data API knows titles oEmbed cannot see, such as unlisted videos
        let metadata: Arc<dyn MetadataLookup> =
            match credential(&config.credentials.youtube_api_key, "YOUTUBE_API_KEY") {
                Ok(key) => Arc::new(YouTubeDataApi::new(key)),
                Err(_) => Arc::new(OEmbedLookup::new()),
            };

        Ok(Self::new(StrategyChain::new(strategies, limiter), progress, writer)
            .with_metadata(metadata)
            .with_limit(config.run.limit))
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn writer(&self) -> &DocumentWriter {
        &self.writer
    }

    /// Process `references` in order until the limit is reached or the input runs out
    pub async fn run(&mut self, references: &[VideoReference]) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut seen: HashSet<VideoIdentifier> = HashSet::new();

        tracing::info!(
            references = references.len(),
            limit = self.limit,
            strategies = ?self.chain.names(),
            "Starting run"
        );

        for reference in references {
            if summary.processed >= self.limit {
                tracing::info!(limit = self.limit, "Processing limit reached");
                break;
            }
            if self.stop.load(Ordering::SeqCst) {
                tracing::warn!("Stop requested, ending run");
                summary.stopped_early = true;
                break;
            }
            summary.candidates += 1;

            let Some(id) = resolve(reference) else {
                tracing::info!(reference = %reference.describe(), "Could not resolve a video id, skipping");
                summary.unresolvable += 1;
                continue;
            };
            if !seen.insert(id.clone()) {
                summary.duplicates += 1;
                continue;
            }
            if self.progress.is_done(&id) || self.writer.exists(&id) {
                tracing::debug!(video_id = %id, "Already processed");
                summary.already_done += 1;
                continue;
            }

            if self.process(reference, &id).await {
                summary.processed += 1;
            } else {
                summary.failed += 1;
            }
        }

        if let Err(e) = self.progress.flush() {
            tracing::error!(error = %format!("{e:#}"), "Failed to save progress at end of run");
        }

        tracing::info!(
            processed = summary.processed,
            failed = summary.failed,
            already_done = summary.already_done,
            unresolvable = summary.unresolvable,
            elapsed = %format_duration(started.elapsed().as_secs_f64()),
            "Run finished"
        );
        summary
    }

    /// Acquire, write and record one identifier. Returns whether a document was written.
    async fn process(&mut self, reference: &VideoReference, id: &VideoIdentifier) -> bool {
        tracing::info!(video_id = %id, "Processing video");

        let (transcript, strategy) = match self.chain.acquire(id).await {
            ChainOutcome::Succeeded { value, label, .. } => (value, label),
            ChainOutcome::Exhausted { failures } => {
                let reasons: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
                tracing::warn!(video_id = %id, failures = ?reasons, "Every strategy failed");
                return false;
            }
        };

        let title = self.title_for(reference, id).await;
        let document = TranscriptDocument::new(id.clone(), title, transcript);

        if let Err(e) = self.writer.write(&document) {
            tracing::error!(video_id = %id, error = %format!("{e:#}"), "Failed to write transcript");
            return false;
        }

        // the written artifact already marks the id as done for the next run's directory scan
        if let Err(e) = self.progress.mark_done(id) {
            tracing::error!(video_id = %id, error = %format!("{e:#}"), "Failed to save progress");
        }

        tracing::info!(
            video_id = %id,
            strategy = %strategy,
            synthetic = document.is_synthetic(),
            "Transcript saved"
        );
        true
    }

    /// The reference's own title, then the metadata lookup, then a generic one
    async fn title_for(&self, reference: &VideoReference, id: &VideoIdentifier) -> String {
        if let Some(title) = reference.title() {
            return title.to_string();
        }
        if let Some(metadata) = &self.metadata {
            match metadata.title(id).await {
                Ok(Some(title)) => return title,
                Ok(None) => {}
                Err(e) => tracing::debug!(video_id = %id, error = %e, "Title lookup failed"),
            }
        }
        format!("Video {}", id)
    }
}

fn credential(value: &Option<String>, name: &str) -> Result<String, HarvestError> {
    value
        .clone()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| HarvestError::MissingCredential(name.to_string()))
}
