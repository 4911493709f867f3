use async_trait::async_trait;
use std::sync::Arc;

use super::{AcquisitionStrategy, AttemptOutcome, FailedAttempt};
use crate::extractors::{CapabilityError, CaptionTrack, CaptionsApi};
use crate::rate_limit::ServiceClass;
use crate::resolver::VideoIdentifier;
use crate::retry::RetryPolicy;
use crate::transcribe::{Provenance, Transcript, TranscriptBody};

pub const NAME: &str = "captions";

/// Pick the first track in preferred-language order, falling back to the first listed track
pub fn select_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    languages
        .iter()
        .find_map(|lang| tracks.iter().find(|t| language_matches(&t.language, lang)))
        .or_else(|| tracks.first())
}

/// `ja` matches `ja` and `ja-JP`, case-insensitively
pub(crate) fn language_matches(code: &str, preferred: &str) -> bool {
    let code = code.to_ascii_lowercase();
    let preferred = preferred.to_ascii_lowercase();
    code == preferred || code.strip_prefix(&preferred).is_some_and(|rest| rest.starts_with('-'))
}

/// Direct caption track download through the player's public caption tracks
pub struct CaptionsStrategy {
    api: Arc<dyn CaptionsApi>,
    languages: Vec<String>,
    retry: RetryPolicy,
}

impl CaptionsStrategy {
    pub fn new(api: Arc<dyn CaptionsApi>, languages: Vec<String>, retry: RetryPolicy) -> Self {
        Self { api, languages, retry }
    }

    async fn try_acquire(&self, id: &VideoIdentifier) -> Result<Transcript, FailedAttempt> {
        let tracks = self
            .retry
            .run("list caption tracks", || self.api.list_tracks(id), CapabilityError::is_retryable)
            .await
            .into_result()?;

        let track = select_track(&tracks, &self.languages)
            .ok_or_else(|| FailedAttempt::terminal(CapabilityError::NoCaptions(id.to_string()).to_string()))?;

        tracing::debug!(
            video_id = %id,
            track = %track.id,
            language = %track.language,
            auto = track.is_auto_generated,
            "Selected caption track"
        );

        let segments = self
            .retry
            .run("download caption track", || self.api.download_track(track), CapabilityError::is_retryable)
            .await
            .into_result()?;

        if segments.is_empty() {
            return Err(FailedAttempt::terminal(format!("caption track {} has no cues", track.id)));
        }

        Ok(Transcript {
            language: track.language.clone(),
            is_auto_generated: track.is_auto_generated,
            body: TranscriptBody::Segments(segments),
            provenance: Provenance {
                strategy: NAME.to_string(),
                detail: Some(track.name.clone().unwrap_or_else(|| format!("track {}", track.id))),
                synthetic: false,
            },
        })
    }
}

#[async_trait]
impl AcquisitionStrategy for CaptionsStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn cost_rank(&self) -> u32 {
        10
    }

    fn service_class(&self) -> ServiceClass {
        ServiceClass::YouTubeWeb
    }

    async fn attempt(&self, id: &VideoIdentifier) -> AttemptOutcome<Transcript> {
        self.try_acquire(id).await.into()
    }
}
