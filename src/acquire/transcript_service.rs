use async_trait::async_trait;
use std::sync::Arc;

use super::captions::language_matches;
use super::{AcquisitionStrategy, AttemptOutcome, FailedAttempt};
use crate::extractors::{CapabilityError, TranscriptListing, TranscriptService};
use crate::rate_limit::ServiceClass;
use crate::resolver::VideoIdentifier;
use crate::retry::RetryPolicy;
use crate::transcribe::{Provenance, Transcript, TranscriptBody};

pub const NAME: &str = "transcript-service";

/// Walk the preferred languages in order; within a language a manual transcript beats a generated one
pub fn select_listing<'a>(listings: &'a [TranscriptListing], languages: &[String]) -> Option<&'a TranscriptListing> {
    languages.iter().find_map(|lang| {
        let mut matching = listings.iter().filter(|l| language_matches(&l.language_code, lang));
        let first = matching.next()?;
        if !first.is_generated {
            return Some(first);
        }
        Some(matching.find(|l| !l.is_generated).unwrap_or(first))
    })
}

/// Transcript listing and fetch through the transcript service
pub struct TranscriptServiceStrategy {
    service: Arc<dyn TranscriptService>,
    languages: Vec<String>,
    retry: RetryPolicy,
}

impl TranscriptServiceStrategy {
    pub fn new(service: Arc<dyn TranscriptService>, languages: Vec<String>, retry: RetryPolicy) -> Self {
        Self { service, languages, retry }
    }

    async fn try_acquire(&self, id: &VideoIdentifier) -> Result<Transcript, FailedAttempt> {
        let listings = self
            .retry
            .run("list transcripts", || self.service.list(id), CapabilityError::is_retryable)
            .await
            .into_result()?;

        let listing = select_listing(&listings, &self.languages).ok_or_else(|| {
            let available: Vec<&str> = listings.iter().map(|l| l.language_code.as_str()).collect();
            FailedAttempt::terminal(
                CapabilityError::NoTranscript(format!(
                    "wanted {:?}, available {:?}",
                    self.languages, available
                ))
                .to_string(),
            )
        })?;

        tracing::debug!(
            video_id = %id,
            language = %listing.language_code,
            generated = listing.is_generated,
            "Selected transcript"
        );

        let segments = self
            .retry
            .run("fetch transcript", || self.service.fetch(id, listing), CapabilityError::is_retryable)
            .await
            .into_result()?;

        if segments.iter().all(|s| s.text.trim().is_empty()) {
            return Err(FailedAttempt::terminal(format!(
                "{} transcript for {} is empty",
                listing.language_code, id
            )));
        }

        Ok(Transcript {
            language: listing.language_code.clone(),
            is_auto_generated: listing.is_generated,
            body: TranscriptBody::Segments(segments),
            provenance: Provenance {
                strategy: NAME.to_string(),
                detail: Some(listing.language.clone()),
                synthetic: false,
            },
        })
    }
}

#[async_trait]
impl AcquisitionStrategy for TranscriptServiceStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn cost_rank(&self) -> u32 {
        20
    }

    fn service_class(&self) -> ServiceClass {
        ServiceClass::YouTubeWeb
    }

    async fn attempt(&self, id: &VideoIdentifier) -> AttemptOutcome<Transcript> {
        self.try_acquire(id).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::MockTranscriptService;
    use crate::transcribe::TranscriptSegment;
    use std::time::Duration;

    fn listing(code: &str, generated: bool) -> TranscriptListing {
        TranscriptListing {
            language_code: code.into(),
            language: code.to_uppercase(),
            is_generated: generated,
            locator: format!("https://example.invalid/{code}/{generated}"),
        }
    }

    fn languages() -> Vec<String> {
        vec!["ja".into(), "en".into()]
    }

    #[test]
    fn test_manual_beats_generated_within_language() {
        let listings = vec![listing("en", true), listing("ja", true), listing("ja", false)];
        let chosen = select_listing(&listings, &languages()).unwrap();
        assert_eq!(chosen.language_code, "ja");
        assert!(!chosen.is_generated);
    }

    #[test]
    fn test_language_order_beats_manual() {
        let listings = vec![listing("en", false), listing("ja", true)];
        let chosen = select_listing(&listings, &languages()).unwrap();
        assert_eq!(chosen.language_code, "ja");
        assert!(chosen.is_generated);
    }

    #[test]
    fn test_no_preferred_language() {
        let listings = vec![listing("fr", false)];
        assert!(select_listing(&listings, &languages()).is_none());
    }

    #[tokio::test]
    async fn test_disabled_transcripts_are_terminal() {
        let mut service = MockTranscriptService::new();
        service
            .expect_list()
            .times(1)
            .returning(|id| Err(CapabilityError::TranscriptsDisabled(id.to_string())));
        service.expect_fetch().never();

        let strategy = TranscriptServiceStrategy::new(
            Arc::new(service),
            languages(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let id = VideoIdentifier::parse("abc12345678").unwrap();
        assert!(matches!(strategy.attempt(&id).await, AttemptOutcome::TerminalFailure(_)));
    }

    #[tokio::test]
    async fn test_fetches_selected_listing() {
        let mut service = MockTranscriptService::new();
        service
            .expect_list()
            .returning(|_| Ok(vec![listing("fr", false), listing("en-US", true)]));
        service
            .expect_fetch()
            .withf(|_, l| l.language_code == "en-US")
            .times(1)
            .returning(|_, _| Ok(vec![TranscriptSegment::new(0.0, 1.5, "hello"), TranscriptSegment::new(1.5, 1.0, "world")]));

        let strategy = TranscriptServiceStrategy::new(
            Arc::new(service),
            languages(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let id = VideoIdentifier::parse("abc12345678").unwrap();

        match strategy.attempt(&id).await {
            AttemptOutcome::Success(transcript) => {
                assert_eq!(transcript.language, "en-US");
                assert!(transcript.is_auto_generated);
                assert_eq!(transcript.body.plain_text(), "hello world");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
