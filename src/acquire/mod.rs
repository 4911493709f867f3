//! Acquisition strategy chain.
//!
//! A [`StrategyChain`] holds the enabled strategies ordered by cost, cheapest first, and tries
//! them one after another until one yields a transcript. The same [`first_success`] combinator
//! drives the download-variant sub-chain of the audio strategy.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::rate_limit::{RateLimiter, ServiceClass};
use crate::resolver::VideoIdentifier;
use crate::transcribe::Transcript;

pub mod audio;
pub mod captions;
pub mod transcript_service;

pub use audio::AudioTranscriptionStrategy;
pub use captions::CaptionsStrategy;
pub use transcript_service::TranscriptServiceStrategy;

/// Result of one attempt at something that may fail transiently or for good
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T> {
    Success(T),
    RetryableFailure(String),
    TerminalFailure(String),
}

impl<T> AttemptOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AttemptOutcome<U> {
        match self {
            AttemptOutcome::Success(value) => AttemptOutcome::Success(f(value)),
            AttemptOutcome::RetryableFailure(reason) => AttemptOutcome::RetryableFailure(reason),
            AttemptOutcome::TerminalFailure(reason) => AttemptOutcome::TerminalFailure(reason),
        }
    }

    /// Split into the value or the failure, so `?` can short-circuit a multi-step attempt
    pub fn into_result(self) -> Result<T, FailedAttempt> {
        match self {
            AttemptOutcome::Success(value) => Ok(value),
            AttemptOutcome::RetryableFailure(reason) => Err(FailedAttempt { reason, retryable: true }),
            AttemptOutcome::TerminalFailure(reason) => Err(FailedAttempt { reason, retryable: false }),
        }
    }
}

/// The failing half of an [`AttemptOutcome`]
#[derive(Debug, Clone, PartialEq)]
pub struct FailedAttempt {
    pub reason: String,
    pub retryable: bool,
}

impl FailedAttempt {
    pub fn terminal(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), retryable: false }
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), retryable: true }
    }
}

impl<T> From<FailedAttempt> for AttemptOutcome<T> {
    fn from(failure: FailedAttempt) -> Self {
        if failure.retryable {
            AttemptOutcome::RetryableFailure(failure.reason)
        } else {
            AttemptOutcome::TerminalFailure(failure.reason)
        }
    }
}

impl<T> From<Result<T, FailedAttempt>> for AttemptOutcome<T> {
    fn from(result: Result<T, FailedAttempt>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(failure) => failure.into(),
        }
    }
}

/// A step of a chain that did not produce a value
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub label: String,
    pub reason: String,
    pub retryable: bool,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.reason)
    }
}

/// What a chain run produced
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome<T> {
    Succeeded {
        value: T,
        label: String,
        failures: Vec<StepFailure>,
    },
    Exhausted {
        failures: Vec<StepFailure>,
    },
}

impl<T> ChainOutcome<T> {
    pub fn failures(&self) -> &[StepFailure] {
        match self {
            ChainOutcome::Succeeded { failures, .. } | ChainOutcome::Exhausted { failures } => failures,
        }
    }
}

/// Try `steps` in order and stop at the first success.
///
/// Every failure, terminal or not, moves on to the next step; only running out of steps
/// exhausts the chain.
pub async fn first_success<S, T, F, Fut>(steps: impl IntoIterator<Item = S>, mut attempt: F) -> ChainOutcome<T>
where
    S: fmt::Display,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let mut failures = Vec::new();

    for step in steps {
        let label = step.to_string();
        match attempt(step).await {
            AttemptOutcome::Success(value) => {
                tracing::debug!(step = %label, skipped = failures.len(), "Chain step succeeded");
                return ChainOutcome::Succeeded { value, label, failures };
            }
            AttemptOutcome::RetryableFailure(reason) => {
                tracing::warn!(step = %label, reason = %reason, "Chain step failed after retries");
                failures.push(StepFailure { label, reason, retryable: true });
            }
            AttemptOutcome::TerminalFailure(reason) => {
                tracing::info!(step = %label, reason = %reason, "Chain step failed");
                failures.push(StepFailure { label, reason, retryable: false });
            }
        }
    }

    ChainOutcome::Exhausted { failures }
}

/// One interchangeable way of obtaining a transcript
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cost and invasiveness; lower runs first
    fn cost_rank(&self) -> u32;

    /// Upstream the strategy talks to, used for pacing
    fn service_class(&self) -> ServiceClass;

    async fn attempt(&self, id: &VideoIdentifier) -> AttemptOutcome<Transcript>;
}

impl fmt::Display for dyn AcquisitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enabled strategies in cost order, paced by a shared rate limiter
pub struct StrategyChain {
    strategies: Vec<Box<dyn AcquisitionStrategy>>,
    limiter: Arc<RateLimiter>,
}

impl StrategyChain {
    pub fn new(mut strategies: Vec<Box<dyn AcquisitionStrategy>>, limiter: Arc<RateLimiter>) -> Self {
        strategies.sort_by_key(|s| s.cost_rank());
        Self { strategies, limiter }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run the chain for one identifier
    pub async fn acquire(&self, id: &VideoIdentifier) -> ChainOutcome<Transcript> {
        let limiter = &self.limiter;
        first_success(self.strategies.iter().map(|s| s.as_ref()), |strategy| async move {
            limiter.pace(strategy.service_class(), id).await;
            tracing::info!(video_id = %id, strategy = strategy.name(), "Trying strategy");
            strategy.attempt(id).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::{Provenance, TranscriptBody};
    use std::time::Duration;

    fn transcript(strategy: &str, text: &str) -> Transcript {
        Transcript {
            language: "en".into(),
            is_auto_generated: false,
            body: TranscriptBody::PlainText(text.into()),
            provenance: Provenance { strategy: strategy.into(), detail: None, synthetic: false },
        }
    }

    fn strategy(name: &'static str, rank: u32, outcome: AttemptOutcome<Transcript>) -> MockAcquisitionStrategy {
        let mut mock = MockAcquisitionStrategy::new();
        mock.expect_name().return_const(name);
        mock.expect_cost_rank().return_const(rank);
        mock.expect_service_class().return_const(ServiceClass::YouTubeWeb);
        mock.expect_attempt().times(1).return_const(outcome);
        mock
    }

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(Duration::ZERO))
    }

    #[tokio::test]
    async fn test_first_success_stops_at_first_success() {
        let mut calls = Vec::new();
        let outcome = first_success(["a", "b", "c"], |step| {
            calls.push(step);
            async move {
                match step {
                    "a" => AttemptOutcome::TerminalFailure("nothing here".into()),
                    _ => AttemptOutcome::Success(step.to_uppercase()),
                }
            }
        })
        .await;

        assert_eq!(calls, vec!["a", "b"]);
        match outcome {
            ChainOutcome::Succeeded { value, label, failures } => {
                assert_eq!(value, "B");
                assert_eq!(label, "b");
                assert_eq!(failures.len(), 1);
                assert!(!failures[0].retryable);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_success_exhausts() {
        let outcome: ChainOutcome<()> = first_success([1, 2], |n| async move {
            AttemptOutcome::RetryableFailure(format!("step {n} timed out"))
        })
        .await;
        assert_eq!(outcome.failures().len(), 2);
        assert!(matches!(outcome, ChainOutcome::Exhausted { .. }));
    }

    #[tokio::test]
    async fn test_chain_orders_by_cost_and_survives_terminal_failure() {
        let mut audio = MockAcquisitionStrategy::new();
        audio.expect_name().return_const("audio");
        audio.expect_cost_rank().return_const(30u32);
        audio.expect_service_class().return_const(ServiceClass::SpeechToText);
        audio.expect_attempt().never();

        let chain = StrategyChain::new(
            vec![
                Box::new(audio),
                Box::new(strategy("transcript-service", 20, AttemptOutcome::Success(transcript("transcript-service", "hi")))),
                Box::new(strategy("captions", 10, AttemptOutcome::TerminalFailure("no captions".into()))),
            ],
            limiter(),
        );
        assert_eq!(chain.names(), vec!["captions", "transcript-service", "audio"]);

        let id = VideoIdentifier::parse("abc12345678").unwrap();
        match chain.acquire(&id).await {
            ChainOutcome::Succeeded { value, label, failures } => {
                assert_eq!(label, "transcript-service");
                assert_eq!(value.body.plain_text(), "hi");
                assert_eq!(failures[0].label, "captions");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chain_exhaustion_reports_every_strategy() {
        let chain = StrategyChain::new(
            vec![
                Box::new(strategy("captions", 10, AttemptOutcome::TerminalFailure("no captions".into()))),
                Box::new(strategy("audio", 30, AttemptOutcome::RetryableFailure("503".into()))),
            ],
            limiter(),
        );
        let id = VideoIdentifier::parse("zzzzzzzzzzz").unwrap();
        let outcome = chain.acquire(&id).await;
        let labels: Vec<_> = outcome.failures().iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["captions", "audio"]);
    }

    #[test]
    fn test_outcome_result_conversions() {
        let ok: AttemptOutcome<u8> = Ok(3).into();
        assert_eq!(ok, AttemptOutcome::Success(3));

        let failed: AttemptOutcome<u8> = AttemptOutcome::TerminalFailure("gone".into());
        let err = failed.into_result().unwrap_err();
        assert_eq!(err, FailedAttempt::terminal("gone"));
        assert_eq!(AttemptOutcome::<u8>::from(FailedAttempt::retryable("x")), AttemptOutcome::RetryableFailure("x".into()));
    }
}
