use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::resolver::VideoIdentifier;
use crate::utils::jitter;

/// Upstream services paced independently of each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceClass {
    /// YouTube web endpoints: watch pages, caption tracks and yt-dlp
    YouTubeWeb,
    SpeechToText,
}

#[derive(Debug)]
struct LastCall {
    id: VideoIdentifier,
    at: Instant,
}

/// Minimum spacing between calls to the same service class for different identifiers.
///
/// Calls for the identifier that made the previous call are never delayed, so retries and
/// follow-up requests within one identifier only pay the retry backoff.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_calls: Mutex<HashMap<ServiceClass, LastCall>>,
}

impl RateLimiter {
    pub const JITTER_LOW: f64 = 0.8;
    pub const JITTER_HIGH: f64 = 1.2;

    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait as needed before calling `class` on behalf of `id`
    pub async fn pace(&self, class: ServiceClass, id: &VideoIdentifier) {
        let wait = self.required_wait(class, id);

        if !wait.is_zero() {
            tracing::debug!(
                service = ?class,
                video_id = %id,
                delay_ms = wait.as_millis() as u64,
                "Rate limiting"
            );
            tokio::time::sleep(wait).await;
        }

        if let Ok(mut calls) = self.last_calls.lock() {
            calls.insert(class, LastCall { id: id.clone(), at: Instant::now() });
        }
    }

    fn required_wait(&self, class: ServiceClass, id: &VideoIdentifier) -> Duration {
        let Ok(calls) = self.last_calls.lock() else {
            return Duration::ZERO;
        };
        match calls.get(&class) {
            Some(last) if last.id != *id => {
                jitter(self.delay, Self::JITTER_LOW, Self::JITTER_HIGH).saturating_sub(last.at.elapsed())
            }
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> VideoIdentifier {
        VideoIdentifier::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_first_call_is_not_delayed() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        limiter.pace(ServiceClass::YouTubeWeb, &id("abc12345678")).await;
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_same_identifier_is_not_delayed() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let video = id("abc12345678");
        limiter.pace(ServiceClass::YouTubeWeb, &video).await;

        let start = Instant::now();
        limiter.pace(ServiceClass::YouTubeWeb, &video).await;
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_different_identifier_waits_with_jitter() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        limiter.pace(ServiceClass::YouTubeWeb, &id("abc12345678")).await;

        let start = Instant::now();
        limiter.pace(ServiceClass::YouTubeWeb, &id("zzzzzzzzzzz")).await;
        // at least 0.8 * delay minus the little time already elapsed since the first call
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_service_classes_are_independent() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        limiter.pace(ServiceClass::YouTubeWeb, &id("abc12345678")).await;

        let start = Instant::now();
        limiter.pace(ServiceClass::SpeechToText, &id("zzzzzzzzzzz")).await;
        assert!(start.elapsed() < Duration::from_millis(250));
    }
}
