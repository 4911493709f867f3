use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use transcript_harvester::acquire::{AcquisitionStrategy, AttemptOutcome};
use transcript_harvester::extractors::{CapabilityError, CaptionTrack, CaptionsApi};
use transcript_harvester::rate_limit::ServiceClass;
use transcript_harvester::transcribe::{Transcript, TranscriptSegment};
use transcript_harvester::VideoIdentifier;

/// Captions API with a single English track whose one cue carries `text`
#[derive(Clone)]
pub struct StubCaptions {
    pub text: String,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl StubCaptions {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl CaptionsApi for StubCaptions {
    async fn list_tracks(&self, id: &VideoIdentifier) -> Result<Vec<CaptionTrack>, CapabilityError> {
        self.calls.lock().unwrap().push(id.to_string());
        Ok(vec![CaptionTrack {
            id: format!("track-{id}"),
            language: "en".to_string(),
            name: None,
            is_auto_generated: false,
            locator: format!("https://www.youtube.com/api/timedtext?v={id}&lang=en"),
        }])
    }

    async fn download_track(&self, _track: &CaptionTrack) -> Result<Vec<TranscriptSegment>, CapabilityError> {
        Ok(vec![TranscriptSegment::new(0.0, 2.0, self.text.clone())])
    }
}

/// Strategy that always fails terminally and counts its attempts
#[derive(Clone)]
pub struct FailingStrategy {
    pub name: &'static str,
    pub rank: u32,
    pub attempts: Arc<Mutex<usize>>,
}

impl FailingStrategy {
    pub fn new(name: &'static str, rank: u32) -> Self {
        Self {
            name,
            rank,
            attempts: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl AcquisitionStrategy for FailingStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn cost_rank(&self) -> u32 {
        self.rank
    }

    fn service_class(&self) -> ServiceClass {
        ServiceClass::YouTubeWeb
    }

    async fn attempt(&self, id: &VideoIdentifier) -> AttemptOutcome<Transcript> {
        *self.attempts.lock().unwrap() += 1;
        AttemptOutcome::TerminalFailure(format!("no transcript for {id}"))
    }
}
