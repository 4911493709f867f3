use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{first_success, AcquisitionStrategy, AttemptOutcome, ChainOutcome, FailedAttempt};
use crate::extractors::{AudioInput, AudioSource, CapabilityError, DownloadVariant, SpeechToText};
use crate::rate_limit::{RateLimiter, ServiceClass};
use crate::resolver::VideoIdentifier;
use crate::retry::RetryPolicy;
use crate::transcribe::processor::body_from_speech;
use crate::transcribe::{Provenance, Transcript};

pub const NAME: &str = "audio";

const PLACEHOLDER_SAMPLE_RATE: u32 = 16_000;
const PLACEHOLDER_SECONDS: u32 = 1;
const REMOTE_LABEL: &str = "remote stream";

/// Write a one-second 16 kHz mono silent WAV used when every download variant failed
pub fn write_placeholder_wav(dir: &Path) -> Result<PathBuf, CapabilityError> {
    let path = dir.join(format!("placeholder-{}.wav", uuid::Uuid::new_v4()));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: PLACEHOLDER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let to_error = |e: hound::Error| CapabilityError::Tool {
        tool: "wav",
        message: e.to_string(),
    };
    let mut writer = hound::WavWriter::create(&path, spec).map_err(to_error)?;
    for _ in 0..PLACEHOLDER_SAMPLE_RATE * PLACEHOLDER_SECONDS {
        writer.write_sample(0i16).map_err(to_error)?;
    }
    writer.finalize().map_err(to_error)?;

    Ok(path)
}

/// Audio download followed by speech-to-text
pub struct AudioTranscriptionStrategy {
    source: Arc<dyn AudioSource>,
    stt: Arc<dyn SpeechToText>,
    variants: Vec<DownloadVariant>,
    language_hint: Option<String>,
    retry: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
    remote_audio: bool,
}

impl AudioTranscriptionStrategy {
    pub fn new(
        source: Arc<dyn AudioSource>,
        stt: Arc<dyn SpeechToText>,
        languages: &[String],
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            stt,
            variants: DownloadVariant::ALL.to_vec(),
            language_hint: languages.first().cloned(),
            retry,
            limiter: None,
            remote_audio: false,
        }
    }

    pub fn with_variants(mut self, variants: Vec<DownloadVariant>) -> Self {
        self.variants = variants;
        self
    }

    /// Pace speech-to-text requests as their own service class
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Hand the service a stream URL first and only download when that fails
    pub fn with_remote_audio(mut self, enabled: bool) -> Self {
        self.remote_audio = enabled;
        self
    }

    /// Try every download variant in order; fall back to placeholder audio
    async fn obtain_audio(&self, id: &VideoIdentifier, dir: &Path) -> Result<(PathBuf, String, bool), FailedAttempt> {
        let source = &self.source;
        let outcome = first_success(self.variants.iter().copied(), |variant| async move {
            match source.download(id, variant, dir).await {
                Ok(path) => AttemptOutcome::Success(path),
                Err(e) if e.is_retryable() => AttemptOutcome::RetryableFailure(e.to_string()),
                Err(e) => AttemptOutcome::TerminalFailure(e.to_string()),
            }
        })
        .await;

        match outcome {
            ChainOutcome::Succeeded { value, label, .. } => Ok((value, label, false)),
            ChainOutcome::Exhausted { failures } => {
                tracing::warn!(
                    video_id = %id,
                    variants = failures.len(),
                    "All download variants failed, substituting placeholder audio"
                );
                let path = write_placeholder_wav(dir).map_err(|e| FailedAttempt::retryable(e.to_string()))?;
                Ok((path, "placeholder".to_string(), true))
            }
        }
    }

    /// One paced speech-to-text call; retries within it are never paced again
    async fn transcribe(
        &self,
        id: &VideoIdentifier,
        input: &AudioInput,
        label: &str,
        synthetic: bool,
    ) -> Result<Transcript, FailedAttempt> {
        if let Some(limiter) = &self.limiter {
            limiter.pace(ServiceClass::SpeechToText, id).await;
        }

        let hint = self.language_hint.as_deref();
        let response = self
            .retry
            .run("speech-to-text", || self.stt.transcribe(input, hint), CapabilityError::is_retryable)
            .await
            .into_result()?;

        let body = body_from_speech(&response);
        if body.is_blank() {
            return Err(FailedAttempt::terminal(format!(
                "speech-to-text returned an empty transcript ({label} audio)"
            )));
        }

        Ok(Transcript {
            language: response
                .language
                .filter(|l| !l.is_empty())
                .or_else(|| self.language_hint.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            is_auto_generated: true,
            body,
            provenance: Provenance {
                strategy: NAME.to_string(),
                detail: Some(format!("{} via {}", self.stt.model(), label)),
                synthetic,
            },
        })
    }

    async fn transcribe_remote(&self, id: &VideoIdentifier) -> Result<Transcript, FailedAttempt> {
        let url = self
            .retry
            .run("audio stream url", || self.source.stream_url(id), CapabilityError::is_retryable)
            .await
            .into_result()?;
        self.transcribe(id, &AudioInput::RemoteUrl(url), REMOTE_LABEL, false).await
    }

    async fn try_acquire(&self, id: &VideoIdentifier) -> Result<Transcript, FailedAttempt> {
        if self.remote_audio {
            match self.transcribe_remote(id).await {
                Ok(transcript) => return Ok(transcript),
                Err(failure) => {
                    tracing::warn!(video_id = %id, reason = %failure.reason, "Remote audio failed, downloading instead")
                }
            }
        }

        let workdir = tempfile::Builder::new()
            .prefix(&format!("harvest-{}-", id))
            .tempdir()
            .map_err(|e| FailedAttempt::retryable(format!("cannot create temp dir: {e}")))?;

        let (path, variant, synthetic) = self.obtain_audio(id, workdir.path()).await?;
        self.transcribe(id, &AudioInput::File(path), &variant, synthetic).await
    }
}

#[async_trait]
impl AcquisitionStrategy for AudioTranscriptionStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn cost_rank(&self) -> u32 {
        30
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
    use crate::extractors::{SpeechSegment, SpeechToTextResponse};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails for the listed variants, writes a small file for the rest
    struct StubSource {
        failing: Vec<DownloadVariant>,
        stream: Option<String>,
        calls: Mutex<Vec<DownloadVariant>>,
    }

    #[async_trait]
    impl AudioSource for StubSource {
        async fn stream_url(&self, _id: &VideoIdentifier) -> Result<String, CapabilityError> {
            self.stream
                .clone()
                .ok_or_else(|| CapabilityError::NotFound("no stream".into()))
        }

        async fn download(
            &self,
            id: &VideoIdentifier,
            variant: DownloadVariant,
            dest_dir: &Path,
        ) -> Result<PathBuf, CapabilityError> {
            self.calls.lock().unwrap().push(variant);
            if self.failing.contains(&variant) {
                return Err(CapabilityError::Tool { tool: "yt-dlp", message: "HTTP Error 403".into() });
            }
            let path = dest_dir.join(format!("{id}.mp3"));
            std::fs::write(&path, b"ID3")?;
            Ok(path)
        }
    }

    /// Fails with a network error `failures` times, then answers with `text`
    struct StubStt {
        text: String,
        failures: Mutex<u32>,
        inputs: Mutex<Vec<AudioInput>>,
    }

    #[async_trait]
    impl SpeechToText for StubStt {
        fn model(&self) -> String {
            "stub-whisper".into()
        }

        async fn transcribe(
            &self,
            input: &AudioInput,
            _language: Option<&str>,
        ) -> Result<SpeechToTextResponse, CapabilityError> {
            if let AudioInput::File(path) = input {
                assert!(path.exists());
            }
            self.inputs.lock().unwrap().push(input.clone());
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(CapabilityError::Network("connection reset".into()));
            }
            Ok(SpeechToTextResponse {
                text: self.text.clone(),
                language: Some("ja".into()),
                duration: Some(1.0),
                segments: Some(vec![SpeechSegment { start: 0.0, end: 1.0, text: self.text.clone() }])
                    .filter(|_| !self.text.is_empty()),
            })
        }
    }

    fn strategy(failing: Vec<DownloadVariant>, text: &str) -> (AudioTranscriptionStrategy, Arc<StubSource>, Arc<StubStt>) {
        let source = Arc::new(StubSource { failing, stream: None, calls: Mutex::new(Vec::new()) });
        let stt = Arc::new(StubStt { text: text.into(), failures: Mutex::new(0), inputs: Mutex::new(Vec::new()) });
        let strategy = AudioTranscriptionStrategy::new(
            source.clone(),
            stt.clone(),
            &["ja".to_string()],
            RetryPolicy::new(2, Duration::from_millis(1)),
        );
        (strategy, source, stt)
    }

    #[tokio::test]
    async fn test_falls_through_variants() {
        let (strategy, source, _) = strategy(
            vec![DownloadVariant::Standard, DownloadVariant::WorstAudio],
            "こんにちは",
        );
        let id = VideoIdentifier::parse("abc12345678").unwrap();

        match strategy.attempt(&id).await {
            AttemptOutcome::Success(transcript) => {
                assert!(!transcript.provenance.synthetic);
                assert_eq!(
                    transcript.provenance.detail.as_deref(),
                    Some("stub-whisper via alternate-user-agent")
                );
                assert_eq!(transcript.language, "ja");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(source.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_placeholder_is_tagged_synthetic() {
        let (strategy, source, stt) = strategy(DownloadVariant::ALL.to_vec(), "[silence]");
        let id = VideoIdentifier::parse("abc12345678").unwrap();

        match strategy.attempt(&id).await {
            AttemptOutcome::Success(transcript) => {
                assert!(transcript.provenance.synthetic);
                assert!(transcript.provenance.detail.unwrap().ends_with("placeholder"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(source.calls.lock().unwrap().len(), DownloadVariant::ALL.len());
        let inputs = stt.inputs.lock().unwrap();
        match &inputs[0] {
            AudioInput::File(path) => assert!(path.to_string_lossy().ends_with(".wav")),
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_transcription_is_terminal() {
        let (strategy, _, _) = strategy(vec![], "");
        let id = VideoIdentifier::parse("abc12345678").unwrap();
        assert!(matches!(strategy.attempt(&id).await, AttemptOutcome::TerminalFailure(_)));
    }

    #[tokio::test]
    async fn test_remote_audio_skips_the_download() {
        let source = Arc::new(StubSource {
            failing: vec![],
            stream: Some("https://rr1.googlevideo.com/videoplayback?id=1".into()),
            calls: Mutex::new(Vec::new()),
        });
        let stt = Arc::new(StubStt { text: "hello".into(), failures: Mutex::new(0), inputs: Mutex::new(Vec::new()) });
        let strategy = AudioTranscriptionStrategy::new(
            source.clone(),
            stt.clone(),
            &["en".to_string()],
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
        .with_remote_audio(true);
        let id = VideoIdentifier::parse("abc12345678").unwrap();

        match strategy.attempt(&id).await {
            AttemptOutcome::Success(transcript) => {
                assert_eq!(transcript.provenance.detail.as_deref(), Some("stub-whisper via remote stream"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert!(source.calls.lock().unwrap().is_empty());
        assert_eq!(
            stt.inputs.lock().unwrap()[0],
            AudioInput::RemoteUrl("https://rr1.googlevideo.com/videoplayback?id=1".into())
        );
    }

    #[tokio::test]
    async fn test_remote_audio_failure_falls_back_to_download() {
        let (strategy, source, stt) = strategy(vec![], "hello");
        let strategy = strategy
            .with_remote_audio(true)
            .with_variants(vec![DownloadVariant::AlternateFormat]);
        let id = VideoIdentifier::parse("abc12345678").unwrap();

        assert!(strategy.attempt(&id).await.is_success());
        assert_eq!(*source.calls.lock().unwrap(), vec![DownloadVariant::AlternateFormat]);
        assert!(matches!(stt.inputs.lock().unwrap()[0], AudioInput::File(_)));
    }

    #[tokio::test]
    async fn test_speech_to_text_retries_are_not_paced_again() {
        let source = Arc::new(StubSource { failing: vec![], stream: None, calls: Mutex::new(Vec::new()) });
        let stt = Arc::new(StubStt { text: "hello".into(), failures: Mutex::new(2), inputs: Mutex::new(Vec::new()) });
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(300)));
        let strategy = AudioTranscriptionStrategy::new(
            source,
            stt.clone(),
            &["en".to_string()],
            RetryPolicy::new(3, Duration::from_millis(1)),
        )
        .with_rate_limiter(limiter.clone());

        // another video used the service just now
        let previous = VideoIdentifier::parse("zzzzzzzzzzz").unwrap();
        limiter.pace(ServiceClass::SpeechToText, &previous).await;

        let id = VideoIdentifier::parse("abc12345678").unwrap();
        let start = std::time::Instant::now();
        assert!(strategy.attempt(&id).await.is_success());
        let elapsed = start.elapsed();

        assert_eq!(stt.inputs.lock().unwrap().len(), 3);
        // one pacing delay (0.8x to 1.2x of 300ms) plus millisecond backoffs, never one per retry
        assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "elapsed {elapsed:?}");
    }

    #[test]
    fn test_placeholder_wav_is_one_second_of_silence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_placeholder_wav(dir.path()).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 16_000);
    }
}
