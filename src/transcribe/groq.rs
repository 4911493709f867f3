use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use crate::extractors::{AudioFormat, AudioInput, CapabilityError, SpeechToText, SpeechToTextResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "whisper-large-v3-turbo";

/// OpenAI-compatible speech-to-text client (Groq by default)
pub struct GroqTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqTranscriber {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn build_form(&self, input: &AudioInput, language: Option<&str>) -> Result<Form, CapabilityError> {
        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        form = match input {
            AudioInput::File(path) => {
                let format = AudioFormat::from_path(path).unwrap_or(AudioFormat::Mp3);
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("audio.{}", format.as_str()));
                let bytes = fs_err::tokio::read(path).await?;
                tracing::debug!(file = %path.display(), bytes = bytes.len(), "Uploading audio");

                let part = Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(format.mime_type())
                    .map_err(|e| CapabilityError::Parse(e.to_string()))?;
                form.part("file", part)
            }
            AudioInput::RemoteUrl(url) => form.text("url", url.clone()),
        };

        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }
        Ok(form)
    }
}

#[async_trait]
impl SpeechToText for GroqTranscriber {
    fn model(&self) -> String {
        self.model.clone()
    }

    async fn transcribe(
        &self,
        input: &AudioInput,
        language: Option<&str>,
    ) -> Result<SpeechToTextResponse, CapabilityError> {
        let form = self.build_form(input, language).await?;

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Speech-to-text request failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(status, &message));
        }

        Ok(response.json::<SpeechToTextResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = GroqTranscriber::new("key");
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url, DEFAULT_BASE_URL);

        let client = client.with_model("whisper-large-v3").with_base_url("http://localhost:9000/v1");
        assert_eq!(client.model(), "whisper-large-v3");
        assert_eq!(client.base_url, "http://localhost:9000/v1");
    }

    #[tokio::test]
    async fn test_missing_audio_file_is_io_error() {
        let client = GroqTranscriber::new("key");
        let input = AudioInput::File("/nonexistent/audio.mp3".into());
        let err = client.build_form(&input, Some("ja")).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Io(_)));
    }

    #[test]
    fn test_verbose_json_deserialization() {
        let body = r#"{"task":"transcribe","language":"japanese","duration":3.2,"text":" hi ","segments":[{"id":0,"start":0.0,"end":3.2,"text":" hi"}]}"#;
        let parsed: SpeechToTextResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.segments.unwrap().len(), 1);
        assert_eq!(parsed.duration, Some(3.2));
    }
}
