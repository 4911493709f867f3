use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extractors::DownloadVariant;
use crate::retry::RetryPolicy;
use crate::source::{GitHubLocation, InputSource};
use crate::transcribe::groq;
use crate::utils::mask_secret;
use crate::HarvestError;

const LOCAL_CONFIG: &str = "harvester.yaml";
const APP_DIR: &str = "transcript-harvester";

/// Acquisition strategies that can be enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Public caption tracks of the watch page player
    Captions,
    /// Subtitles listed by yt-dlp
    TranscriptService,
    /// Audio download plus speech-to-text
    Audio,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Captions => write!(f, "captions"),
            StrategyKind::TranscriptService => write!(f, "transcript-service"),
            StrategyKind::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the list of videos comes from
    pub input: InputConfig,

    /// Output artifacts
    pub output: OutputConfig,

    /// Per-run behaviour
    pub run: RunConfig,

    /// Retry and pacing
    pub retry: RetryConfig,

    /// External tools
    pub tools: ToolsConfig,

    /// Speech-to-text service
    pub speech_to_text: SpeechToTextConfig,

    /// API credentials; usually supplied through the environment
    pub credentials: Credentials,

    /// File the configuration was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Local JSON file
    pub file: Option<PathBuf>,

    /// `owner/repo` holding the input JSON
    pub github_repo: Option<String>,

    /// Path of the input JSON inside `github_repo`
    pub github_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,

    /// Defaults to `<dir>/progress.json`
    pub progress_file: Option<PathBuf>,

    /// Also write `<id>_full.json`
    pub raw_json: bool,

    /// Paragraph window in minutes of video time
    pub paragraph_minutes: u32,

    /// Prefix paragraphs with their start time
    pub timestamps: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// New transcripts to produce per run
    pub limit: usize,

    /// Preferred transcript languages, most preferred first
    pub languages: Vec<String>,

    pub strategies: Vec<StrategyKind>,

    /// Show spinners for long downloads
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,

    /// Minimum spacing between calls for different videos
    pub rate_limit_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp_path: String,

    /// yt-dlp audio download variants, tried in order
    pub download_variants: Vec<DownloadVariant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechToTextConfig {
    pub base_url: String,
    pub model: String,

    /// Send the service a stream URL before falling back to downloading the audio
    pub remote_audio: bool,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked = |s: &Option<String>| s.as_deref().map(mask_secret);
        f.debug_struct("Credentials")
            .field("github_token", &masked(&self.github_token))
            .field("youtube_api_key", &masked(&self.youtube_api_key))
            .field("stt_api_key", &masked(&self.stt_api_key))
            .finish()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("transcripts"),
            progress_file: None,
            raw_json: true,
            paragraph_minutes: 5,
            timestamps: true,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            limit: 1,
            languages: vec!["ja".to_string(), "en".to_string()],
            strategies: vec![StrategyKind::Captions, StrategyKind::TranscriptService, StrategyKind::Audio],
            show_progress: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            backoff_factor: 2.0,
            rate_limit_delay_ms: 2000,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            download_variants: DownloadVariant::ALL.to_vec(),
        }
    }
}

impl Default for SpeechToTextConfig {
    fn default() -> Self {
        Self {
            base_url: groq::DEFAULT_BASE_URL.to_string(),
            model: groq::DEFAULT_MODEL.to_string(),
            remote_audio: false,
        }
    }
}

impl Config {
    /// Load configuration from `explicit`, else the first config file found, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Self::discover(),
        };

        let Some(path) = path else {
            tracing::debug!("No config file found, using defaults");
            return Ok(Self::default());
        };

        let content = fs_err::read_to_string(&path).context("Failed to read config file")?;
        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.source = Some(path);

        tracing::debug!(path = ?config.source, "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// User-level configuration file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
    }

    fn discover() -> Option<PathBuf> {
        // current directory first for easy testing
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            return Some(local);
        }
        Self::user_config_path().filter(|p| p.exists())
    }

    pub fn progress_path(&self) -> PathBuf {
        self.output
            .progress_file
            .clone()
            .unwrap_or_else(|| self.output.dir.join("progress.json"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts, Duration::from_millis(self.retry.base_delay_ms))
            .with_backoff_factor(self.retry.backoff_factor)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.retry.rate_limit_delay_ms)
    }

    pub fn uses(&self, kind: StrategyKind) -> bool {
        self.run.strategies.contains(&kind)
    }

    /// Where to read the input list from; a local file wins over a repository path
    pub fn input_source(&self) -> Result<InputSource, HarvestError> {
        if let Some(file) = &self.input.file {
            return Ok(InputSource::File(file.clone()));
        }
        match (&self.input.github_repo, &self.input.github_path) {
            (Some(repo), Some(path)) => GitHubLocation::parse(repo, path)
                .map(InputSource::GitHub)
                .ok_or_else(|| HarvestError::InvalidConfig(format!("invalid repository '{repo}', expected owner/repo"))),
            (Some(_), None) | (None, Some(_)) => Err(HarvestError::InvalidConfig(
                "both github_repo and github_path are needed for repository input".to_string(),
            )),
            (None, None) => Err(HarvestError::InvalidConfig(
                "no input given; set an input file or a repository path".to_string(),
            )),
        }
    }

    /// Check everything a run needs before any work starts
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.run.limit == 0 {
            return Err(HarvestError::InvalidConfig("limit must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(HarvestError::InvalidConfig("max_attempts must be at least 1".to_string()));
        }
        if self.output.paragraph_minutes == 0 {
            return Err(HarvestError::InvalidConfig("paragraph_minutes must be positive".to_string()));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(HarvestError::InvalidConfig("backoff_factor must be at least 1.0".to_string()));
        }
        if self.run.strategies.is_empty() {
            return Err(HarvestError::InvalidConfig("at least one strategy must be enabled".to_string()));
        }
        if self.run.languages.iter().all(|l| l.trim().is_empty()) {
            return Err(HarvestError::InvalidConfig("at least one language is required".to_string()));
        }
        url::Url::parse(&self.speech_to_text.base_url).map_err(|e| {
            HarvestError::InvalidConfig(format!("speech_to_text.base_url '{}': {e}", self.speech_to_text.base_url))
        })?;

        if let InputSource::GitHub(_) = self.input_source()? {
            require(&self.credentials.github_token, "GITHUB_TOKEN (repository input)")?;
        }
        if self.uses(StrategyKind::Audio) {
            if self.tools.download_variants.is_empty() {
                return Err(HarvestError::InvalidConfig(
                    "at least one download variant is needed for the audio strategy".to_string(),
                ));
            }
            require(&self.credentials.stt_api_key, "GROQ_API_KEY (audio strategy)")?;
        }

        Ok(())
    }

    /// Display current configuration with secrets masked
    pub fn display(&self) {
        let secret = |s: &Option<String>| match s {
            Some(value) if !value.is_empty() => mask_secret(value),
            _ => "(not set)".to_string(),
        };
        let strategies: Vec<String> = self.run.strategies.iter().map(|s| s.to_string()).collect();

        println!("Current Configuration:");
        match &self.source {
            Some(path) => println!("  Loaded from: {}", path.display()),
            None => println!("  Loaded from: (defaults)"),
        }
        match self.input_source() {
            Ok(source) => println!("  Input: {}", source),
            Err(_) => println!("  Input: (not set)"),
        }
        println!("  Output Directory: {}", self.output.dir.display());
        println!("  Progress File: {}", self.progress_path().display());
        println!("  Raw JSON: {}", self.output.raw_json);
        println!("  Paragraph Window: {} min", self.output.paragraph_minutes);
        println!("  Timestamps: {}", self.output.timestamps);
        println!("  Limit: {}", self.run.limit);
        println!("  Languages: {}", self.run.languages.join(", "));
        println!("  Strategies: {}", strategies.join(", "));
        println!(
            "  Retry: {} attempts, {} ms base delay, x{} backoff",
            self.retry.max_attempts, self.retry.base_delay_ms, self.retry.backoff_factor
        );
        println!("  Rate Limit Delay: {} ms", self.retry.rate_limit_delay_ms);
        let variants: Vec<&str> = self.tools.download_variants.iter().map(DownloadVariant::name).collect();
        println!("  yt-dlp: {} ({})", self.tools.yt_dlp_path, variants.join(", "));
        println!("  Speech-to-text: {} ({})", self.speech_to_text.model, self.speech_to_text.base_url);
        println!("  Remote Audio: {}", self.speech_to_text.remote_audio);
        println!("  GitHub Token: {}", secret(&self.credentials.github_token));
        println!("  YouTube API Key: {}", secret(&self.credentials.youtube_api_key));
        println!("  Speech-to-text API Key: {}", secret(&self.credentials.stt_api_key));
    }
}

fn require(value: &Option<String>, name: &str) -> Result<(), HarvestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(HarvestError::MissingCredential(name.to_string())),
    }
}
