use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{AudioSource, CapabilityError, TranscriptListing, TranscriptService};
use crate::resolver::VideoIdentifier;
use crate::transcribe::processor::parse_vtt;
use crate::transcribe::TranscriptSegment;

pub(crate) const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// One way of asking yt-dlp for the audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadVariant {
    Standard,
    WorstAudio,
    AlternateUserAgent,
    AlternateFormat,
    GeoBypass,
}

impl DownloadVariant {
    /// Every variant, in the order they are tried
    pub const ALL: [DownloadVariant; 5] = [
        DownloadVariant::Standard,
        DownloadVariant::WorstAudio,
        DownloadVariant::AlternateUserAgent,
        DownloadVariant::AlternateFormat,
        DownloadVariant::GeoBypass,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DownloadVariant::Standard => "standard",
            DownloadVariant::WorstAudio => "worst-audio",
            DownloadVariant::AlternateUserAgent => "alternate-user-agent",
            DownloadVariant::AlternateFormat => "alternate-format",
            DownloadVariant::GeoBypass => "geo-bypass",
        }
    }

    fn args(&self) -> Vec<&'static str> {
        match self {
            DownloadVariant::Standard => vec!["--format", "bestaudio/best", "--extract-audio", "--audio-format", "mp3"],
            DownloadVariant::WorstAudio => vec![
                "--format",
                "worstaudio/worst",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "9",
            ],
            DownloadVariant::AlternateUserAgent => vec![
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--user-agent",
                DESKTOP_USER_AGENT,
            ],
            DownloadVariant::AlternateFormat => vec!["--format", "18/140/best", "--extract-audio", "--audio-format", "m4a"],
            DownloadVariant::GeoBypass => vec![
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--geo-bypass",
            ],
        }
    }
}

impl std::fmt::Display for DownloadVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// YouTube access through the yt-dlp command line tool
pub struct YtDlp {
    yt_dlp_path: String,
    client: Client,
    show_progress: bool,
}

impl YtDlp {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            client: Client::new(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, CapabilityError> {
        let output = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CapabilityError::Tool {
                tool: "yt-dlp",
                message: format!("could not start {}: {}", self.yt_dlp_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        Ok(output.stdout)
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, id: &VideoIdentifier) -> Result<Value, CapabilityError> {
        tracing::debug!(video_id = %id, "Extracting video info");

        let url = id.watch_url();
        let stdout = self
            .run(&["--dump-json", "--skip-download", "--no-playlist", "--no-warnings", &url])
            .await?;

        serde_json::from_slice(&stdout).map_err(|e| CapabilityError::Parse(format!("yt-dlp metadata: {e}")))
    }
}

/// Translate yt-dlp error output into the capability taxonomy
fn classify_stderr(stderr: &str) -> CapabilityError {
    let lower = stderr.to_lowercase();
    let message = stderr.trim().lines().last().unwrap_or_default().to_string();

    if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("has been removed")
        || lower.contains("does not exist")
    {
        CapabilityError::NotFound(message)
    } else if lower.contains("http error 429") || lower.contains("too many requests") {
        CapabilityError::RateLimited(message)
    } else {
        CapabilityError::Tool { tool: "yt-dlp", message }
    }
}

/// Pick the WebVTT download URL out of one yt-dlp subtitle entry list
fn vtt_url(formats: &Value) -> Option<String> {
    formats
        .as_array()?
        .iter()
        .find(|f| f["ext"].as_str() == Some("vtt"))
        .and_then(|f| f["url"].as_str())
        .map(str::to_string)
}

/// Build listings from the `subtitles` and `automatic_captions` maps of yt-dlp metadata
pub fn listings_from_info(info: &Value) -> Vec<TranscriptListing> {
    let mut listings = Vec::new();

    for (key, is_generated) in [("subtitles", false), ("automatic_captions", true)] {
        let Some(tracks) = info[key].as_object() else {
            continue;
        };
        for (code, formats) in tracks {
            if code == "live_chat" {
                continue;
            }
            let Some(url) = vtt_url(formats) else {
                continue;
            };
            let name = formats
                .as_array()
                .and_then(|f| f.iter().find_map(|entry| entry["name"].as_str()))
                .unwrap_or(code)
                .to_string();

            listings.push(TranscriptListing {
                language_code: code.trim_end_matches("-orig").to_string(),
                language: name,
                is_generated,
                locator: url,
            });
        }
    }

    listings
}

#[async_trait]
impl TranscriptService for YtDlp {
    async fn list(&self, id: &VideoIdentifier) -> Result<Vec<TranscriptListing>, CapabilityError> {
        let info = self.get_video_info(id).await?;
        let listings = listings_from_info(&info);

        if listings.is_empty() {
            return Err(CapabilityError::TranscriptsDisabled(format!("no subtitles offered for {id}")));
        }
        Ok(listings)
    }

    async fn fetch(
        &self,
        id: &VideoIdentifier,
        listing: &TranscriptListing,
    ) -> Result<Vec<TranscriptSegment>, CapabilityError> {
        tracing::debug!(video_id = %id, language = %listing.language_code, "Fetching subtitle track");

        let response = self.client.get(&listing.locator).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(status, &body));
        }

        let vtt = response.text().await?;
        let segments = parse_vtt(&vtt);
        if segments.is_empty() {
            return Err(CapabilityError::NoTranscript(format!(
                "{} track for {} is empty",
                listing.language_code, id
            )));
        }
        Ok(segments)
    }
}

#[async_trait]
impl AudioSource for YtDlp {
    async fn stream_url(&self, id: &VideoIdentifier) -> Result<String, CapabilityError> {
        let url = id.watch_url();
        let stdout = self
            .run(&["--format", "bestaudio/best", "--get-url", "--no-playlist", "--no-warnings", &url])
            .await?;

        first_url(&String::from_utf8_lossy(&stdout)).ok_or_else(|| CapabilityError::Tool {
            tool: "yt-dlp",
            message: format!("no audio stream URL printed for {id}"),
        })
    }

    /// Download audio directly with yt-dlp into a fresh per-variant directory under `dest_dir`
    async fn download(
        &self,
        id: &VideoIdentifier,
        variant: DownloadVariant,
        dest_dir: &Path,
    ) -> Result<PathBuf, CapabilityError> {
        tracing::debug!(video_id = %id, variant = %variant, "Downloading audio");

        let dest_dir = fresh_variant_dir(dest_dir, variant)?;
        let dest_dir = dest_dir.as_path();
        let template = dest_dir.join(format!("{}.%(ext)s", id));
        let template = template.to_string_lossy().to_string();
        let url = id.watch_url();

        let mut args: Vec<&str> = variant.args();
        args.extend(["--no-playlist", "--newline", "--no-warnings", "--output", template.as_str(), url.as_str()]);

        let progress = if self.show_progress {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
                bar.set_style(style);
            }
            bar.set_message(format!("Downloading audio for {} ({})...", id, variant));
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };

        let result = self.run(&args).await;
        if let Some(bar) = &progress {
            bar.finish_and_clear();
        }
        result?;

        find_downloaded(dest_dir, id).ok_or_else(|| CapabilityError::Tool {
            tool: "yt-dlp",
            message: format!("no audio file produced in {}", dest_dir.display()),
        })
    }
}

/// First URL line of `--get-url` output
fn first_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("http"))
        .map(str::to_string)
}

/// Empty directory for one variant, so files left by an earlier variant are never picked up
fn fresh_variant_dir(dest_dir: &Path, variant: DownloadVariant) -> std::io::Result<PathBuf> {
    let dir = dest_dir.join(variant.name());
    if dir.exists() {
        fs_err::remove_dir_all(&dir)?;
    }
    fs_err::create_dir_all(&dir)?;
    Ok(dir)
}

/// Locate the finished download (`<id>.<ext>`, ignoring partial files)
fn find_downloaded(dest_dir: &Path, id: &VideoIdentifier) -> Option<PathBuf> {
    let prefix = format!("{}.", id);
    fs_err::read_dir(dest_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            name.starts_with(&prefix) && !name.ends_with(".part") && !name.ends_with(".ytdl")
        })
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}
