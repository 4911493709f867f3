use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, StrategyKind};

#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Transcript Harvester - turn lists of YouTube videos into Markdown transcripts",
    version,
    long_about = "A best-effort batch pipeline that reads a JSON list of videos, obtains a transcript for each new one through caption tracks, subtitles or audio transcription, and writes one Markdown document per video. Re-runs skip videos that are already done."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./harvester.yaml, then the user config directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest transcripts for the videos listed in the input
    Run(RunArgs),

    /// Print the video id each reference resolves to
    Resolve {
        /// URLs or JSON objects such as '{"videoId": "..."}'
        #[arg(value_name = "REF", required = true)]
        references: Vec<String>,
    },

    /// List the past livestreams of a channel as JSON usable as run input
    Livestreams(LivestreamArgs),

    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(Args, Debug)]
pub struct LivestreamArgs {
    /// Channel URL (`/channel/<id>`, `/@handle`, `/c/<name>` or `/user/<name>`)
    #[arg(long, value_name = "URL")]
    pub channel: String,

    /// Where to write the listing
    #[arg(short, long, value_name = "FILE", default_value = "livestreams.json")]
    pub output: PathBuf,

    /// Stop after this many livestreams
    #[arg(long, value_name = "COUNT", default_value_t = crate::livestreams::DEFAULT_MAX_RESULTS)]
    pub max_results: usize,

    /// YouTube Data API key
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub youtube_api_key: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Local JSON file listing the videos
    #[arg(short, long, value_name = "FILE", conflicts_with_all = ["github_repo", "github_path"])]
    pub input: Option<PathBuf>,

    /// Repository (`owner/repo`) holding the input JSON
    #[arg(long, value_name = "OWNER/REPO", env = "HARVEST_GITHUB_REPO", requires = "github_path")]
    pub github_repo: Option<String>,

    /// Path of the input JSON inside the repository
    #[arg(long, value_name = "PATH", env = "HARVEST_GITHUB_PATH", requires = "github_repo")]
    pub github_path: Option<String>,

    /// Output directory for transcripts
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Progress file (defaults to <output-dir>/progress.json)
    #[arg(long, value_name = "FILE")]
    pub progress_file: Option<PathBuf>,

    /// New transcripts to produce in this run
    #[arg(short, long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Preferred transcript languages, most preferred first
    #[arg(long, value_name = "LANG", value_delimiter = ',')]
    pub languages: Option<Vec<String>>,

    /// Strategies to enable, in any order; they always run cheapest first
    #[arg(long, value_enum, value_name = "STRATEGY", value_delimiter = ',')]
    pub strategies: Option<Vec<StrategyKind>>,

    /// Total tries per upstream call
    #[arg(long, value_name = "COUNT")]
    pub max_attempts: Option<u32>,

    /// Base retry delay in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_delay_ms: Option<u64>,

    /// Minimum delay between calls for different videos, in milliseconds
    #[arg(long, value_name = "MS")]
    pub rate_limit_ms: Option<u64>,

    /// Paragraph window in minutes
    #[arg(long, value_name = "MINUTES")]
    pub paragraph_minutes: Option<u32>,

    /// Omit [HH:MM:SS] paragraph prefixes
    #[arg(long)]
    pub no_timestamps: bool,

    /// Skip the <id>_full.json artifact
    #[arg(long)]
    pub no_raw_json: bool,

    /// yt-dlp binary
    #[arg(long, value_name = "PATH")]
    pub yt_dlp_path: Option<String>,

    /// Speech-to-text model
    #[arg(long, value_name = "MODEL")]
    pub stt_model: Option<String>,

    /// OpenAI-compatible speech-to-text base URL
    #[arg(long, value_name = "URL")]
    pub stt_base_url: Option<String>,

    /// Token for repository input
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// YouTube Data API key, used for titles when set
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub youtube_api_key: Option<String>,

    /// Speech-to-text API key (audio strategy)
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,
}

impl RunArgs {
    /// Layer command line values over `config`
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.input.file = Some(input.clone());
            config.input.github_repo = None;
            config.input.github_path = None;
        }
        if self.github_repo.is_some() {
            config.input.file = None;
            config.input.github_repo = self.github_repo.clone();
            config.input.github_path = self.github_path.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if let Some(file) = &self.progress_file {
            config.output.progress_file = Some(file.clone());
        }
        if let Some(limit) = self.limit {
            config.run.limit = limit;
        }
        if let Some(languages) = &self.languages {
            config.run.languages = languages.iter().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();
        }
        if let Some(strategies) = &self.strategies {
            config.run.strategies = strategies.clone();
        }
        if let Some(attempts) = self.max_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry.base_delay_ms = delay;
        }
        if let Some(delay) = self.rate_limit_ms {
            config.retry.rate_limit_delay_ms = delay;
        }
        if let Some(minutes) = self.paragraph_minutes {
            config.output.paragraph_minutes = minutes;
        }
        if self.no_timestamps {
            config.output.timestamps = false;
        }
        if self.no_raw_json {
            config.output.raw_json = false;
        }
        if let Some(path) = &self.yt_dlp_path {
            config.tools.yt_dlp_path = path.clone();
        }
        if let Some(model) = &self.stt_model {
            config.speech_to_text.model = model.clone();
        }
        if let Some(url) = &self.stt_base_url {
            config.speech_to_text.base_url = url.clone();
        }
        if self.github_token.is_some() {
            config.credentials.github_token = self.github_token.clone();
        }
        if self.youtube_api_key.is_some() {
            config.credentials.youtube_api_key = self.youtube_api_key.clone();
        }
        if self.groq_api_key.is_some() {
            config.credentials.stt_api_key = self.groq_api_key.clone();
        }
    }
}
