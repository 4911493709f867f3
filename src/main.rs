use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcript_harvester::config::StrategyKind;
use transcript_harvester::extractors::YouTubeDataApi;
use transcript_harvester::livestreams::LivestreamCollector;
use transcript_harvester::output::write_atomic;
use transcript_harvester::source::{load_references, GitHubContentClient, InputSource};
use transcript_harvester::{resolve, utils, Cli, Commands, Config, HarvestError, HarvestPipeline, VideoReference};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            args.apply_to(&mut config);
            if cli.quiet {
                config.run.show_progress = false;
            }
            config.validate()?;

            if config.uses(StrategyKind::TranscriptService) || config.uses(StrategyKind::Audio) {
                // Check for required external dependencies (non-fatal)
                let missing_deps = utils::check_dependencies(&config.tools.yt_dlp_path).await;
                if !missing_deps.is_empty() {
                    eprintln!("⚠️  Dependency check warnings:");
                    for dep in missing_deps {
                        eprintln!("   • {}", dep);
                    }
                    eprintln!("   (Continuing anyway - strategies needing them will fail)");
                }
            }

            let source = config.input_source()?;
            let github = match &source {
                InputSource::GitHub(_) => config.credentials.github_token.as_deref().map(GitHubContentClient::new),
                InputSource::File(_) => None,
            };
            let references = load_references(&source, github.as_ref()).await;

            let stop = Arc::new(AtomicBool::new(false));
            let signal_flag = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current video");
                    signal_flag.store(true, Ordering::SeqCst);
                }
            });

            let mut pipeline = HarvestPipeline::from_config(&config)?.with_stop_flag(stop);
            let summary = pipeline.run(&references).await;

            println!("{}", summary.status());
            if summary.failed > 0 {
                println!("{} video(s) could not be transcribed", summary.failed);
            }
        }
        Commands::Resolve { references } => {
            for raw in references {
                let reference = parse_reference(&raw);
                match resolve(&reference) {
                    Some(id) => println!("{}", id),
                    None => println!("unresolvable"),
                }
            }
        }
        Commands::Livestreams(args) => {
            let key = args
                .youtube_api_key
                .or(config.credentials.youtube_api_key.clone())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    HarvestError::MissingCredential("YOUTUBE_API_KEY (livestream listing)".to_string())
                })?;

            let collector = LivestreamCollector::new(Arc::new(YouTubeDataApi::new(key)), config.retry_policy())
                .with_max_results(args.max_results);
            let listing = collector.collect(&args.channel).await?;

            let json = serde_json::to_string_pretty(&listing).context("Failed to serialize livestream listing")?;
            write_atomic(&args.output, json.as_bytes())?;
            println!(
                "Found {} livestream(s) on {}, written to {}",
                listing.total,
                listing.channel.title,
                args.output.display()
            );
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else if let Some(path) = &config.source {
                println!("Configuration file: {}", path.display());
            } else {
                let path = Config::user_config_path().context("Could not determine config directory")?;
                config.save(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout only carries command output
fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "transcript_harvester=debug,harvest=debug"
    } else {
        "transcript_harvester=info,harvest=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// JSON objects are taken as records, anything else as a raw string
fn parse_reference(raw: &str) -> VideoReference {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return VideoReference::from(value);
        }
    }
    VideoReference::Raw(trimmed.to_string())
}
