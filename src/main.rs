//! ratingscan CLI - Resumable rating census with age/gender percentiles.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ratingscan::models::{OutputFormat, Overrides};
use ratingscan::{
    CensusPipeline, CheckpointStore, Config, HttpSource, RunSnapshot, TracingObserver,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ratingscan")]
#[command(version)]
#[command(about = "Resumable rating census with age/gender percentiles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "ratingscan.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan clubs, analyze players and write reports
    Run {
        /// Number of concurrent club workers
        #[arg(long)]
        concurrency: Option<usize>,

        /// Resume from an existing checkpoint
        #[arg(long)]
        resume: bool,

        /// Checkpoint file path
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Minimum group size for percentile tables
        #[arg(long)]
        min_sample_size: Option<usize>,

        /// Directory for report files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Only scan clubs whose id starts with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Report format: json, csv or both
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# ratingscan configuration file

[source]
base_url = "https://ratings.example.org/api/v1"
# Bearer token (can also use RATINGSCAN_API_TOKEN env var)
# api_token = "${RATINGS_TOKEN}"
timeout_secs = 30
max_retries = 3
page_size = 100

[run]
filter_prefix = ""
concurrency = 8
min_sample_size = 10
# reference_year = 2024        # defaults to the current year
# cutoff_date = "2024-01-01"   # defaults to January 1st of the reference year
save_every = 10
resume = false

[output]
dir = "output"
format = "both"   # json, csv or both
checkpoint_path = "ratingscan.checkpoint.json"
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {:?}", path))
}

/// Cancel `token` on Ctrl-C; in-flight clubs still finish.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight clubs and saving checkpoint");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate().context("Invalid configuration")?;

            info!("Configuration is valid");
            info!("  Source: {}", config.source.base_url);
            info!(
                "  API token: {}",
                if config.resolve_api_token().is_some() {
                    "configured"
                } else {
                    "none"
                }
            );
            info!("  Concurrency: {}", config.run.concurrency);
            info!("  Min sample size: {}", config.run.min_sample_size);
            info!(
                "  Reference year: {} (cutoff {})",
                config.run.reference_year(),
                config.run.cutoff()
            );
            info!("  Output: {:?} ({})", config.output.dir, config.output.format);
            return Ok(());
        }

        Commands::Run {
            concurrency,
            resume,
            checkpoint,
            min_sample_size,
            output_dir,
            prefix,
            format,
            no_progress,
        } => {
            let mut config = load_config(&cli.config)?;
            config.apply_overrides(Overrides {
                concurrency,
                resume,
                checkpoint_path: checkpoint,
                min_sample_size,
                output_dir,
                filter_prefix: prefix,
                format,
            });
            config.validate().context("Invalid configuration")?;

            let source =
                Arc::new(HttpSource::from_config(&config).context("Failed to create HTTP client")?);
            let store = Arc::new(
                CheckpointStore::open(
                    &config.output.checkpoint_path,
                    RunSnapshot::from(&config),
                    config.run.resume,
                )
                .context("Failed to open checkpoint")?,
            );
            let observer = Arc::new(TracingObserver::new(!no_progress));

            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let pipeline = CensusPipeline::new(config.clone(), source.clone(), store, observer);
            let output = pipeline.run(cancel).await.context("Census failed")?;
            let summary = &output.summary;
            let (requests, limits) = source.stats();

            let status = if summary.cancelled {
                "Interrupted"
            } else {
                "Complete"
            };
            println!("\n=== Rating Census {status} ===");
            println!(
                "Clubs:       {} ({} resumed, {} failed)",
                summary.total_clubs, summary.skipped_clubs, summary.failed_clubs
            );
            println!("Players:     {}", summary.processed_players);
            println!("Failed:      {}", summary.failed_players);
            println!("Groups:      {}", summary.groups);
            println!(
                "Excluded:    {} groups below {} players",
                summary.excluded_groups.len(),
                config.run.min_sample_size
            );
            println!("Requests:    {} ({} rate limited)", requests, limits.total_429s);
            println!("Throughput:  {:.0}/hr", summary.throughput_per_hour);
            println!("Runtime:     {:.1}s", summary.runtime_secs);
            if summary.cancelled {
                println!(
                    "Checkpoint:  {:?} (rerun with --resume)",
                    config.output.checkpoint_path
                );
            } else {
                for path in &output.reports {
                    println!("Output:      {path:?}");
                }
            }

            if summary.nothing_succeeded() {
                bail!("No player could be processed");
            }
        }
    }

    Ok(())
}
