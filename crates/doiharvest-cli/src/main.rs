//! doiharvest - resumable DataCite DOI harvester and shard merger
//!
//! Harvests DOI metadata from the DataCite REST API into checkpointed
//! Parquet shards and merges shards into one deduplicated file.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "doiharvest")]
#[command(about = "Resumable DataCite DOI harvester and shard merger")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./doiharvest.toml or ~/.config/doiharvest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest DOIs into Parquet shards, resuming from checkpoints
    Harvest(cmd::harvest::HarvestArgs),
    /// Merge shard files into one deduplicated Parquet file
    Merge(cmd::merge::MergeArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(doiharvest_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug; progress bars show activity
    //   non-TTY: info unless --quiet; logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    doiharvest_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Harvest(args) => cmd::harvest::run(args, &config, &progress),
        Command::Merge(args) => cmd::merge::run(args, &config, &progress).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            let mailto = config.http.mailto.as_deref().unwrap_or("not set");
            cmd::print_summary(
                "Setting",
                &[
                    ("Endpoint".into(), config.http.endpoint.clone()),
                    ("Mailto".into(), mailto.to_string()),
                    ("Timeout".into(), format!("{}s", config.http.timeout_secs)),
                    (
                        "Retries".into(),
                        format!(
                            "{} attempts, {}ms base delay",
                            config.http.max_attempts, config.http.base_delay_ms
                        ),
                    ),
                    (
                        "Checkpoint dir".into(),
                        config.harvest.checkpoint_dir.display().to_string(),
                    ),
                    (
                        "Shard dir".into(),
                        config.harvest.shard_dir.display().to_string(),
                    ),
                    ("Page size".into(), config.harvest.page_size.to_string()),
                    ("Flush every".into(), config.harvest.flush_every.to_string()),
                    (
                        "Harvest zstd".into(),
                        config.harvest.zstd_level.to_string(),
                    ),
                    (
                        "Merge output".into(),
                        format!(
                            "{}/{}_*.parquet",
                            config.merge.output_dir.display(),
                            config.merge.basename
                        ),
                    ),
                    ("Merge zstd".into(), config.merge.zstd_level.to_string()),
                ],
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
