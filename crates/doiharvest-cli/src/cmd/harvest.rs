//! Harvest subcommand - resumable DataCite DOI harvest into Parquet shards

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use doiharvest_core::{HttpSettings, RetryPolicy, SharedProgress, fmt_num};
use doiharvest_datacite::config::{ACCEPT_JSON_API, USER_AGENT_PRODUCT};
use doiharvest_datacite::{DateField, PassOutcome, TypeMode};

use super::print_summary;
use crate::config::Config;

/// Exit status after a shutdown request (128 + SIGINT)
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Canonical resource type (resource-type-id)
    #[arg(short = 't', long, default_value = "Preprint")]
    pub resource_type: String,

    /// Label matched by label-mode passes (defaults to the resource type)
    #[arg(long)]
    pub type_label: Option<String>,

    /// How records of the type are selected
    #[arg(short = 'm', long, value_enum, default_value = "canonical")]
    pub type_mode: TypeModeArg,

    /// Date the range filter applies to
    #[arg(long, value_enum, default_value = "registered")]
    pub date_field: DateFieldArg,

    /// Range start (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Range end (YYYY-MM-DD, defaults to today; set it to resume on a later day)
    #[arg(long, value_parser = parse_date)]
    pub until: Option<NaiveDate>,

    /// Partition by DataCite client id (comma-separated, one pass each)
    #[arg(long = "client-id", value_delimiter = ',')]
    pub client_ids: Vec<String>,

    /// Records per page (1-1000)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Rows buffered before a shard is written
    #[arg(long)]
    pub flush_every: Option<usize>,

    /// Include creator affiliations
    #[arg(long)]
    pub affiliation: bool,

    /// Cursor to start from when no checkpoint applies
    #[arg(long)]
    pub start_cursor: Option<String>,

    /// Ignore existing checkpoints and start every pass fresh
    #[arg(long)]
    pub no_resume: bool,

    /// Checkpoint directory
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Shard output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Shard filename prefix
    #[arg(long, default_value = "datacite")]
    pub prefix: String,

    /// Also append every row to this NDJSON file (.gz for gzip)
    #[arg(long)]
    pub ndjson: Option<PathBuf>,

    /// Contact address sent in the user agent
    #[arg(long)]
    pub mailto: Option<String>,

    /// Zstd compression level (1-22)
    #[arg(short, long)]
    pub zstd_level: Option<i32>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum TypeModeArg {
    Canonical,
    Label,
    Both,
}

impl From<TypeModeArg> for TypeMode {
    fn from(m: TypeModeArg) -> Self {
        match m {
            TypeModeArg::Canonical => TypeMode::Canonical,
            TypeModeArg::Label => TypeMode::Label,
            TypeModeArg::Both => TypeMode::Both,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum DateFieldArg {
    Created,
    Updated,
    Registered,
}

impl From<DateFieldArg> for DateField {
    fn from(f: DateFieldArg) -> Self {
        match f {
            DateFieldArg::Created => DateField::Created,
            DateFieldArg::Updated => DateField::Updated,
            DateFieldArg::Registered => DateField::Registered,
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date format: {e}"))
}

fn http_settings(args: &HarvestArgs, config: &Config) -> HttpSettings {
    let mailto = args.mailto.as_deref().or(config.http.mailto.as_deref());
    let base = match mailto {
        Some(addr) => HttpSettings::polite(USER_AGENT_PRODUCT, addr),
        None => {
            log::warn!("No mailto configured; requests go out without a contact address");
            HttpSettings::default()
        }
    };
    HttpSettings {
        accept: ACCEPT_JSON_API.to_string(),
        timeout: Duration::from_secs(config.http.timeout_secs),
        ..base
    }
}

fn harvest_config(args: HarvestArgs, config: &Config) -> doiharvest_datacite::Config {
    let http = http_settings(&args, config);
    doiharvest_datacite::Config {
        endpoint: config.http.endpoint.clone(),
        http,
        retry: RetryPolicy {
            max_attempts: config.http.max_attempts,
            base_delay: Duration::from_millis(config.http.base_delay_ms),
        },
        resource_type: args.resource_type,
        type_label: args.type_label,
        type_mode: args.type_mode.into(),
        date_field: args.date_field.into(),
        date_start: args.from,
        date_end: args.until,
        client_ids: args.client_ids,
        page_size: args.page_size.unwrap_or(config.harvest.page_size),
        include_affiliation: args.affiliation,
        start_cursor: args.start_cursor,
        resume: !args.no_resume,
        checkpoint_dir: args
            .checkpoint_dir
            .unwrap_or_else(|| config.harvest.checkpoint_dir.clone()),
        shard_dir: args
            .output
            .unwrap_or_else(|| config.harvest.shard_dir.clone()),
        shard_prefix: args.prefix,
        flush_every: args.flush_every.unwrap_or(config.harvest.flush_every),
        zstd_level: args.zstd_level.unwrap_or(config.harvest.zstd_level),
        ndjson_path: args.ndjson,
    }
}

pub fn run(args: HarvestArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let dc_config = harvest_config(args, config);

    log::info!("Harvesting DataCite {}", dc_config.resource_type);
    log::info!("  Shards: {}", dc_config.shard_dir.display());
    log::info!("  Checkpoints: {}", dc_config.checkpoint_dir.display());

    doiharvest_core::install_signal_handlers().context("Failed to install signal handlers")?;
    let summary = doiharvest_datacite::run(&dc_config, progress)?;

    let mut rows: Vec<(String, String)> = summary
        .passes
        .iter()
        .map(|pass| {
            let state = match &pass.outcome {
                PassOutcome::Completed => "done",
                PassOutcome::Interrupted => "interrupted",
                PassOutcome::Failed(_) => "failed",
            };
            let total = pass
                .probe_total
                .map(|t| format!("/{}", fmt_num(t as usize)))
                .unwrap_or_default();
            (
                pass.label(),
                format!(
                    "{}{total} records, {} pages{} ({state})",
                    fmt_num(pass.records),
                    pass.pages,
                    if pass.resumed { ", resumed" } else { "" }
                ),
            )
        })
        .collect();
    rows.push((
        "Shards".to_string(),
        format!(
            "{} ({} rows, {} dropped)",
            summary.shards_written,
            fmt_num(summary.rows_written),
            summary.records_dropped
        ),
    ));
    if let Some(end) = summary.date_end {
        rows.push(("Range end".to_string(), end.to_string()));
    }
    rows.push((
        "Time".to_string(),
        format!("{:.1}s", summary.elapsed.as_secs_f64()),
    ));
    print_summary("Harvest", &rows);

    if let Some((pass, err)) = summary.failure() {
        anyhow::bail!("Pass {} failed: {err}", pass.label());
    }
    if summary.interrupted {
        eprintln!("\nInterrupted; rerun the same command to resume.");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}
