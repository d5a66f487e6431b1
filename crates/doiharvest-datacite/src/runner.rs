//! Harvest orchestration
//!
//! One invocation runs a pass per (partition key × selection), sequentially
//! and fail-fast. Each pass streams pages through [`PassStream`], maps items
//! to rows, and flushes the row buffer into a new shard every
//! `flush_every` rows and once more when the pass ends. The buffer is also
//! flushed when a pass stops early, so only pages already checkpointed end up
//! in shards.

use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use doiharvest_core::{
    Accumulator, FetchError, ProgressContext, ReqwestTransport, Transport, fmt_num,
    is_shutdown_requested,
};

use crate::api::Fetcher;
use crate::config::{Config, Selection};
use crate::pager::PassStream;
use crate::params::{PassFilter, QueryParams};
use crate::shards::ShardWriter;
use crate::transform::{DoiAccumulator, map_record};

/// How a pass ended.
#[derive(Debug)]
pub enum PassOutcome {
    /// Reached the last page
    Completed,
    /// Stopped on a shutdown request
    Interrupted,
    /// Stopped on a fatal fetch error; its checkpoint still points at the
    /// page that failed
    Failed(FetchError),
}

/// Per-pass statistics.
#[derive(Debug)]
pub struct PassSummary {
    pub partition: Option<String>,
    pub selection: Selection,
    /// Digest of the pass's query signature (checkpoint file component)
    pub signature: String,
    pub resumed: bool,
    pub pages: usize,
    /// Items received
    pub records: usize,
    /// Items without usable attributes
    pub dropped: usize,
    /// `meta.total` from the probe request
    pub probe_total: Option<u64>,
    pub outcome: PassOutcome,
}

impl PassSummary {
    pub fn label(&self) -> String {
        pass_label(self.partition.as_deref(), &self.selection)
    }
}

/// Summary of a harvest invocation
#[derive(Debug, Default)]
pub struct HarvestSummary {
    pub passes: Vec<PassSummary>,
    pub shards_written: usize,
    pub rows_written: usize,
    pub records_dropped: usize,
    pub elapsed: Duration,
    /// A shutdown request stopped the run before every pass finished
    pub interrupted: bool,
    /// End of the date range every pass used (part of each signature)
    pub date_end: Option<NaiveDate>,
}

impl HarvestSummary {
    /// The pass that aborted the run, if any.
    pub fn failure(&self) -> Option<(&PassSummary, &FetchError)> {
        self.passes.iter().find_map(|p| match &p.outcome {
            PassOutcome::Failed(e) => Some((p, e)),
            _ => None,
        })
    }

    pub fn log(&self) {
        log::info!("=== Harvest Summary ===");
        for pass in &self.passes {
            let state = match &pass.outcome {
                PassOutcome::Completed => "done".to_string(),
                PassOutcome::Interrupted => "interrupted".to_string(),
                PassOutcome::Failed(e) => format!("failed: {e}"),
            };
            log::info!(
                "{}: {} records in {} pages{} ({state})",
                pass.label(),
                fmt_num(pass.records),
                pass.pages,
                if pass.resumed { ", resumed" } else { "" }
            );
        }
        log::info!(
            "Shards: {} written, {} rows ({} items dropped)",
            self.shards_written,
            fmt_num(self.rows_written),
            self.records_dropped
        );
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.rows_written > 0 && !self.elapsed.is_zero() {
            let rows_per_sec = self.rows_written as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {:.0} rows/sec", rows_per_sec);
        }
    }
}

fn pass_label(partition: Option<&str>, selection: &Selection) -> String {
    format!("{} {selection}", partition.unwrap_or("*"))
}

/// Run a harvest against the configured endpoint.
pub fn run(config: &Config, progress: &ProgressContext) -> anyhow::Result<HarvestSummary> {
    let transport = ReqwestTransport::new(&config.http).context("building HTTP client")?;
    let fetcher = Fetcher::new(transport, config.endpoint.clone(), config.retry);
    run_with(config, &fetcher, progress)
}

/// Run a harvest through an explicit fetcher.
///
/// Pass-level fetch failures do not turn into `Err`: they end the run and are
/// reported through [`HarvestSummary::failure`]. `Err` means local I/O
/// (shard or mirror writes) failed.
pub fn run_with<T: Transport>(
    config: &Config,
    fetcher: &Fetcher<T>,
    progress: &ProgressContext,
) -> anyhow::Result<HarvestSummary> {
    config.validate()?;
    let start = Instant::now();

    let mut shards = ShardWriter::open(
        &config.shard_dir,
        &config.shard_prefix,
        config.zstd_level,
        config.ndjson_path.as_deref(),
    )?;
    let date_end = resolve_date_end(config, Utc::now().date_naive());
    log::info!(
        "Range: {} from {} until {date_end}",
        config.date_field,
        config
            .date_start
            .map_or_else(|| "the beginning".to_string(), |d| d.to_string())
    );
    let selections = config.selections();

    let mut summary = HarvestSummary {
        date_end: Some(date_end),
        ..Default::default()
    };
    'passes: for partition in config.partitions() {
        for selection in &selections {
            if is_shutdown_requested() {
                summary.interrupted = true;
                break 'passes;
            }
            let filter = PassFilter {
                selection,
                date_field: config.date_field,
                date_start: config.date_start,
                date_end,
                partition: partition.as_deref(),
                page_size: config.page_size,
                include_affiliation: config.include_affiliation,
            };
            let params = QueryParams::build(&filter, config.start_cursor.as_deref());
            let pass = run_pass(
                config,
                fetcher,
                progress,
                &mut shards,
                params,
                partition.as_deref(),
                selection,
            )?;
            summary.records_dropped += pass.dropped;
            let stop = match pass.outcome {
                PassOutcome::Completed => false,
                PassOutcome::Interrupted => {
                    summary.interrupted = true;
                    true
                }
                PassOutcome::Failed(_) => true,
            };
            summary.passes.push(pass);
            if stop {
                break 'passes;
            }
        }
    }

    summary.shards_written = shards.written().len();
    summary.rows_written = shards.rows_written();
    shards.close()?;
    summary.elapsed = start.elapsed();
    summary.log();
    Ok(summary)
}

/// Explicit end date, or `today`.
///
/// The end date is part of every pass signature, so an implicit one moves
/// each day and a rerun on another day no longer matches its checkpoints.
fn resolve_date_end(config: &Config, today: NaiveDate) -> NaiveDate {
    match config.date_end {
        Some(end) => end,
        None => {
            if config.resume {
                log::warn!(
                    "No end date given, ranges end today ({today}); checkpoints written on \
                     another day will not match. Pass --until to resume across days"
                );
            }
            today
        }
    }
}

fn run_pass<T: Transport>(
    config: &Config,
    fetcher: &Fetcher<T>,
    progress: &ProgressContext,
    shards: &mut ShardWriter,
    params: QueryParams,
    partition: Option<&str>,
    selection: &Selection,
) -> anyhow::Result<PassSummary> {
    let label = pass_label(partition, selection);

    let probe_total = match fetcher.probe_total(&params) {
        Ok(total) => {
            log::info!("{label}: {} matching records", fmt_num(total as usize));
            Some(total)
        }
        Err(e) => {
            log::warn!("{label}: probe failed ({e}), continuing without a total");
            None
        }
    };

    let mut stream = PassStream::open(
        fetcher,
        params,
        &config.checkpoint_dir,
        partition,
        config.resume,
    );
    log::info!(
        "{label}: signature {}, checkpoint {}",
        stream.signature().digest(),
        stream.checkpoint_path().display()
    );
    let pb = progress.pass_bar(&label, probe_total);
    if stream.resumed() {
        pb.set_message("resumed");
    }

    let mut acc = DoiAccumulator::new();
    let mut records = 0usize;
    let mut dropped = 0usize;
    let mut failure = None;

    while let Some(page) = stream.next() {
        let items = match page {
            Ok(items) => items,
            Err(e) => {
                failure = Some(e);
                break;
            }
        };
        let mut flushed = false;
        for item in &items {
            records += 1;
            match map_record(item) {
                Some(row) => acc.push(row),
                None => dropped += 1,
            }
            if acc.len() >= config.flush_every {
                shards.flush(&mut acc)?;
                flushed = true;
            }
        }
        if flushed {
            stream.commit(acc.is_empty());
        }
        pb.inc(items.len() as u64);
    }

    if !acc.is_empty() {
        log::debug!("{label}: flushing {} buffered rows", acc.len());
    }
    shards.flush(&mut acc)?;
    stream.commit(true);
    pb.finish_and_clear();

    let outcome = match failure {
        Some(e) => {
            log::error!("{label}: aborted after {} pages: {e}", stream.pages());
            PassOutcome::Failed(e)
        }
        None if stream.interrupted() => PassOutcome::Interrupted,
        None => PassOutcome::Completed,
    };

    Ok(PassSummary {
        partition: partition.map(str::to_owned),
        selection: selection.clone(),
        signature: stream.signature().digest(),
        resumed: stream.resumed(),
        pages: stream.pages(),
        records,
        dropped,
        probe_total,
        outcome,
    })
}
