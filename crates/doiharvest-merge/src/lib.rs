//! doiharvest merge - combine harvested shards into one deduplicated file
//!
//! Discovers shard files, unifies their schemas from Parquet footers, aligns
//! every shard to the unified schema, and writes one timestamped Parquet
//! file. Duplicates by identifier collapse to the richest row.

pub mod align;
pub mod config;
pub mod dedup;
pub mod discover;
pub mod error;
pub mod unify;
pub mod writer;

// Re-exports for convenience
pub use config::{DEFAULT_BASENAME, DedupKeys, MergeConfig, default_canonical_types};
pub use discover::{ShardFile, discover, find_named_dirs};
pub use error::{MergeError, ShardReadError};
pub use unify::{UnifiedSchema, unify};
pub use writer::{MergeReport, merge, read_shard};

use std::path::PathBuf;

use anyhow::{Context, Result};
use doiharvest_core::{ProgressContext, fmt_num};

/// `{basename}_{YYYYmmdd_HHMMSS}.parquet` under `config.output_dir`.
pub fn output_path_for(config: &MergeConfig) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    config
        .output_dir
        .join(format!("{}_{stamp}.parquet", config.basename))
}

/// Run the merge pipeline.
pub fn run(config: &MergeConfig, progress: &ProgressContext) -> Result<MergeReport> {
    let stage = progress.stage_line("merge");

    stage.set_message("discovering shards");
    let shards = discover(
        &config.inputs,
        config.one_level_deep,
        config.name_contains.as_deref(),
    );
    if shards.is_empty() {
        stage.finish_and_clear();
        return Err(MergeError::NoShardsFound {
            roots: config.inputs.clone(),
        }
        .into());
    }

    stage.set_message(format!("reading {} schemas", fmt_num(shards.len())));
    let paths: Vec<PathBuf> = shards.into_iter().map(|s| s.path).collect();
    let unified = unify(&paths, &config.canonical_types).context("Schema unification failed")?;

    let output_path = output_path_for(config);
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output dir: {}",
            config.output_dir.display()
        )
    })?;

    stage.set_message(format!("writing {}", output_path.display()));
    let report = merge(
        &unified,
        &output_path,
        config.zstd_level,
        config.dedup.as_ref(),
    );
    stage.finish_and_clear();

    match &report.output_path {
        Some(path) => log::info!(
            "Merged {} rows from {} shards into {} ({} unique, {} shards skipped)",
            fmt_num(report.rows_written),
            report.inputs.len(),
            path.display(),
            fmt_num(report.unique_rows),
            report.skipped.len()
        ),
        None => log::warn!(
            "Merge produced no output ({} shards skipped)",
            report.skipped.len()
        ),
    }
    Ok(report)
}
