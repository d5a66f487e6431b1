//! Merge subcommand - combine harvested shards into one deduplicated file

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use doiharvest_core::{SharedProgress, fmt_num};
use doiharvest_merge::{DedupKeys, MergeConfig, find_named_dirs};

use super::print_summary;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Directories searched for shard files
    pub inputs: Vec<PathBuf>,

    /// Also search every directory named --subdir-name under this base
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Directory name looked for under --base-dir
    #[arg(long, default_value = "batches")]
    pub subdir_name: String,

    /// Do not descend into the immediate children of each input
    #[arg(long)]
    pub top_level_only: bool,

    /// Keep only files whose name contains this substring
    #[arg(long)]
    pub name_contains: Option<String>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output file basename (a timestamp is appended)
    #[arg(long)]
    pub basename: Option<String>,

    /// Write every row instead of keeping the richest per DOI
    #[arg(long)]
    pub no_dedup: bool,

    /// Identifier column for deduplication
    #[arg(long, default_value = "doi")]
    pub id_column: String,

    /// Zstd compression level (1-22)
    #[arg(short, long)]
    pub zstd_level: Option<i32>,
}

fn merge_config(args: MergeArgs, config: &Config) -> Result<MergeConfig> {
    let mut inputs = args.inputs;
    if let Some(base) = &args.base_dir {
        let found = find_named_dirs(base, &args.subdir_name);
        log::info!(
            "Found {} '{}' directories under {}",
            found.len(),
            args.subdir_name,
            base.display()
        );
        inputs.extend(found);
    }
    anyhow::ensure!(
        !inputs.is_empty(),
        "no input directories (pass paths or --base-dir)"
    );

    let dedup = (!args.no_dedup).then(|| DedupKeys {
        id: args.id_column,
        ..DedupKeys::default()
    });

    Ok(MergeConfig {
        inputs,
        one_level_deep: !args.top_level_only,
        name_contains: args.name_contains,
        output_dir: args
            .output
            .unwrap_or_else(|| config.merge.output_dir.clone()),
        basename: args
            .basename
            .unwrap_or_else(|| config.merge.basename.clone()),
        zstd_level: args.zstd_level.unwrap_or(config.merge.zstd_level),
        dedup,
        ..Default::default()
    })
}

pub fn run(args: MergeArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let merge_config = merge_config(args, config)?;
    let report = doiharvest_merge::run(&merge_config, progress)?;

    let output = report
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "none".to_string());
    print_summary(
        "Merge",
        &[
            ("Output".to_string(), output),
            (
                "Rows".to_string(),
                format!(
                    "{} unique of {} read",
                    fmt_num(report.unique_rows),
                    fmt_num(report.rows_written)
                ),
            ),
            (
                "Shards".to_string(),
                format!(
                    "{} merged ({} skipped)",
                    report.inputs.len(),
                    report.skipped.len()
                ),
            ),
        ],
    );

    if report.output_path.is_none() {
        anyhow::bail!("Merge wrote no output");
    }
    Ok(())
}
