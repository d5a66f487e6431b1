//! Merge writer
//!
//! Streams every shard through [`align`] into one Parquet sink opened against
//! the unified schema. With dedup enabled the aligned batches are held in
//! memory, ranked as one set, and the survivors written in bounded chunks.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use doiharvest_core::{ParquetSink, fmt_num};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::align::{ColumnFix, align};
use crate::config::DedupKeys;
use crate::dedup::{gather, survivor_rows};
use crate::error::ShardReadError;
use crate::unify::UnifiedSchema;

/// Result of a merge.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// `None` when nothing was written or the writer failed
    pub output_path: Option<PathBuf>,
    /// Aligned rows taken from the inputs, before dedup
    pub rows_written: usize,
    /// Rows in the output file
    pub unique_rows: usize,
    /// Shards whose rows made it into the merge
    pub inputs: Vec<PathBuf>,
    /// Shards skipped because their schema or data could not be read
    pub skipped: Vec<PathBuf>,
}

/// Rows per batch handed to the sink after deduplication
pub const DEDUP_CHUNK_ROWS: usize = 64 * 1024;

/// Deduplicate `batches` and write the survivors; returns rows written.
fn write_deduped(
    sink: &mut ParquetSink,
    schema: &SchemaRef,
    batches: &[RecordBatch],
    keys: &DedupKeys,
) -> std::io::Result<usize> {
    let rows = survivor_rows(batches, keys).map_err(std::io::Error::other)?;
    for chunk in rows.chunks(DEDUP_CHUNK_ROWS) {
        let batch = gather(batches, schema, chunk).map_err(std::io::Error::other)?;
        sink.write_batch(&batch)?;
    }
    Ok(rows.len())
}

/// Read every batch of one shard.
pub fn read_shard(path: &Path) -> Result<Vec<RecordBatch>, ShardReadError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    Ok(reader.collect::<Result<Vec<_>, _>>()?)
}

/// Read and align one shard; a failure anywhere skips the whole shard.
fn aligned_shard(path: &Path, unified: &UnifiedSchema) -> Result<Vec<RecordBatch>, ShardReadError> {
    let mut out = Vec::new();
    for batch in read_shard(path)? {
        let aligned = align(&batch, &unified.schema)?;
        for (column, fix) in &aligned.fixes {
            match fix {
                ColumnFix::Missing | ColumnFix::Cast { .. } => {}
                ColumnFix::CastLossy { from, nulled } => log::warn!(
                    "{}: {nulled} values of '{column}' ({from}) did not convert",
                    path.display()
                ),
                ColumnFix::Nulled { from } => log::warn!(
                    "{}: column '{column}' ({from}) cannot be cast, written as nulls",
                    path.display()
                ),
            }
        }
        out.push(aligned.batch);
    }
    Ok(out)
}

/// Merge `unified.readable` into `output_path`.
///
/// Never leaves a partial file behind: rows go to `<output>.tmp`, which is
/// renamed on success and removed on any writer failure.
pub fn merge(
    unified: &UnifiedSchema,
    output_path: &Path,
    zstd_level: i32,
    keys: Option<&DedupKeys>,
) -> MergeReport {
    let mut report = MergeReport {
        skipped: unified.skipped.clone(),
        ..Default::default()
    };

    let mut sink = match ParquetSink::create(output_path, &unified.schema, zstd_level) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("Cannot create {}: {e}", output_path.display());
            return report;
        }
    };

    let mut held = Vec::new();
    for path in &unified.readable {
        let batches = match aligned_shard(path, unified) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Skipping shard {}: {e}", path.display());
                report.skipped.push(path.clone());
                continue;
            }
        };
        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        log::debug!("{}: {} rows", path.display(), fmt_num(rows));

        if keys.is_some() {
            held.extend(batches);
        } else {
            for batch in &batches {
                if let Err(e) = sink.write_batch(batch) {
                    log::error!("Write to {} failed: {e}", output_path.display());
                    sink.abort();
                    return report;
                }
            }
        }
        report.rows_written += rows;
        report.inputs.push(path.clone());
    }

    if report.inputs.is_empty() {
        log::warn!("No shard could be read; nothing written");
        sink.abort();
        return report;
    }

    if let Some(keys) = keys {
        match write_deduped(&mut sink, &unified.schema, &held, keys) {
            Ok(unique) => log::debug!(
                "{} of {} rows survive deduplication",
                fmt_num(unique),
                fmt_num(report.rows_written)
            ),
            Err(e) => {
                log::error!("Deduplication into {} failed: {e}", output_path.display());
                sink.abort();
                return report;
            }
        }
        drop(held);
    }

    match sink.finalize() {
        Ok(rows) => {
            report.unique_rows = rows;
            report.output_path = Some(output_path.to_path_buf());
        }
        Err(e) => log::error!("Finalizing {} failed: {e}", output_path.display()),
    }
    report
}
