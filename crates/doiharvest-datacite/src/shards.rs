//! Incremental shard writer
//!
//! Buffers are flushed into immutable, monotonically numbered Parquet files:
//! `{prefix}_chunk_{NNNNN}.parquet`. Numbering continues after the highest
//! index already on disk, so a rerun never overwrites an earlier shard.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use doiharvest_core::{Accumulator, ParquetSink, cleanup_tmp_files, fmt_num};

use crate::ndjson::NdjsonMirror;

/// Shard file name for `index`.
pub fn shard_file_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_chunk_{index:05}.parquet")
}

/// One past the highest shard index present in `dir` for `prefix`.
pub fn next_shard_index(dir: &Path, prefix: &str) -> anyhow::Result<usize> {
    let pattern = format!(
        "{}/{}_chunk_*.parquet",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(prefix)
    );
    let stem_prefix = format!("{prefix}_chunk_");

    let mut next = 0;
    for entry in glob::glob(&pattern).context("invalid shard glob pattern")? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        let index = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(&stem_prefix))
            .and_then(|s| s.parse::<usize>().ok());
        if let Some(index) = index {
            next = next.max(index + 1);
        }
    }
    Ok(next)
}

/// Writes buffered rows into numbered shards, mirroring them to NDJSON when
/// configured.
#[derive(Debug)]
pub struct ShardWriter {
    dir: PathBuf,
    prefix: String,
    zstd_level: i32,
    next_index: usize,
    mirror: Option<NdjsonMirror>,
    written: Vec<PathBuf>,
    rows_written: usize,
}

impl ShardWriter {
    /// Prepare `dir`: create it, drop stale `*.tmp` files, find the next index.
    pub fn open(
        dir: &Path,
        prefix: &str,
        zstd_level: i32,
        ndjson_path: Option<&Path>,
    ) -> anyhow::Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        cleanup_tmp_files(dir).with_context(|| format!("cleaning {}", dir.display()))?;
        let next_index = next_shard_index(dir, prefix)?;
        if next_index > 0 {
            log::info!(
                "{} already holds shards up to {:05}, continuing numbering",
                dir.display(),
                next_index - 1
            );
        }
        let mirror = ndjson_path
            .map(NdjsonMirror::open)
            .transpose()
            .context("opening NDJSON mirror")?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            zstd_level,
            next_index,
            mirror,
            written: Vec::new(),
            rows_written: 0,
        })
    }

    /// Write everything buffered in `acc` to a new shard. No-op when empty.
    pub fn flush<A: Accumulator>(&mut self, acc: &mut A) -> anyhow::Result<Option<PathBuf>> {
        if acc.is_empty() {
            return Ok(None);
        }
        let batch = acc.take_batch().context("building shard batch")?;
        let path = self.dir.join(shard_file_name(&self.prefix, self.next_index));

        let mut sink = ParquetSink::create(&path, batch.schema().as_ref(), self.zstd_level)
            .with_context(|| format!("creating {}", path.display()))?;
        if let Err(e) = sink.write_batch(&batch) {
            sink.abort();
            return Err(e).with_context(|| format!("writing {}", path.display()));
        }
        let rows = sink
            .finalize()
            .with_context(|| format!("finalizing {}", path.display()))?;
        self.next_index += 1;

        if let Some(mirror) = self.mirror.as_mut() {
            mirror
                .append(&batch)
                .with_context(|| format!("appending to {}", mirror.path().display()))?;
        }

        log::info!("Saved shard {} ({} rows)", path.display(), fmt_num(rows));
        self.rows_written += rows;
        self.written.push(path.clone());
        Ok(Some(path))
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Close the NDJSON mirror, if any.
    pub fn close(self) -> anyhow::Result<()> {
        if let Some(mirror) = self.mirror {
            let path = mirror.path().to_path_buf();
            let rows = mirror.rows();
            mirror
                .close()
                .with_context(|| format!("closing {}", path.display()))?;
            log::info!("NDJSON mirror {} (+{} rows)", path.display(), fmt_num(rows));
        }
        Ok(())
    }
}
