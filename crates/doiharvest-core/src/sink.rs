//! Parquet file writer with atomic tmp→rename

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

/// Buffered parquet writer. Rows land in `<final>.tmp`; the final path only
/// appears once [`ParquetSink::finalize`] succeeds.
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

/// Temporary sibling used while a parquet file is being written.
pub fn tmp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

impl ParquetSink {
    /// Create a sink that will finalize into `final_path`.
    pub fn create(
        final_path: impl Into<PathBuf>,
        schema: &Schema,
        zstd_level: i32,
    ) -> Result<Self, std::io::Error> {
        let final_path = final_path.into();
        let tmp_path = tmp_path_for(&final_path);

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(zstd_level)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .set_dictionary_enabled(true)
            .set_max_row_group_size(1024 * 1024) // 1M rows per row group
            .build();

        let writer = match ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props)) {
            Ok(w) => w,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(std::io::Error::other(e));
            }
        };

        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    /// Write a record batch
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), std::io::Error> {
        self.writer.write(batch).map_err(std::io::Error::other)?;
        self.row_count += batch.num_rows();
        Ok(())
    }

    /// Finalize: flush footer and atomically rename tmp → final.
    /// On failure the tmp file is removed.
    pub fn finalize(self) -> Result<usize, std::io::Error> {
        let Self {
            writer,
            tmp_path,
            final_path,
            row_count,
        } = self;
        let result = writer
            .close()
            .map_err(std::io::Error::other)
            .and_then(|_| fs::rename(&tmp_path, &final_path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(row_count)
    }

    /// Drop the writer and delete the tmp file without producing output.
    pub fn abort(self) {
        let Self {
            writer, tmp_path, ..
        } = self;
        drop(writer);
        if let Err(e) = fs::remove_file(&tmp_path) {
            log::warn!("Could not remove {}: {e}", tmp_path.display());
        }
    }
}

/// Check if a completed parquet file exists and has a valid footer
pub fn is_valid_parquet(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    parquet::file::reader::SerializedFileReader::new(file).is_ok()
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> std::io::Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field};
    use tempfile::TempDir;

    fn id_batch(ids: Vec<i64>) -> RecordBatch {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(ids))]).unwrap()
    }

    #[test]
    fn is_valid_parquet_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(!is_valid_parquet(&dir.path().join("nope.parquet")));
    }

    #[test]
    fn is_valid_parquet_not_parquet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.parquet");
        std::fs::write(&path, b"this is not parquet").unwrap();
        assert!(!is_valid_parquet(&path));
    }

    #[test]
    fn finalize_renames_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.parquet");
        let batch = id_batch(vec![1, 2, 3]);

        let mut sink = ParquetSink::create(&path, batch.schema().as_ref(), 3).unwrap();
        assert!(tmp_path_for(&path).exists());
        assert!(!path.exists());
        sink.write_batch(&batch).unwrap();
        assert_eq!(sink.finalize().unwrap(), 3);

        assert!(path.exists());
        assert!(!tmp_path_for(&path).exists());
        assert!(is_valid_parquet(&path));
    }

    #[test]
    fn abort_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");
        let batch = id_batch(vec![1]);

        let mut sink = ParquetSink::create(&path, batch.schema().as_ref(), 3).unwrap();
        sink.write_batch(&batch).unwrap();
        sink.abort();

        assert!(!path.exists());
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn invalid_zstd_level_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");
        let batch = id_batch(vec![1]);
        assert!(ParquetSink::create(&path, batch.schema().as_ref(), 99).is_err());
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.tmp"), b"stale").unwrap();
        std::fs::write(dir.path().join("b.parquet"), b"keep").unwrap();
        std::fs::write(dir.path().join("c.parquet.tmp"), b"stale2").unwrap();

        cleanup_tmp_files(dir.path()).unwrap();

        assert!(!dir.path().join("a.tmp").exists());
        assert!(dir.path().join("b.parquet").exists());
        assert!(!dir.path().join("c.parquet.tmp").exists());
    }

    #[test]
    fn cleanup_tmp_files_missing_dir_ok() {
        let dir = TempDir::new().unwrap();
        assert!(cleanup_tmp_files(&dir.path().join("absent")).is_ok());
    }
}
