//! Optional NDJSON mirror of flushed rows
//!
//! Every shard flush also appends its rows as JSON lines. A path ending in
//! `.gz` is gzip-compressed; appending across runs yields a multi-member gzip
//! stream that standard tools read as one file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::error::ArrowError;
use arrow::json::LineDelimitedWriter;
use flate2::Compression;
use flate2::write::GzEncoder;

enum Output {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }
}

/// Append-only JSON-lines writer.
pub struct NdjsonMirror {
    path: PathBuf,
    out: Output,
    rows: usize,
}

impl std::fmt::Debug for NdjsonMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdjsonMirror")
            .field("path", &self.path)
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

impl NdjsonMirror {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let file = BufWriter::new(file);
        let out = if is_gzip(&path) {
            Output::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Output::Plain(file)
        };
        Ok(Self { path, out, rows: 0 })
    }

    /// Append every row of `batch` as one JSON object per line.
    pub fn append(&mut self, batch: &RecordBatch) -> Result<(), ArrowError> {
        let mut writer = LineDelimitedWriter::new(&mut self.out);
        writer.write(batch)?;
        writer.finish()?;
        self.rows += batch.num_rows();
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and, for gzip, write the member trailer.
    pub fn close(self) -> io::Result<()> {
        match self.out {
            Output::Plain(mut w) => w.flush(),
            Output::Gzip(enc) => enc.finish()?.flush(),
        }
    }
}
