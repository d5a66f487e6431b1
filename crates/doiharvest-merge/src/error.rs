//! Merge error types

use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Failure to read one shard. Always per-shard: the merge logs it and moves on.
#[derive(Debug)]
pub enum ShardReadError {
    Io(std::io::Error),
    Parquet(ParquetError),
    Arrow(ArrowError),
}

impl std::fmt::Display for ShardReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Parquet(e) => write!(f, "parquet error: {e}"),
            Self::Arrow(e) => write!(f, "arrow error: {e}"),
        }
    }
}

impl std::error::Error for ShardReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parquet(e) => Some(e),
            Self::Arrow(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ShardReadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ParquetError> for ShardReadError {
    fn from(e: ParquetError) -> Self {
        Self::Parquet(e)
    }
}

impl From<ArrowError> for ShardReadError {
    fn from(e: ArrowError) -> Self {
        Self::Arrow(e)
    }
}

/// Conditions that make a merge impossible.
#[derive(Debug)]
pub enum MergeError {
    /// Discovery found no candidate files
    NoShardsFound { roots: Vec<PathBuf> },
    /// Every candidate failed to yield a schema
    NoReadableShards { candidates: usize },
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoShardsFound { roots } => {
                write!(f, "no .parquet files found under {} input roots", roots.len())
            }
            Self::NoReadableShards { candidates } => {
                write!(f, "none of {candidates} shards has a readable schema")
            }
        }
    }
}

impl std::error::Error for MergeError {}
