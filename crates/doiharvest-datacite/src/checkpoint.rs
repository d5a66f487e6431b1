//! Query signatures and per-pass cursor checkpoints
//!
//! A checkpoint file records the cursor a restart begins from for one
//! (signature, partition key) pair. It is rewritten after every page and
//! every flush, and read once when a pass starts. A checkpoint whose stored signature differs from
//! the running pass is never honored.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::QueryParams;

/// Parameter keys that define *what* a pass harvests. Pagination keys
/// (`page[cursor]`, `page[size]`) and presentation flags are excluded.
pub const SIGNATURE_KEYS: &[&str] = &[
    "resource-type-id",
    "query",
    "from-registered-date",
    "until-registered-date",
    "from-created-date",
    "until-created-date",
    "from-updated-date",
    "until-updated-date",
    "client-id",
];

/// Hex characters kept from the blake3 digest for filenames
const DIGEST_LEN: usize = 12;

/// Canonical projection of the filter-relevant parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(BTreeMap<String, String>);

impl Signature {
    /// Short fixed-length digest of the canonical JSON form.
    pub fn digest(&self) -> String {
        let canonical: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let json = serde_json::Value::Object(canonical).to_string();
        blake3::hash(json.as_bytes()).to_hex()[..DIGEST_LEN].to_string()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Project `params` onto [`SIGNATURE_KEYS`].
pub fn compute_signature(params: &QueryParams) -> Signature {
    Signature(
        params
            .iter()
            .filter(|(k, _)| SIGNATURE_KEYS.contains(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Replace anything outside `[A-Za-z0-9_-]` so the key is filename-safe.
fn sanitize_partition(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `dir/checkpoint_{digest}[_{partition}].json`
///
/// The digest already covers the partition key, so two keys that sanitize to
/// the same string still land in different files.
pub fn checkpoint_path(dir: &Path, signature: &Signature, partition_key: Option<&str>) -> PathBuf {
    let mut name = format!("checkpoint_{}", signature.digest());
    if let Some(key) = partition_key.filter(|k| !k.is_empty()) {
        name.push('_');
        name.push_str(&sanitize_partition(key));
    }
    name.push_str(".json");
    dir.join(name)
}

/// Persisted pagination state of one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub signature: Signature,
    /// Cursor of the next page; `None` once the pass reached its last page
    pub next_cursor: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn now(signature: Signature, next_cursor: Option<String>) -> Self {
        Self {
            signature,
            next_cursor,
            saved_at: Utc::now(),
        }
    }

    /// Cursor to resume from, only if this checkpoint belongs to `signature`
    /// and the pass had not finished.
    pub fn resume_cursor(&self, signature: &Signature) -> Option<&str> {
        if &self.signature != signature {
            return None;
        }
        self.next_cursor.as_deref()
    }
}

/// Checkpoint read/write failure. Callers degrade: a failed load starts the
/// pass fresh, a failed save is logged and the pass continues.
#[derive(Debug)]
pub enum CheckpointError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "checkpoint {}: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "checkpoint {} is not valid: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

/// Read a checkpoint. A missing file is `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<Checkpoint>, CheckpointError> {
    let json = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|source| CheckpointError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a checkpoint via tmp file + rename, creating parent directories.
///
/// The tmp file is synced before the rename, so after a power loss the path
/// holds either the previous checkpoint or the new one.
pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
    let io_err = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(checkpoint).map_err(|source| {
        CheckpointError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let tmp = doiharvest_core::tmp_path_for(path);
    let mut file = File::create(&tmp).map_err(io_err)?;
    file.write_all(json.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);
    fs::rename(&tmp, path).map_err(io_err)?;
    sync_dir(path.parent()).map_err(io_err)
}

/// Persist the rename itself. No-op where directories cannot be synced.
#[cfg(unix)]
fn sync_dir(dir: Option<&Path>) -> std::io::Result<()> {
    match dir.filter(|d| !d.as_os_str().is_empty()) {
        Some(dir) => File::open(dir)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: Option<&Path>) -> std::io::Result<()> {
    Ok(())
}
