//! Shard discovery
//!
//! Walks each root (and, optionally, each of its immediate subdirectories)
//! for `*.parquet` files. Results are deduplicated by canonical path and
//! returned in path order, which later fixes the concatenation order of the
//! merge.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

/// One candidate input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFile {
    /// Directory whose walk found the file
    pub folder: PathBuf,
    /// Canonical absolute path
    pub path: PathBuf,
    pub file_name: String,
}

fn parquet_under(folder: &Path) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/**/*.parquet",
        glob::Pattern::escape(&folder.to_string_lossy())
    );
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            log::warn!("Skipping {}: {e}", folder.display());
            return Vec::new();
        }
    };
    paths
        .filter_map(|entry| match entry {
            Ok(p) if p.is_file() => Some(p),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {e}");
                None
            }
        })
        .collect()
}

fn child_dirs(root: &Path) -> Vec<PathBuf> {
    match fs::read_dir(root) {
        Ok(entries) => {
            let mut dirs: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();
            dirs
        }
        Err(e) => {
            log::warn!("Cannot list {}: {e}", root.display());
            Vec::new()
        }
    }
}

/// Find every `*.parquet` under `roots`.
///
/// Missing roots are logged and skipped.
pub fn discover(
    roots: &[PathBuf],
    one_level_deep: bool,
    name_contains: Option<&str>,
) -> Vec<ShardFile> {
    let mut seen = FxHashSet::default();
    let mut found = Vec::new();

    for root in roots {
        if !root.is_dir() {
            log::warn!("Missing input directory: {}", root.display());
            continue;
        }
        let mut folders = vec![root.clone()];
        if one_level_deep {
            folders.extend(child_dirs(root));
        }

        for folder in folders {
            for path in parquet_under(&folder) {
                let path = fs::canonicalize(&path).unwrap_or(path);
                if !seen.insert(path.clone()) {
                    continue;
                }
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if name_contains.is_some_and(|needle| !file_name.contains(needle)) {
                    continue;
                }
                found.push(ShardFile {
                    folder: folder.clone(),
                    path,
                    file_name,
                });
            }
        }
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    log::info!("Discovered {} shard files", found.len());
    found
}

/// Directories named `name` anywhere under `base`, in path order.
pub fn find_named_dirs(base: &Path, name: &str) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/**/{}",
        glob::Pattern::escape(&base.to_string_lossy()),
        glob::Pattern::escape(name)
    );
    let mut dirs: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_dir()).collect(),
        Err(e) => {
            log::warn!("Invalid directory pattern {pattern}: {e}");
            Vec::new()
        }
    };
    dirs.sort();
    dirs
}
