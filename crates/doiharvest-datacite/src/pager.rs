//! Cursor pager: lazy page sequence of one harvest pass
//!
//! Opening a stream resolves the starting cursor (resume from a matching
//! checkpoint, or fresh). Each `next()` fetches one page and persists a
//! checkpoint before handing the records out, so the checkpoint for page N
//! is on disk before page N+1 is requested.
//!
//! The persisted cursor never moves past rows that only live in memory: it
//! points at the oldest page whose rows are not yet in a shard, and only
//! advances when the consumer reports a flush through [`PassStream::commit`].
//! A crash therefore re-fetches at most one buffer, never skips a page.

use std::path::{Path, PathBuf};

use doiharvest_core::{FetchError, Transport, is_shutdown_requested};
use serde_json::Value;

use crate::api::Fetcher;
use crate::checkpoint::{self, Checkpoint, Signature, checkpoint_path, compute_signature};
use crate::params::QueryParams;

/// Page iterator for one (partition, selection) pass.
pub struct PassStream<'f, T: Transport> {
    fetcher: &'f Fetcher<T>,
    params: QueryParams,
    signature: Signature,
    checkpoint_path: PathBuf,
    resumed: bool,
    pages: usize,
    done: bool,
    /// Reached the last page (as opposed to stopping on an error or shutdown)
    exhausted: bool,
    interrupted: bool,
    /// Request cursor of the last page handed out
    last_start: Option<String>,
    /// Request cursor of the oldest page with rows not yet committed
    unflushed_from: Option<String>,
}

impl<'f, T: Transport> PassStream<'f, T> {
    /// Resolve the starting cursor for `params`.
    ///
    /// With `resume`, a checkpoint whose signature matches and whose cursor is
    /// present overrides the cursor in `params`. Anything else starts from the
    /// cursor already in `params`.
    pub fn open(
        fetcher: &'f Fetcher<T>,
        mut params: QueryParams,
        checkpoint_dir: &Path,
        partition: Option<&str>,
        resume: bool,
    ) -> Self {
        let signature = compute_signature(&params);
        let path = checkpoint_path(checkpoint_dir, &signature, partition);
        let mut resumed = false;

        if resume {
            match checkpoint::load(&path) {
                Ok(Some(ck)) => match ck.resume_cursor(&signature) {
                    Some(cursor) => {
                        log::info!(
                            "Resuming from {} (cursor {cursor}, saved {})",
                            path.display(),
                            ck.saved_at.format("%Y-%m-%d %H:%M:%S")
                        );
                        params.set_cursor(cursor);
                        resumed = true;
                    }
                    None if ck.signature != signature => {
                        log::warn!(
                            "Ignoring checkpoint {}: stored filter differs from this pass",
                            path.display()
                        );
                    }
                    None => {
                        log::info!(
                            "Checkpoint {} marks a finished pass, starting fresh",
                            path.display()
                        );
                    }
                },
                Ok(None) => log::debug!("No checkpoint at {}", path.display()),
                Err(e) => log::warn!("{e}, starting fresh"),
            }
        }

        Self {
            fetcher,
            params,
            signature,
            checkpoint_path: path,
            resumed,
            pages: 0,
            done: false,
            exhausted: false,
            interrupted: false,
            last_start: None,
            unflushed_from: None,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Whether the pass started from a checkpointed cursor
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// Pages fetched so far, including a terminal empty page
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Whether the stream stopped on a shutdown request
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Cursor of the next request
    pub fn cursor(&self) -> Option<&str> {
        self.params.cursor()
    }

    /// Cursor a restart has to begin from.
    ///
    /// `None` once the pass has reached its end with every row committed.
    pub fn durable_cursor(&self) -> Option<&str> {
        match &self.unflushed_from {
            Some(cursor) => Some(cursor.as_str()),
            None if self.exhausted => None,
            None => self.params.cursor(),
        }
    }

    /// Record that buffered rows reached a shard.
    ///
    /// Rows of every page before the last one handed out are covered; the
    /// last page is covered too when `including_last` (nothing of it is still
    /// buffered). Persists the advanced checkpoint.
    pub fn commit(&mut self, including_last: bool) {
        self.unflushed_from = if including_last {
            None
        } else {
            self.last_start.clone()
        };
        self.save();
    }

    fn save(&self) {
        let cursor = self.durable_cursor().map(str::to_owned);
        let ck = Checkpoint::now(self.signature.clone(), cursor);
        if let Err(e) = checkpoint::save(&self.checkpoint_path, &ck) {
            log::warn!("{e}, continuing without checkpoint");
        }
    }
}

impl<T: Transport> Iterator for PassStream<'_, T> {
    type Item = Result<Vec<Value>, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if is_shutdown_requested() {
            log::warn!("Shutdown requested, stopping before next page");
            self.interrupted = true;
            self.done = true;
            return None;
        }

        let start = self.params.cursor().map(str::to_owned);
        let page = match self.fetcher.fetch(&self.params) {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        self.pages += 1;

        // An empty page ends the pass even if the server still links onward
        let next_cursor = if page.data.is_empty() {
            None
        } else {
            page.next_cursor
        };
        if !page.data.is_empty() {
            if self.unflushed_from.is_none() {
                self.unflushed_from = start.clone();
            }
            self.last_start = start;
        }
        match next_cursor {
            Some(cursor) => self.params.set_cursor(&cursor),
            None => {
                self.done = true;
                self.exhausted = true;
            }
        }
        self.save();
        log::debug!(
            "page {} ({} records), next cursor {:?}",
            self.pages,
            page.data.len(),
            self.params.cursor()
        );

        if page.data.is_empty() {
            None
        } else {
            Some(Ok(page.data))
        }
    }
}
