//! Cache of open append-mode file handles keyed by bucket path.
//!
//! Only the writer task mutates the registry; the map is still internally
//! synchronized so the sweeper and diagnostics can take snapshots safely.

use crate::metrics::SinkMetrics;
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const FILE_MODE: u32 = 0o644;

pub struct FileHandleRegistry {
    handles: DashMap<PathBuf, File>,
    metrics: Arc<SinkMetrics>,
}

impl FileHandleRegistry {
    pub fn new(metrics: Arc<SinkMetrics>) -> Self {
        Self {
            handles: DashMap::new(),
            metrics,
        }
    }

    /// Cached handle for `path`, opening it in append mode if absent.
    ///
    /// The returned guard locks the map shard; drop it before calling
    /// [`evict`](Self::evict) on the same path.
    pub fn resolve_or_open(&self, path: &Path) -> io::Result<RefMut<'_, PathBuf, File>> {
        if let Some(handle) = self.handles.get_mut(path) {
            return Ok(handle);
        }
        self.handles
            .entry(path.to_path_buf())
            .or_try_insert_with(|| -> io::Result<File> {
                let file = open_append(path)?;
                self.metrics.handles_opened.inc();
                self.metrics.open_handles.inc();
                debug!(path = %path.display(), "Opened log file");
                Ok(file)
            })
    }

    /// Close and forget the handle for `path`. Returns whether one was open.
    pub fn evict(&self, path: &Path) -> bool {
        match self.handles.remove(path) {
            Some((path, file)) => {
                drop(file);
                self.metrics.handles_evicted.inc();
                self.metrics.open_handles.dec();
                debug!(path = %path.display(), "Closed log file");
                true
            }
            None => false,
        }
    }

    /// Paths with a live handle at the time of the call.
    ///
    /// Returned as owned keys so callers can evict while walking the list
    /// without holding shard locks.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.handles.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Close every handle. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|path| self.evict(path))
            .count()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.handles.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Place an arbitrary handle in the cache, bypassing `open_append`.
    #[cfg(test)]
    pub(crate) fn install(&self, path: PathBuf, file: File) {
        if self.handles.insert(path, file).is_none() {
            self.metrics.open_handles.inc();
        }
    }
}

/// Open `path` for appending, creating it and its parents if needed.
/// Existing content is never truncated.
fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    options.open(path)
}
