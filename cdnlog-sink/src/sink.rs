//! Producer side of the sink.
//!
//! [`LogSink`] is the only thing request handlers see. It renders a record,
//! resolves its bucket path and attempts a non-blocking enqueue. A full
//! queue drops the entry; producers never wait on disk I/O.

use crate::bucket::BucketNamer;
use crate::line::render_line;
use crate::metrics::SinkMetrics;
use crate::registry::FileHandleRegistry;
use crate::sweeper::CleanupSweeper;
use crate::writer::WriterLoop;
use cdnlog_core::config::{LocalTimeSuffix, SinkConfig};
use cdnlog_core::{CanonicalLogRecord, CdnLogError};
use chrono::NaiveDate;
use dashmap::DashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

/// One rendered line waiting to be appended. Immutable once built.
#[derive(Debug, Clone)]
pub struct LogEntry {
    content: String,
    path: PathBuf,
}

impl LogEntry {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What happened to a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Enqueued,
    /// Queue full (or writer gone); the entry was discarded.
    Dropped,
    /// Never enqueued: bad start timestamp or day directory unavailable.
    Rejected,
}

/// Cloneable producer handle for the asynchronous file sink.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::Sender<LogEntry>,
    namer: Arc<BucketNamer>,
    suffix: LocalTimeSuffix,
    known_dirs: Arc<KnownDirs>,
    metrics: Arc<SinkMetrics>,
}

/// Day directories already created by this process.
///
/// Shared between producers, which add to it, and the sweeper, which forgets
/// days that can no longer receive records.
#[derive(Debug, Default)]
pub struct KnownDirs {
    dirs: DashSet<PathBuf>,
}

impl KnownDirs {
    /// Create `dir` unless it is already known.
    pub fn ensure(&self, dir: PathBuf) -> io::Result<()> {
        if self.dirs.contains(&dir) {
            return Ok(());
        }
        fs::create_dir_all(&dir)?;
        self.dirs.insert(dir);
        Ok(())
    }

    /// Forget directories for days before `day`. Names that are not a
    /// `YYYYMMDD` date are kept. Returns how many were forgotten.
    pub fn forget_before(&self, day: NaiveDate) -> usize {
        let mut forgotten = 0;
        self.dirs.retain(|dir| {
            let keep = dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| NaiveDate::parse_from_str(n, "%Y%m%d").ok())
                .is_none_or(|d| d >= day);
            if !keep {
                forgotten += 1;
            }
            keep
        });
        forgotten
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

impl LogSink {
    /// Build the sink and its writer.
    ///
    /// The returned [`WriterLoop`] owns the only receiver and the handle
    /// registry; it must be run (see [`WriterLoop::run`] and
    /// [`WriterLoop::spawn_dedicated`]) for anything to reach disk. Once every
    /// `LogSink` clone is dropped the writer drains the queue and exits.
    pub fn new(
        config: &SinkConfig,
        metrics: Arc<SinkMetrics>,
    ) -> Result<(Self, WriterLoop), CdnLogError> {
        config.validate()?;
        let zone = config.zone()?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let registry = Arc::new(FileHandleRegistry::new(Arc::clone(&metrics)));
        let known_dirs = Arc::new(KnownDirs::default());
        let sweeper = CleanupSweeper::new(
            Arc::clone(&registry),
            Arc::clone(&known_dirs),
            zone,
            config.grace_period(),
        );
        let writer = WriterLoop::new(
            rx,
            registry,
            sweeper,
            config.sweep_interval(),
            Arc::clone(&metrics),
        );

        info!(
            root = %config.root_dir.display(),
            capacity = config.queue_capacity,
            zone = %zone,
            suffix = ?config.local_time_suffix,
            "Log sink created"
        );

        let sink = Self {
            tx,
            namer: Arc::new(BucketNamer::new(&config.root_dir, zone)),
            suffix: config.local_time_suffix,
            known_dirs,
            metrics,
        };
        Ok((sink, writer))
    }

    /// Render and enqueue one record. Never blocks.
    pub fn submit(&self, record: &CanonicalLogRecord) -> SubmitOutcome {
        let start = match record.event_start() {
            Ok(start) => start,
            Err(e) => {
                self.metrics.records_rejected.inc();
                warn!(error = %e, host = %record.host, "Rejecting record with unparseable start time");
                return SubmitOutcome::Rejected;
            }
        };

        let bucket = self.namer.bucket(&start, &record.host);
        if let Err(e) = self.known_dirs.ensure(self.namer.dir_path(&bucket)) {
            self.metrics.records_rejected.inc();
            error!(
                error = %e,
                dir = %self.namer.dir_path(&bucket).display(),
                "Failed to create log directory, record lost"
            );
            return SubmitOutcome::Rejected;
        }

        let entry = LogEntry {
            content: render_line(record, self.namer.zone(), self.suffix),
            path: self.namer.file_path(&bucket),
        };

        match self.tx.try_send(entry) {
            Ok(()) => {
                self.metrics.entries_enqueued.inc();
                SubmitOutcome::Enqueued
            }
            Err(TrySendError::Full(entry)) => {
                self.metrics.entries_dropped.inc();
                warn!(file = %bucket.file, path = %entry.path.display(), "Log queue is full, dropping entry");
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Closed(entry)) => {
                self.metrics.entries_dropped.inc();
                error!(path = %entry.path.display(), "Log writer has stopped, dropping entry");
                SubmitOutcome::Dropped
            }
        }
    }

    /// Entries discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.metrics.entries_dropped.get()
    }

    /// Entries currently waiting for the writer.
    pub fn queue_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn namer(&self) -> &BucketNamer {
        &self.namer
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }
}
