//! The single consumer.
//!
//! Every disk write in the sink happens here, one entry at a time, so
//! appends to any file are totally ordered without per-file locks. The sweep
//! tick runs on the same task and never overlaps a write.
//!
//! A stalled filesystem call blocks all later writes. That is the cost of
//! having exactly one writer.

use crate::metrics::SinkMetrics;
use crate::registry::FileHandleRegistry;
use crate::sink::LogEntry;
use crate::sweeper::CleanupSweeper;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

pub struct WriterLoop {
    rx: mpsc::Receiver<LogEntry>,
    registry: Arc<FileHandleRegistry>,
    sweeper: CleanupSweeper,
    sweep_interval: Duration,
    metrics: Arc<SinkMetrics>,
}

impl WriterLoop {
    pub(crate) fn new(
        rx: mpsc::Receiver<LogEntry>,
        registry: Arc<FileHandleRegistry>,
        sweeper: CleanupSweeper,
        sweep_interval: Duration,
        metrics: Arc<SinkMetrics>,
    ) -> Self {
        Self {
            rx,
            registry,
            sweeper,
            sweep_interval,
            metrics,
        }
    }

    /// Read-only view of the handle cache, for diagnostics.
    pub fn registry(&self) -> &Arc<FileHandleRegistry> {
        &self.registry
    }

    /// Drain the queue until every producer is gone, then close all handles.
    pub async fn run(mut self) {
        info!(sweep_interval = ?self.sweep_interval, "Log writer started");

        let mut sweep_tick = interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_entry = self.rx.recv() => match maybe_entry {
                    Some(entry) => write_entry(&self.registry, &self.metrics, &entry),
                    None => break,
                },
                _ = sweep_tick.tick() => {
                    self.sweeper.sweep();
                }
            }
        }

        let closed = self.registry.close_all();
        info!(closed, "Log writer stopped, all files closed");
    }

    /// Run the loop on its own OS thread with a current-thread runtime, so
    /// blocking file I/O never occupies a worker of the caller's runtime.
    pub fn spawn_dedicated(self) -> io::Result<JoinHandle<()>> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        std::thread::Builder::new()
            .name("cdnlog-writer".to_string())
            .spawn(move || rt.block_on(self.run()))
    }

    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }
}

/// Append one entry. On failure the handle is discarded; the next entry for
/// the same path opens a fresh one.
pub(crate) fn write_entry(registry: &FileHandleRegistry, metrics: &SinkMetrics, entry: &LogEntry) {
    let path = entry.path();
    let written = {
        let mut handle = match registry.resolve_or_open(path) {
            Ok(handle) => handle,
            Err(e) => {
                metrics.write_errors.inc();
                error!(error = %e, path = %path.display(), "Failed to open log file");
                return;
            }
        };
        handle.write_all(entry.content().as_bytes())
    };

    match written {
        Ok(()) => metrics.lines_written.inc(),
        Err(e) => {
            metrics.write_errors.inc();
            warn!(error = %e, path = %path.display(), "Failed to write log line, closing file");
            registry.evict(path);
        }
    }
}
