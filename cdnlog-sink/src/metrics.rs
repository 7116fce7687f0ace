use crate::prometheus_exporter::render_metrics;
use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Sink counters.
///
/// Unlike request metrics these are always live: the drop counter is the
/// only signal producers get when the queue overflows.
pub struct SinkMetrics {
    registry: Registry,
    pub entries_enqueued: IntCounter,
    pub entries_dropped: IntCounter,
    pub records_rejected: IntCounter,
    pub lines_written: IntCounter,
    pub write_errors: IntCounter,
    pub handles_opened: IntCounter,
    pub handles_evicted: IntCounter,
    pub open_handles: IntGauge,
}

impl SinkMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> anyhow::Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, help).namespace("cdnlog"))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let entries_enqueued = counter("sink_entries_enqueued_total", "Entries accepted by the queue")?;
        let entries_dropped = counter("sink_entries_dropped_total", "Entries dropped on a full queue")?;
        let records_rejected = counter(
            "sink_records_rejected_total",
            "Records rejected before enqueue (bad timestamp or directory failure)",
        )?;
        let lines_written = counter("sink_lines_written_total", "Lines appended to disk")?;
        let write_errors = counter("sink_write_errors_total", "Failed appends (handle evicted)")?;
        let handles_opened = counter("sink_handles_opened_total", "File handles opened")?;
        let handles_evicted = counter("sink_handles_evicted_total", "File handles closed and evicted")?;

        let open_handles = IntGauge::with_opts(
            Opts::new("sink_open_handles", "Currently open file handles").namespace("cdnlog"),
        )?;
        registry.register(Box::new(open_handles.clone()))?;

        Ok(Self {
            registry,
            entries_enqueued,
            entries_dropped,
            records_rejected,
            lines_written,
            write_errors,
            handles_opened,
            handles_evicted,
            open_handles,
        })
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        render_metrics(&self.registry)
    }
}
