pub mod bucket;
pub mod line;
pub mod metrics;
pub mod prometheus_exporter;
pub mod registry;
pub mod sink;
pub mod sweeper;
pub mod writer;

pub use bucket::{Bucket, BucketNamer};
pub use metrics::SinkMetrics;
pub use registry::FileHandleRegistry;
pub use sink::{KnownDirs, LogEntry, LogSink, SubmitOutcome};
pub use sweeper::CleanupSweeper;
pub use writer::WriterLoop;
