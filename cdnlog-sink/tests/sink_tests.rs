//! End-to-end behaviour of the sink: submit records, run the writer to
//! completion, inspect what landed on disk.

use cdnlog_core::CanonicalLogRecord;
use cdnlog_core::config::SinkConfig;
use cdnlog_sink::{LogSink, SinkMetrics, SubmitOutcome, WriterLoop};
use std::fs;
use std::path::Path;
use std::sync::Arc;

// ── Helpers ───────────────────────────────────────────────────

fn build(root: &Path, capacity: usize) -> (LogSink, WriterLoop) {
    let cfg = SinkConfig {
        root_dir: root.to_path_buf(),
        queue_capacity: capacity,
        timezone: "Asia/Shanghai".into(),
        ..SinkConfig::default()
    };
    LogSink::new(&cfg, Arc::new(SinkMetrics::new().unwrap())).unwrap()
}

fn record(host: &str, ts: &str, uri: &str) -> CanonicalLogRecord {
    CanonicalLogRecord {
        host: host.into(),
        start_timestamp: ts.into(),
        uri: uri.into(),
        method: "GET".into(),
        status: 206,
        body_bytes: 1024,
        total_bytes: 1300,
        ..Default::default()
    }
}

/// URI column of each line in a bucket file.
fn uris(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split_whitespace().nth(9).unwrap().to_string())
        .collect()
}

// ── Round trip ────────────────────────────────────────────────

#[tokio::test]
async fn record_lands_in_five_minute_bucket_file() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, writer) = build(dir.path(), 16);

    let outcome = sink.submit(&record("example.com", "2024-03-01T04:02:10Z", "/a"));
    assert_eq!(outcome, SubmitOutcome::Enqueued);
    drop(sink);
    writer.run().await;

    let path = dir.path().join("20240301").join("202403011200-example.com");
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.matches('\n').count(), 1);
    assert!(content.ends_with('\n'));

    let fields: Vec<&str> = content.split_whitespace().collect();
    assert_eq!(fields[0], "LT");
    assert_eq!(fields[1], "-", "empty client ip renders as placeholder");
    assert_eq!(fields[4], "example.com");
    assert_eq!(fields[11], "206");
    assert_eq!(fields[12], "1024");
    assert_eq!(fields[13], "1300");
    assert_eq!(fields[14], "1024");
    assert_eq!(&fields[17..21], ["\"-\"", "\"-\"", "\"-\"", "\"-\""]);
    assert_eq!(&fields[21..], ["-", "-", "1"]);
}

// ── Ordering ──────────────────────────────────────────────────

#[tokio::test]
async fn same_bucket_keeps_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, writer) = build(dir.path(), 1024);

    let stamps = [
        "2024-03-01T04:00:00Z",
        "2024-03-01T04:04:59Z",
        "2024-03-01T04:01:30Z",
        "2024-03-01T13:03:00+09:00",
    ];
    let mut expected = Vec::new();
    for i in 0..200 {
        let uri = format!("/item/{i}");
        sink.submit(&record("example.com", stamps[i % stamps.len()], &uri));
        expected.push(uri);
    }
    drop(sink);
    writer.run().await;

    let path = dir.path().join("20240301").join("202403011200-example.com");
    assert_eq!(uris(&path), expected);
}

#[tokio::test]
async fn hosts_and_windows_split_into_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, writer) = build(dir.path(), 64);

    sink.submit(&record("a.com", "2024-03-01T04:02:10Z", "/a1"));
    sink.submit(&record("b.com", "2024-03-01T04:02:10Z", "/b1"));
    sink.submit(&record("a.com", "2024-03-01T04:07:10Z", "/a2"));
    sink.submit(&record("a.com", "2024-03-01T04:03:10Z", "/a3"));
    // Crosses midnight in UTC+8.
    sink.submit(&record("a.com", "2024-03-01T16:00:00Z", "/a4"));
    drop(sink);
    writer.run().await;

    let day = dir.path().join("20240301");
    assert_eq!(uris(&day.join("202403011200-a.com")), ["/a1", "/a3"]);
    assert_eq!(uris(&day.join("202403011200-b.com")), ["/b1"]);
    assert_eq!(uris(&day.join("202403011205-a.com")), ["/a2"]);
    assert_eq!(
        uris(&dir.path().join("20240302").join("202403020000-a.com")),
        ["/a4"]
    );
}

#[tokio::test]
async fn reopened_file_is_appended_not_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("20240301").join("202403011200-example.com");

    for uri in ["/run1", "/run2"] {
        let (sink, writer) = build(dir.path(), 4);
        sink.submit(&record("example.com", "2024-03-01T04:02:10Z", uri));
        drop(sink);
        writer.run().await;
    }

    assert_eq!(uris(&path), ["/run1", "/run2"]);
}

// ── Overflow ──────────────────────────────────────────────────

#[tokio::test]
async fn overflow_drops_exactly_one_and_keeps_prior_entries() {
    const CAPACITY: usize = 20_000;
    let dir = tempfile::tempdir().unwrap();
    let (sink, writer) = build(dir.path(), CAPACITY);

    for i in 0..CAPACITY {
        let outcome = sink.submit(&record("example.com", "2024-03-01T04:02:10Z", &format!("/{i}")));
        assert_eq!(outcome, SubmitOutcome::Enqueued);
    }
    assert_eq!(sink.dropped(), 0);

    let extra = sink.submit(&record("example.com", "2024-03-01T04:02:10Z", "/overflow"));
    assert_eq!(extra, SubmitOutcome::Dropped);
    assert_eq!(sink.dropped(), 1);
    assert_eq!(sink.queue_len(), CAPACITY);

    let metrics = Arc::clone(sink.metrics());
    drop(sink);
    writer.run().await;

    let path = dir.path().join("20240301").join("202403011200-example.com");
    let written = uris(&path);
    assert_eq!(written.len(), CAPACITY);
    for (i, uri) in written.iter().enumerate() {
        assert_eq!(uri, &format!("/{i}"));
    }
    assert_eq!(metrics.lines_written.get(), CAPACITY as u64);
    assert_eq!(metrics.entries_dropped.get(), 1);
}

#[tokio::test]
async fn submit_returns_immediately_while_writer_is_idle() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _writer) = build(dir.path(), 8);
    let r = record("example.com", "2024-03-01T04:02:10Z", "/x");

    let started = std::time::Instant::now();
    for _ in 0..10_000 {
        sink.submit(&r);
    }
    assert_eq!(sink.dropped(), 10_000 - 8);
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
}

// ── Sweep tick ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn writer_sweeps_aged_out_handles_on_tick() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, writer) = build(dir.path(), 8);
    let registry = Arc::clone(writer.registry());

    // A bucket from 2020 is long past the grace window.
    sink.submit(&record("old.com", "2020-01-01T00:00:00Z", "/old"));
    let task = tokio::spawn(writer.run());

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(registry.len(), 1);

    tokio::time::sleep(std::time::Duration::from_secs(61)).await;
    assert!(registry.is_empty());

    drop(sink);
    task.await.unwrap();
}
