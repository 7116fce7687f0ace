//! Time-bucket naming.
//!
//! A record lands in `<root>/<YYYYMMDD>/<YYYYMMDDHHmm>-<host>`, where the
//! timestamp is the event instant in the configured zone truncated to the
//! preceding five-minute boundary.

use cdnlog_core::LogZone;
use cdnlog_core::config::BUCKET_WIDTH_SECS;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use std::path::PathBuf;

const BUCKET_MINUTES: u32 = (BUCKET_WIDTH_SECS / 60) as u32;
const STAMP_FORMAT: &str = "%Y%m%d%H%M";
const STAMP_LEN: usize = 12;
const DAY_LEN: usize = 8;

/// Directory and file name for one (bucket start, host) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub dir: String,
    pub file: String,
}

/// Maps event instants to bucket paths under a fixed root and zone.
#[derive(Debug, Clone)]
pub struct BucketNamer {
    root: PathBuf,
    zone: LogZone,
}

impl BucketNamer {
    pub fn new(root: impl Into<PathBuf>, zone: LogZone) -> Self {
        Self {
            root: root.into(),
            zone,
        }
    }

    pub fn zone(&self) -> &LogZone {
        &self.zone
    }

    /// Bucket for an event. Pure; performs no I/O.
    pub fn bucket<Tz: TimeZone>(&self, instant: &DateTime<Tz>, host: &str) -> Bucket {
        let start = self.bucket_start(instant);
        let stamp = start.format(STAMP_FORMAT).to_string();
        let dir = stamp[..DAY_LEN].to_string();
        let file = format!("{stamp}-{}", sanitize_host(host));
        Bucket { dir, file }
    }

    /// The instant converted to the fixed zone and truncated to its bucket.
    pub fn bucket_start<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> DateTime<FixedOffset> {
        let local = self.zone.localize(instant);
        let aligned_minute = local.minute() - local.minute() % BUCKET_MINUTES;
        local
            .with_nanosecond(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_minute(aligned_minute))
            .unwrap_or(local)
    }

    pub fn dir_path(&self, bucket: &Bucket) -> PathBuf {
        self.root.join(&bucket.dir)
    }

    pub fn file_path(&self, bucket: &Bucket) -> PathBuf {
        self.root.join(&bucket.dir).join(&bucket.file)
    }
}

/// Recover the bucket start encoded at the front of a bucket file name.
///
/// Returns `None` when the name is too short or the digits do not form a
/// valid calendar minute.
pub fn parse_bucket_start(file_name: &str, zone: &LogZone) -> Option<DateTime<FixedOffset>> {
    let stamp = file_name.get(..STAMP_LEN)?;
    if !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| stamp[range].parse::<u32>().ok();

    let year = i32::try_from(field(0..4)?).ok()?;
    let naive: NaiveDateTime = NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?
        .and_hms_opt(field(8..10)?, field(10..12)?, 0)?;
    zone.from_local(&naive)
}

/// Keep path separators out of file names.
fn sanitize_host(host: &str) -> String {
    host.replace(['/', '\\'], "_")
}
