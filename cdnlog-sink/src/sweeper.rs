use crate::bucket::parse_bucket_start;
use crate::registry::FileHandleRegistry;
use crate::sink::KnownDirs;
use cdnlog_core::LogZone;
use chrono::{DateTime, Days, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Closes handles whose bucket can no longer receive records.
///
/// A bucket is closed only once more than the grace window has passed since
/// its start, which is at least two bucket widths. Late records for the
/// current and previous bucket therefore always find an open handle.
///
/// Each pass also forgets day directories older than yesterday, so the set
/// of known directories stays bounded.
pub struct CleanupSweeper {
    registry: Arc<FileHandleRegistry>,
    known_dirs: Arc<KnownDirs>,
    zone: LogZone,
    grace: Duration,
}

impl CleanupSweeper {
    pub fn new(
        registry: Arc<FileHandleRegistry>,
        known_dirs: Arc<KnownDirs>,
        zone: LogZone,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            known_dirs,
            zone,
            grace,
        }
    }

    /// Sweep against the wall clock. Returns the number of handles closed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut closed = 0;

        for path in self.registry.snapshot() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "Log file name is not valid UTF-8, leaving open");
                continue;
            };
            let Some(bucket_start) = parse_bucket_start(name, &self.zone) else {
                warn!(path = %path.display(), "Cannot parse bucket time from file name, leaving open");
                continue;
            };

            // Negative ages (buckets in the future) fail to convert and are kept.
            let age = (now - bucket_start.with_timezone(&Utc)).to_std().ok();
            match age {
                Some(age) if age > self.grace => {
                    if self.registry.evict(&path) {
                        closed += 1;
                        info!(file = name, age_secs = age.as_secs(), "Closed aged-out log file");
                    }
                }
                _ => {
                    debug!(file = name, age = ?age, "Log file still within grace window");
                }
            }
        }

        if let Some(yesterday) = self.zone.localize(&now).date_naive().checked_sub_days(Days::new(1)) {
            let forgotten = self.known_dirs.forget_before(yesterday);
            if forgotten > 0 {
                debug!(forgotten, known = self.known_dirs.len(), "Forgot old day directories");
            }
        }

        if closed > 0 {
            info!(closed, open = self.registry.len(), "Cleanup sweep finished");
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SinkMetrics;
    use std::path::Path;

    const GRACE: Duration = Duration::from_secs(600);

    fn utc8() -> LogZone {
        "+08:00".parse().unwrap()
    }

    fn sweeper(registry: &Arc<FileHandleRegistry>, zone: LogZone) -> CleanupSweeper {
        CleanupSweeper::new(Arc::clone(registry), Arc::default(), zone, GRACE)
    }

    fn setup(dir: &Path, names: &[&str]) -> (Arc<FileHandleRegistry>, CleanupSweeper) {
        let registry = Arc::new(FileHandleRegistry::new(Arc::new(SinkMetrics::new().unwrap())));
        for name in names {
            registry.resolve_or_open(&dir.join(name)).unwrap();
        }
        let sweeper = sweeper(&registry, utc8());
        (registry, sweeper)
    }

    fn utc(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn aged_out_bucket_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        // Bucket 12:00 (+08:00) == 04:00Z.
        let (registry, sweeper) = setup(dir.path(), &["202403011200-example.com"]);

        assert_eq!(sweeper.sweep_at(utc("2024-03-01T04:10:01Z")), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn exactly_at_grace_boundary_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, sweeper) = setup(dir.path(), &["202403011200-example.com"]);

        assert_eq!(sweeper.sweep_at(utc("2024-03-01T04:10:00Z")), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn current_and_previous_buckets_survive() {
        let dir = tempfile::tempdir().unwrap();
        // now = 12:09:59 local; current bucket 12:05, previous 12:00.
        let (registry, sweeper) = setup(
            dir.path(),
            &["202403011205-a.com", "202403011200-a.com", "202403011155-a.com"],
        );

        assert_eq!(sweeper.sweep_at(utc("2024-03-01T04:09:59Z")), 1);
        assert!(registry.contains(&dir.path().join("202403011205-a.com")));
        assert!(registry.contains(&dir.path().join("202403011200-a.com")));
        assert!(!registry.contains(&dir.path().join("202403011155-a.com")));
    }

    #[test]
    fn future_buckets_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, sweeper) = setup(dir.path(), &["202403011300-example.com"]);
        assert_eq!(sweeper.sweep_at(utc("2024-03-01T04:00:00Z")), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unparseable_names_are_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, sweeper) = setup(dir.path(), &["garbage", "2024030112xx-host"]);
        assert_eq!(sweeper.sweep_at(utc("2030-01-01T00:00:00Z")), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn bucket_time_is_read_in_configured_zone() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = setup(dir.path(), &["202403011200-example.com"]);
        // Read as UTC the bucket would be eight hours younger and survive.
        let utc_sweeper = sweeper(&registry, "UTC".parse().unwrap());
        assert_eq!(utc_sweeper.sweep_at(utc("2024-03-01T04:30:00Z")), 0);

        let local_sweeper = sweeper(&registry, "Asia/Shanghai".parse().unwrap());
        assert_eq!(local_sweeper.sweep_at(utc("2024-03-01T04:30:00Z")), 1);
    }

    #[test]
    fn sweep_forgets_day_directories_older_than_yesterday() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FileHandleRegistry::new(Arc::new(SinkMetrics::new().unwrap())));
        let known = Arc::new(KnownDirs::default());
        for day in ["20240228", "20240229", "20240301"] {
            known.ensure(dir.path().join(day)).unwrap();
        }
        let sweeper = CleanupSweeper::new(Arc::clone(&registry), Arc::clone(&known), utc8(), GRACE);

        // 2024-02-29T20:00Z is already March 1st at +08:00.
        sweeper.sweep_at(utc("2024-02-29T20:00:00Z"));
        assert_eq!(known.len(), 2);
        assert!(!known.contains(&dir.path().join("20240228")));
        assert!(known.contains(&dir.path().join("20240229")));
    }
}
