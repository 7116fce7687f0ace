//! The zone that bucket names and local times are written in.

use crate::error::{CdnLogError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

/// An IANA zone such as `Asia/Shanghai`, or a fixed offset such as `+08:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl LogZone {
    /// The same instant, carrying this zone's offset at that instant.
    pub fn localize<T: TimeZone>(&self, instant: &DateTime<T>) -> DateTime<FixedOffset> {
        match self {
            LogZone::Named(tz) => instant.with_timezone(tz).fixed_offset(),
            LogZone::Fixed(offset) => instant.with_timezone(offset),
        }
    }

    /// Interpret a wall-clock time in this zone.
    ///
    /// In a DST fold the earlier instant wins; a time inside a DST gap never
    /// existed and yields `None`.
    pub fn from_local(&self, local: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            LogZone::Named(tz) => tz
                .from_local_datetime(local)
                .earliest()
                .map(|t| t.fixed_offset()),
            LogZone::Fixed(offset) => offset.from_local_datetime(local).single(),
        }
    }
}

impl FromStr for LogZone {
    type Err = CdnLogError;

    fn from_str(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if let Ok(tz) = s.parse::<Tz>() {
            return Ok(LogZone::Named(tz));
        }
        s.parse::<FixedOffset>()
            .map(LogZone::Fixed)
            .map_err(|_| CdnLogError::Config(format!("invalid timezone {raw:?}")))
    }
}

impl fmt::Display for LogZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogZone::Named(tz) => write!(f, "{}", tz.name()),
            LogZone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}
