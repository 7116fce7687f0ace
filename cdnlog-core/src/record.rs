use crate::error::{CdnLogError, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One CDN access-log record, already mapped from its provider's field names.
///
/// Every string field may be empty; the line codec substitutes a `-`
/// placeholder when rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalLogRecord {
    pub client_ip: String,
    pub origin_ip: String,
    pub origin_port: u16,
    pub host: String,
    pub method: String,
    pub uri: String,
    pub protocol: String,
    /// RFC 3339 instant the edge started handling the request.
    pub start_timestamp: String,
    /// RFC 3339 instant the edge finished; only used for the duration field.
    pub end_timestamp: String,
    pub status: u16,
    pub body_bytes: u64,
    pub total_bytes: u64,
    pub ttfb_ms: u64,
    pub referer: String,
    pub user_agent: String,
    pub forwarded_for: String,
    pub cache_status: String,
    pub trace_id: String,
}

impl CanonicalLogRecord {
    /// Parse the event start instant.
    pub fn event_start(&self) -> Result<DateTime<FixedOffset>> {
        parse_instant(&self.start_timestamp)
    }

    /// End minus start in milliseconds, or `None` if either side does not parse.
    pub fn request_duration_ms(&self) -> Option<i64> {
        let start = parse_instant(&self.start_timestamp).ok()?;
        let end = parse_instant(&self.end_timestamp).ok()?;
        Some((end - start).num_milliseconds())
    }

    /// Origin port implied by a request scheme: 80 for http, 443 for https.
    pub fn port_for_scheme(scheme: &str) -> u16 {
        if scheme.eq_ignore_ascii_case("http") {
            80
        } else if scheme.eq_ignore_ascii_case("https") {
            443
        } else {
            0
        }
    }
}

fn parse_instant(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|source| CdnLogError::InvalidTimestamp {
        value: value.to_string(),
        source,
    })
}
