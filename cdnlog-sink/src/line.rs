//! Text rendering of a canonical record.
//!
//! Layout (space separated, one record per line):
//!
//! ```text
//! LT client origin port host [local time] epoch_ms "METHOD URI PROTO" status
//!    body total body ttfb duration "referer" "user-agent" "xff" "-" cache trace 1
//! ```
//!
//! Downstream analysis tooling depends on this exact order.

use cdnlog_core::config::LocalTimeSuffix;
use cdnlog_core::{CanonicalLogRecord, LogZone};

/// Leading record-type token.
const RECORD_TYPE: &str = "LT";
/// Trailing flag: this line was produced by the edge nearest the client.
const EDGE_FLAG: &str = "1";
const PLACEHOLDER: &str = "-";
/// Wall-clock time with the `+0000` suffix existing parsers expect.
const LOCAL_TIME_LITERAL: &str = "[%d/%b/%Y:%H:%M:%S +0000]";
const LOCAL_TIME_ZONED: &str = "[%d/%b/%Y:%H:%M:%S %z]";

/// Render one record as a newline-terminated log line.
///
/// Never fails. If the start timestamp does not parse, the local-time field
/// renders as `-` and both the epoch and duration fields as `0`.
pub fn render_line(record: &CanonicalLogRecord, zone: &LogZone, suffix: LocalTimeSuffix) -> String {
    let start = record.event_start().ok().map(|t| zone.localize(&t));
    let local_format = match suffix {
        LocalTimeSuffix::Literal => LOCAL_TIME_LITERAL,
        LocalTimeSuffix::Zone => LOCAL_TIME_ZONED,
    };
    let local_time = start
        .map(|t| t.format(local_format).to_string())
        .unwrap_or_default();
    let epoch_ms = start.map(|t| t.timestamp_millis()).unwrap_or(0);
    let duration_ms = record.request_duration_ms().unwrap_or(0);

    let mut line = String::with_capacity(256);
    let mut num = itoa::Buffer::new();

    line.push_str(RECORD_TYPE);
    bare(&mut line, &record.client_ip);
    bare(&mut line, &record.origin_ip);
    bare(&mut line, num.format(record.origin_port));
    bare(&mut line, &record.host);
    bare(&mut line, &local_time);
    bare(&mut line, num.format(epoch_ms));

    line.push_str(" \"");
    push_value(&mut line, &record.method);
    line.push(' ');
    push_value(&mut line, &record.uri);
    line.push(' ');
    push_value(&mut line, &record.protocol);
    line.push('"');

    bare(&mut line, num.format(record.status));
    bare(&mut line, num.format(record.body_bytes));
    bare(&mut line, num.format(record.total_bytes));
    bare(&mut line, num.format(record.body_bytes));
    bare(&mut line, num.format(record.ttfb_ms));
    bare(&mut line, num.format(duration_ms));

    quoted(&mut line, &record.referer);
    quoted(&mut line, &record.user_agent);
    quoted(&mut line, &record.forwarded_for);
    // Range header is not collected.
    quoted(&mut line, PLACEHOLDER);

    bare(&mut line, &record.cache_status);
    bare(&mut line, &record.trace_id);
    bare(&mut line, EDGE_FLAG);

    line.push('\n');
    line
}

fn bare(line: &mut String, value: &str) {
    line.push(' ');
    push_value(line, value);
}

fn quoted(line: &mut String, value: &str) {
    line.push_str(" \"");
    push_value(line, value);
    line.push('"');
}

/// Append `value`, or the placeholder when empty. Embedded line breaks are
/// flattened so a record always occupies exactly one line.
fn push_value(line: &mut String, value: &str) {
    if value.is_empty() {
        line.push_str(PLACEHOLDER);
    } else if value.contains(['\n', '\r']) {
        line.extend(value.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }));
    } else {
        line.push_str(value);
    }
}
