use crate::server::IngestState;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use cdnlog_core::CanonicalLogRecord;
use cdnlog_sink::SubmitOutcome;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-request tally returned to the pusher.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: usize,
    pub dropped: usize,
    pub rejected: usize,
    pub invalid: usize,
}

/// `POST /`: one JSON record per line.
///
/// Always answers 200 once the body is read: bad lines are skipped and
/// counted, and overflow is the sink's concern, not the pusher's.
pub async fn ingest_logs(State(state): State<Arc<IngestState>>, body: Bytes) -> Json<IngestSummary> {
    let mut summary = IngestSummary::default();

    for raw in body.split(|b| *b == b'\n') {
        let line = raw.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let record: CanonicalLogRecord = match serde_json::from_slice(line) {
            Ok(record) => record,
            Err(e) => {
                summary.invalid += 1;
                warn!(error = %e, line = %String::from_utf8_lossy(line), "Skipping invalid JSON record");
                continue;
            }
        };

        match state.sink.submit(&record) {
            SubmitOutcome::Enqueued => summary.accepted += 1,
            SubmitOutcome::Dropped => summary.dropped += 1,
            SubmitOutcome::Rejected => summary.rejected += 1,
        }
    }

    debug!(
        accepted = summary.accepted,
        dropped = summary.dropped,
        rejected = summary.rejected,
        invalid = summary.invalid,
        "Ingest batch processed"
    );
    Json(summary)
}
