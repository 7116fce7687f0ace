use crate::server::IngestState;
use axum::extract::State;
use axum::response::Json;
use serde_json::{Value, json};
use std::sync::Arc;

pub async fn health_check(State(state): State<Arc<IngestState>>) -> Json<Value> {
    let metrics = state.sink.metrics();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sink": {
            "queue_len": state.sink.queue_len(),
            "dropped": state.sink.dropped(),
            "rejected": metrics.records_rejected.get(),
            "lines_written": metrics.lines_written.get(),
            "write_errors": metrics.write_errors.get(),
            "open_handles": metrics.open_handles.get(),
        },
    }))
}

/// Prometheus text exposition of the sink counters.
pub async fn metrics(State(state): State<Arc<IngestState>>) -> String {
    state.sink.metrics().render()
}
