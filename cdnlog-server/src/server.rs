use crate::handlers;
use cdnlog_core::CdnLogConfig;
use cdnlog_sink::LogSink;
use axum::{
    Router as AxumRouter,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

/// Shared state for the ingest API.
pub struct IngestState {
    pub sink: LogSink,
}

/// Build the Axum router.
///
/// `POST /` takes newline-delimited JSON records, plain or with
/// `Content-Encoding: gzip`; any other encoding gets 415 and any other method
/// on `/` gets 405. The body limit applies to the decompressed size.
/// `/metrics` is only routed when prometheus is enabled.
pub fn build_router(config: &CdnLogConfig, state: Arc<IngestState>) -> AxumRouter {
    let mut router = AxumRouter::new()
        .route("/", post(handlers::ingest::ingest_logs))
        .route("/health", get(handlers::health::health_check));

    if config.observability.prometheus.enabled {
        router = router.route(
            &config.observability.prometheus.path,
            get(handlers::health::metrics),
        );
    }

    router
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(RequestDecompressionLayer::new())
        .with_state(state)
}

/// Serve until `shutdown` resolves. The state, and with it the last producer
/// handle held by the router, is dropped on return.
pub async fn serve(
    config: &CdnLogConfig,
    state: Arc<IngestState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(config, state);

    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    info!(addr = %config.server.addr, "Log receiver listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Log receiver stopped accepting requests");
    Ok(())
}
