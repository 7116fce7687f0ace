// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  cdnlog: CDN access-log receiver
//
//  Ingest:  axum on tokio, one non-blocking enqueue per record
//  Disk:    single writer thread, 5-minute per-host bucket files
//  Config:  YAML file + CDNLOG_* env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use cdnlog_core::CdnLogConfig;
use cdnlog_server::server::{self, IngestState};
use cdnlog_sink::{LogSink, SinkMetrics};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "cdnlog", version, about = "CDN access-log receiver")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/cdnlog/cdnlog.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Root directory for bucket files; overrides `sink.root_dir`.
    log_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "cdnlog starting");

    #[cfg(unix)]
    raise_fd_limit();

    // ── Config ──
    let mut config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        CdnLogConfig::load(&cli.config)?
    } else {
        info!("No config file found, using defaults");
        CdnLogConfig::default()
    };
    if let Some(root) = cli.log_root {
        config.sink.root_dir = root;
    }
    config.validate()?;
    info!(root = %config.sink.root_dir.display(), "Log root");

    // ── Sink + dedicated writer ──
    let metrics = Arc::new(SinkMetrics::new()?);
    let (sink, writer) = LogSink::new(&config.sink, metrics)?;
    let writer_handle = writer.spawn_dedicated()?;

    // ── Ingest API ──
    let state = Arc::new(IngestState { sink });
    let served = server::serve(&config, state, shutdown_signal()).await;
    if let Err(e) = &served {
        error!(error = %e, "Ingest server failed");
    }

    // The router held the last producer; the writer now drains and exits.
    info!("Waiting for log writer to drain");
    match tokio::task::spawn_blocking(move || writer_handle.join()).await {
        Ok(Ok(())) => info!("cdnlog stopped"),
        Ok(Err(_)) => error!("Log writer thread panicked"),
        Err(e) => error!(error = %e, "Failed to join log writer"),
    }
    served
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, stopping...");
}

/// Soft limit we ask for on the number of open files.
#[cfg(unix)]
const FD_LIMIT_TARGET: libc::rlim_t = 65_536;

/// The writer keeps one append handle per (host, five-minute bucket) until the
/// sweeper retires it, so a few thousand active hosts across the grace window
/// already exceed the common 1024 default. Lift the soft limit as far as the
/// hard limit allows.
#[cfg(unix)]
fn raise_fd_limit() {
    let mut rl = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    // SAFETY: `rl` is a valid, writable rlimit for the duration of the call.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rl) } != 0 {
        tracing::warn!(error = %std::io::Error::last_os_error(), "Cannot read open-file limit");
        return;
    }

    let Some(target) = fd_limit_target(rl.rlim_cur, rl.rlim_max) else {
        tracing::debug!(limit = rl.rlim_cur, "Open-file limit already sufficient");
        return;
    };
    let wanted = libc::rlimit { rlim_cur: target, rlim_max: rl.rlim_max };
    // SAFETY: `wanted` is a valid rlimit and the soft value does not exceed the hard one.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &wanted) } != 0 {
        tracing::warn!(
            tried = target,
            error = %std::io::Error::last_os_error(),
            "Cannot raise open-file limit; bucket files may hit EMFILE"
        );
    } else {
        tracing::info!(from = rl.rlim_cur, to = target, "Open-file limit raised");
    }
}

/// New soft limit, or `None` when the current one is already high enough.
#[cfg(unix)]
fn fd_limit_target(current: libc::rlim_t, hard: libc::rlim_t) -> Option<libc::rlim_t> {
    let ceiling = if hard == libc::RLIM_INFINITY { FD_LIMIT_TARGET } else { hard.min(FD_LIMIT_TARGET) };
    (current < ceiling).then_some(ceiling)
}
