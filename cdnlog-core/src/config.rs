use crate::error::{CdnLogError, Result};
use crate::zone::LogZone;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Width of one time bucket. Files are aligned to this boundary.
pub const BUCKET_WIDTH_SECS: u64 = 5 * 60;

/// Top-level receiver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnLogConfig {
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Asynchronous file sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Root directory holding one sub-directory per calendar day.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Capacity of the ingest queue. Entries beyond this are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Zone used for bucketing and local-time rendering: an IANA name such
    /// as `Asia/Shanghai` or a fixed offset such as `+08:00`.
    #[serde(default = "default_timezone", alias = "utc_offset")]
    pub timezone: String,
    /// What follows the bracketed local time in each line.
    #[serde(default)]
    pub local_time_suffix: LocalTimeSuffix,
    /// How long after a bucket starts before its handle may be closed.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    /// Cleanup sweep cadence on the writer task.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Offset written after the bracketed local time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalTimeSuffix {
    /// Wall-clock time in the configured zone followed by a literal `+0000`.
    /// Existing consumers of the log files parse this form.
    #[default]
    Literal,
    /// The zone's real UTC offset at that instant, e.g. `+0800`.
    Zone,
}

/// Ingest HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, `/metrics` is not routed. Sink counters are always kept.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_root_dir() -> PathBuf { PathBuf::from("/var/log/hwcdn/cdnlogfiles/") }
fn default_queue_capacity() -> usize { 20_000 }
fn default_timezone() -> String { "Asia/Shanghai".into() }
fn default_grace_period() -> u64 { 10 * 60 }
fn default_sweep_interval() -> u64 { 60 }
fn default_addr() -> String { "0.0.0.0:9880".into() }
fn default_max_body_bytes() -> usize { 32 << 20 }
fn default_true() -> bool { true }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            queue_capacity: default_queue_capacity(),
            timezone: default_timezone(),
            local_time_suffix: LocalTimeSuffix::default(),
            grace_period_secs: default_grace_period(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl CdnLogConfig {
    /// Load configuration from YAML file + env overrides.
    ///
    /// Environment variables use the `CDNLOG_` prefix and `__` as the
    /// section separator, e.g. `CDNLOG_SINK__ROOT_DIR=/data/logs`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: CdnLogConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("CDNLOG_").split("__"))
            .extract()?;
        config.validate()?;
        tracing::debug!(path = %path.display(), root = %config.sink.root_dir.display(), "Config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sink.validate()
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(CdnLogError::Config("sink.queue_capacity must be > 0".into()));
        }
        if self.grace_period_secs < 2 * BUCKET_WIDTH_SECS {
            return Err(CdnLogError::Config(format!(
                "sink.grace_period_secs must be at least {} (two buckets), got {}",
                2 * BUCKET_WIDTH_SECS,
                self.grace_period_secs
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(CdnLogError::Config("sink.sweep_interval_secs must be > 0".into()));
        }
        self.zone()?;
        Ok(())
    }

    /// The zone all bucketing happens in.
    pub fn zone(&self) -> Result<LogZone> {
        self.timezone.parse()
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
