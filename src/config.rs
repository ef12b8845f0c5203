use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineConfig;

/// Server settings, read from `CAMPD_*` environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub pending_ttl: Duration,
    pub sweep_interval: Duration,
    pub admission_timeout: Duration,
    pub archive_retention: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            password: "campd".into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            pending_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(30),
            admission_timeout: Duration::from_millis(2000),
            archive_retention: Duration::from_secs(7 * 86_400),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing or malformed values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let parsed = |key: &str| -> Option<u64> { parse(&lookup, key) };
        Self {
            port: parse(&lookup, "CAMPD_PORT").unwrap_or(d.port),
            bind: lookup("CAMPD_BIND").unwrap_or(d.bind),
            data_dir: lookup("CAMPD_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            password: lookup("CAMPD_PASSWORD").unwrap_or(d.password),
            max_connections: parse(&lookup, "CAMPD_MAX_CONNECTIONS").unwrap_or(d.max_connections),
            compact_threshold: parsed("CAMPD_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            metrics_port: parse(&lookup, "CAMPD_METRICS_PORT"),
            pending_ttl: parsed("CAMPD_PENDING_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.pending_ttl),
            sweep_interval: parsed("CAMPD_SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(d.sweep_interval),
            admission_timeout: parsed("CAMPD_ADMISSION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.admission_timeout),
            archive_retention: parsed("CAMPD_ARCHIVE_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.archive_retention),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("campd.wal")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            pending_ttl_ms: self.pending_ttl.as_millis() as i64,
            admission_timeout: self.admission_timeout,
            archive_retention_ms: self.archive_retention.as_millis() as i64,
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring malformed {key}={raw:?}");
            None
        }
    }
}
