//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Settings for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Classification calls allowed per `classify_window`.
    pub classify_permits: u32,
    /// Window over which `classify_permits` refill.
    pub classify_window: Duration,
    /// Largest number of permits the limiter may hold while idle.
    pub classify_burst: u32,
    /// Hard cap on items dispatched in a single run.
    pub max_items_per_run: usize,
    /// Number of pipelines allowed to run concurrently.
    pub worker_pool_size: usize,
    /// How long `stop()` waits for in-flight pipelines before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            classify_permits: 3,
            classify_window: Duration::from_secs(60),
            classify_burst: 1,
            max_items_per_run: 100,
            worker_pool_size: 8,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl IngestConfig {
    /// Build config from `INGEST_*` environment variables, falling back to
    /// the defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            classify_permits: env_or("INGEST_CLASSIFY_PERMITS", defaults.classify_permits)?,
            classify_window: Duration::from_secs(env_or(
                "INGEST_CLASSIFY_WINDOW_SECS",
                defaults.classify_window.as_secs(),
            )?),
            classify_burst: env_or("INGEST_CLASSIFY_BURST", defaults.classify_burst)?,
            max_items_per_run: env_or("INGEST_MAX_ITEMS", defaults.max_items_per_run)?,
            worker_pool_size: env_or("INGEST_WORKERS", defaults.worker_pool_size)?,
            shutdown_grace: Duration::from_secs(env_or(
                "INGEST_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |key: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        };
        if self.classify_permits == 0 {
            return Err(zero("INGEST_CLASSIFY_PERMITS"));
        }
        if self.classify_window.is_zero() {
            return Err(zero("INGEST_CLASSIFY_WINDOW_SECS"));
        }
        if self.classify_burst == 0 {
            return Err(zero("INGEST_CLASSIFY_BURST"));
        }
        if self.worker_pool_size == 0 {
            return Err(zero("INGEST_WORKERS"));
        }
        Ok(())
    }
}

/// Settings for the binary: HTTP port and database location.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    /// libSQL database file; `None` keeps records in memory.
    pub db_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Read `JOBQUEUE_HTTP_PORT` (default 8080) and `JOBQUEUE_DB_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            http_port: env_or("JOBQUEUE_HTTP_PORT", 8080)?,
            db_path: std::env::var("JOBQUEUE_DB_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Parse an environment variable, or return `default` when it is unset.
pub(crate) fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        Err(_) => Ok(default),
    }
}
