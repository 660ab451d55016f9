mod file_config;

pub use file_config::{FileConfig, RetryConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_BATCH_LIMIT: usize = 1;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Upper bound for backoff and staleness durations (one year).
pub const MAX_DELAY_SECS: u64 = 365 * 24 * 3600;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub tick_interval_ms: u64,
    pub batch_limit: usize,
    pub max_attempts: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            batch_limit: DEFAULT_BATCH_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub worker: WorkerSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let defaults = WorkerSettings::default();
        let retry_file = file.retry.unwrap_or_default();
        let retry = RetrySettings {
            initial_backoff_secs: retry_file
                .initial_backoff_secs
                .unwrap_or(defaults.retry.initial_backoff_secs),
            max_backoff_secs: retry_file
                .max_backoff_secs
                .unwrap_or(defaults.retry.max_backoff_secs),
            backoff_multiplier: retry_file
                .backoff_multiplier
                .unwrap_or(defaults.retry.backoff_multiplier),
        };

        let worker = WorkerSettings {
            tick_interval_ms: file.tick_interval_ms.unwrap_or(cli.tick_interval_ms),
            batch_limit: file.batch_limit.unwrap_or(cli.batch_limit),
            max_attempts: file.max_attempts.unwrap_or(cli.max_attempts),
            stale_running_threshold_secs: file
                .stale_running_threshold_secs
                .unwrap_or(defaults.stale_running_threshold_secs),
            retry,
        };
        worker.validate()?;

        Ok(Self { db_dir, worker })
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }

    pub fn occurrences_db_path(&self) -> PathBuf {
        self.db_dir.join("occurrences.db")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub tick_interval_ms: u64,
    /// Jobs claimed per tick at most.
    pub batch_limit: usize,
    pub max_attempts: u32,
    /// Running jobs claimed longer ago than this are requeued on startup.
    pub stale_running_threshold_secs: u64,
    pub retry: RetrySettings,
}

impl WorkerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than 0");
        }
        if self.batch_limit == 0 {
            bail!("batch_limit must be at least 1");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            bail!(
                "backoff_multiplier must be a finite number of at least 1.0, got {}",
                self.retry.backoff_multiplier
            );
        }
        for (name, secs) in [
            ("initial_backoff_secs", self.retry.initial_backoff_secs),
            ("max_backoff_secs", self.retry.max_backoff_secs),
            ("stale_running_threshold_secs", self.stale_running_threshold_secs),
        ] {
            if secs > MAX_DELAY_SECS {
                bail!("{} must be at most {}, got {}", name, MAX_DELAY_SECS, secs);
            }
        }
        Ok(())
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            batch_limit: DEFAULT_BATCH_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stale_running_threshold_secs: 3600,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 30,
            max_backoff_secs: 3600,
            backoff_multiplier: 2.0,
        }
    }
}
