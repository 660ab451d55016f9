use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use series_expander::config::{
    self, DEFAULT_BATCH_LIMIT, DEFAULT_MAX_ATTEMPTS, DEFAULT_TICK_INTERVAL_MS,
};
use series_expander::job_queue::{JobQueueStore, JobStatus, SqliteJobQueueStore};
use series_expander::metrics;
use series_expander::occurrence_store::SqliteOccurrenceStore;
use series_expander::worker::WorkerLoop;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing the database files (jobs.db, occurrences.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Milliseconds between two polls of the job queue.
    #[clap(long, default_value_t = DEFAULT_TICK_INTERVAL_MS)]
    pub tick_interval_ms: u64,

    /// Maximum number of jobs claimed per tick.
    #[clap(long, default_value_t = DEFAULT_BATCH_LIMIT)]
    pub batch_limit: usize,

    /// Number of claims after which a failing job is given up.
    #[clap(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            tick_interval_ms: args.tick_interval_ms,
            batch_limit: args.batch_limit,
            max_attempts: args.max_attempts,
        }
    }
}

/// Resolves when `signal` fires. If the signal cannot be listened for, the
/// worker keeps running until the process is killed.
async fn wait_for_shutdown_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to listen for Ctrl+C, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!(
        "series-worker {}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  retry: {:?}", app_config.worker.retry);

    metrics::init_metrics();

    info!("Opening job queue at {:?}", app_config.jobs_db_path());
    let jobs = Arc::new(SqliteJobQueueStore::new(app_config.jobs_db_path())?);
    info!(
        "Opening occurrence store at {:?}",
        app_config.occurrences_db_path()
    );
    let occurrences = Arc::new(SqliteOccurrenceStore::new(
        app_config.occurrences_db_path(),
    )?);

    match jobs.count_by_status(JobStatus::Queued) {
        Ok(count) => info!("{} job(s) waiting in the queue", count),
        Err(e) => error!("Failed to count queued jobs: {:#}", e),
    }

    let worker = Arc::new(WorkerLoop::new(
        jobs,
        occurrences,
        app_config.worker.clone(),
    ));

    let shutdown_token = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(shutdown_token.clone()));

    wait_for_shutdown_signal(tokio::signal::ctrl_c()).await;
    info!("Received Ctrl+C, initiating graceful shutdown");
    shutdown_token.cancel();

    if let Err(e) = worker_handle.await {
        error!("Worker task failed: {}", e);
    }

    match metrics::gather_text() {
        Ok(text) => debug!("Final metrics:\n{}", text),
        Err(e) => error!("Failed to encode metrics: {:#}", e),
    }

    Ok(())
}
