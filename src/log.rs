use crate::errors::{DeskError, DeskErrorType, Result};
use crate::locations::get_log_dir;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, Registry};

const LOG_RETENTION_DAYS: i64 = 30;

fn internal(message: String) -> DeskError {
    DeskError::new(DeskErrorType::InternalError, message)
}

pub(crate) fn init_logging(
    storage_dir: &Path,
    debug: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_file = get_log_location(storage_dir)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    // The subscriber should be an append-only file

    let formatter = BunyanFormattingLayer::new("deskide".into(), non_blocking);
    let console = debug.then(|| tracing_subscriber::fmt::layer());

    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatter)
        .with(console);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| internal(format!("Failed to install log subscriber: {}", e)))?;
    // warp and hyper log through the `log` crate
    tracing_log::LogTracer::init()
        .map_err(|e| internal(format!("Failed to capture log records: {}", e)))?;

    Ok(guard)
}

fn get_log_location(storage_dir: &Path) -> Result<PathBuf> {
    let log_dir = get_log_dir(storage_dir)?;
    let timestamp = Utc::now().format("%Y-%m-%d-%H-%M-%S");
    let log_file = log_dir.join(format!("deskide-{}.log", timestamp));
    clean_logfiles(&log_dir)?;
    Ok(log_file)
}

fn clean_logfiles(log_dir: &Path) -> Result<()> {
    // Logfiles from more than 30 days ago are deleted
    for file in std::fs::read_dir(log_dir)? {
        let file = file?;
        let modified = file.metadata()?.modified()?;
        let modified: chrono::DateTime<Utc> = chrono::DateTime::from(modified);
        let age = Utc::now().signed_duration_since(modified);
        if age.num_days() > LOG_RETENTION_DAYS {
            std::fs::remove_file(file.path())?;
        }
    }
    Ok(())
}
