//! Logger bootstrap for the tap.
//!
//! Stdout belongs to the Singer message stream, so log lines go to stderr and,
//! when a log directory is configured, to a timestamped file in it. Only the
//! newest log file for the application is kept.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Logger already initialized: {0}")]
    SetLogger(#[from] log::SetLoggerError),
}

/// Maps a textual level to a filter. Unknown values fall back to `Info`.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" | "critical" | "fatal" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Installs the global logger.
///
/// Returns the path of the log file when `log_dir` is given.
pub fn setup_logging(
    app_name: &str,
    log_dir: Option<&Path>,
    log_level: &str,
) -> Result<Option<PathBuf>, LoggerError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stderr());

    let mut log_path = None;
    if let Some(dir) = log_dir {
        let path = prepare_log_file(app_name, dir)?;
        dispatch = dispatch.chain(fern::log_file(&path)?);
        log_path = Some(path);
    }

    dispatch.apply()?;
    Ok(log_path)
}

/// Creates `log_dir`, removes older log files of `app_name` and returns the
/// path for a new timestamped file.
fn prepare_log_file(app_name: &str, log_dir: &Path) -> Result<PathBuf, LoggerError> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    cleanup_old_logs(app_name, log_dir, 0)?;

    let log_file_name = format!("{}_{}.log", app_name, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    Ok(log_dir.join(log_file_name))
}

/// Keeps the `keep` most recent `<app_name>_*.log` files and deletes the rest.
fn cleanup_old_logs(app_name: &str, log_dir: &Path, keep: usize) -> Result<(), LoggerError> {
    let prefix = format!("{}_", app_name);
    let mut entries: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "log"))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&prefix))
        })
        .collect();

    // Timestamped names sort chronologically; newest first.
    entries.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    for path in entries.iter().skip(keep) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}
