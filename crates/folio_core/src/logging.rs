//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start the `log` backend once per process from a [`LoggingConfig`].
//! - Write rolling files when a directory is configured, stderr otherwise.
//!
//! # Invariants
//! - Repeating init with an equivalent config is a no-op.
//! - Init with a different level or destination is rejected, never applied.
//! - Init never panics.

use crate::config::LoggingConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "folio";

static LOGGING_STATE: OnceCell<ActiveLogging> = OnceCell::new();

/// Where log records end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Files(PathBuf),
}

struct ActiveLogging {
    level: &'static str,
    target: LogTarget,
    _handle: LoggerHandle,
}

/// Starts logging, or confirms the active logger matches `config`.
///
/// # Errors
/// - Unsupported level, or a relative or uncreatable `dir`.
/// - A logger is already active with another level or target.
/// - The flexi_logger backend fails to start.
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    let level = normalize_level(&config.level)?;
    let target = match &config.dir {
        Some(dir) => LogTarget::Files(normalize_log_dir(dir)?),
        None => LogTarget::Stderr,
    };

    let active = LOGGING_STATE.get_or_try_init(|| start_logger(level, target.clone(), config))?;
    if active.target != target {
        return Err(format!(
            "logging already writes to {}; refusing to switch to {}",
            describe(&active.target),
            describe(&target)
        ));
    }
    if active.level != level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{level}`",
            active.level
        ));
    }
    Ok(())
}

/// Active `(level, target)`, or `None` before [`init_logging`] succeeded.
pub fn logging_status() -> Option<(&'static str, LogTarget)> {
    LOGGING_STATE
        .get()
        .map(|active| (active.level, active.target.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(dir: &Path) -> Result<PathBuf, String> {
    if dir.as_os_str().is_empty() {
        return Err("logging.dir cannot be empty".to_string());
    }
    if !dir.is_absolute() {
        return Err(format!(
            "logging.dir must be an absolute path, got `{}`",
            dir.display()
        ));
    }
    Ok(dir.to_path_buf())
}

fn start_logger(
    level: &'static str,
    target: LogTarget,
    config: &LoggingConfig,
) -> Result<ActiveLogging, String> {
    let logger = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?;

    let handle = match &target {
        LogTarget::Stderr => logger.format(flexi_logger::detailed_format).start(),
        LogTarget::Files(dir) => {
            std::fs::create_dir_all(dir).map_err(|err| {
                format!("failed to create log directory `{}`: {err}", dir.display())
            })?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(dir.as_path())
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(config.max_file_bytes),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(config.max_files),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
                .start()
        }
    }
    .map_err(|err| format!("failed to start logger: {err}"))?;

    info!(
        "event=logging_init module=core status=ok level={level} target={} version={}",
        describe(&target),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogging {
        level,
        target,
        _handle: handle,
    })
}

fn describe(target: &LogTarget) -> String {
    match target {
        LogTarget::Stderr => "stderr".to_string(),
        LogTarget::Files(dir) => format!("`{}`", dir.display()),
    }
}
