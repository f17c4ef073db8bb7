//! Process-wide logging bootstrap and panic capture.
//!
//! # Responsibility
//! - Initialize the `log` backend exactly once per process, writing either
//!   rolling files or stderr.
//! - Log summarized panic payloads, and summarize payloads for startup
//!   failures.
//!
//! # Invariants
//! - Re-initialization with the same level and target is idempotent.
//! - Re-initialization with a different level or target is rejected.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "ignis";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

struct LoggingState {
    level: LevelFilter,
    log_dir: Option<PathBuf>,
    _logger: LoggerHandle,
}

/// Initializes logging at `level`.
///
/// `log_dir = Some(dir)` writes size-rotated files into `dir`; `None` writes
/// to stderr.
///
/// # Errors
/// - `level` is not a `log` level name (`off`, `error` .. `trace`).
/// - `log_dir` is empty, relative, or cannot be created.
/// - Logging is already active with a different level or target.
pub fn init_logging(level: &str, log_dir: Option<&str>) -> Result<(), String> {
    let level = parse_level(level)?;
    let log_dir = log_dir.map(absolute_dir).transpose()?;

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, String> {
        let logger = start_logger(level, log_dir.as_deref())?;
        PANIC_HOOK.get_or_init(install_panic_hook);
        info!(
            "event=logging_init module=logging status=ok level={} target={} version={}",
            level,
            describe_target(log_dir.as_deref()),
            env!("CARGO_PKG_VERSION")
        );
        Ok(LoggingState {
            level,
            log_dir: log_dir.clone(),
            _logger: logger,
        })
    })?;

    if state.log_dir != log_dir || state.level != level {
        return Err(format!(
            "logging already initialized ({} at {}); refusing to switch to {} at {}",
            state.level,
            describe_target(state.log_dir.as_deref()),
            level,
            describe_target(log_dir.as_deref())
        ));
    }
    Ok(())
}

/// Returns `(level, log_dir)` when logging is active.
pub fn logging_status() -> Option<(LevelFilter, Option<PathBuf>)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_dir.clone()))
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Single-line, length-capped text of a panic payload.
pub fn summarize_panic_payload(payload: &(dyn Any + Send)) -> String {
    let text = match payload.downcast_ref::<&str>() {
        Some(message) => *message,
        None => payload
            .downcast_ref::<String>()
            .map_or("non-string panic payload", String::as_str),
    };

    let mut summary: String = text
        .chars()
        .take(MAX_PANIC_PAYLOAD_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if text.chars().nth(MAX_PANIC_PAYLOAD_CHARS).is_some() {
        summary.push_str("...");
    }
    summary
}

fn parse_level(level: &str) -> Result<LevelFilter, String> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| format!("unsupported log level `{}`", level.trim()))
}

fn absolute_dir(log_dir: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(log_dir.trim());
    if path.as_os_str().is_empty() {
        Err("log_dir cannot be empty".to_string())
    } else if path.is_relative() {
        Err(format!("log_dir must be absolute, got `{}`", path.display()))
    } else {
        Ok(path)
    }
}

fn start_logger(level: LevelFilter, log_dir: Option<&Path>) -> Result<LoggerHandle, String> {
    let logger = Logger::try_with_str(level.to_string().to_ascii_lowercase())
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?;

    let logger = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|err| {
                format!("failed to create log directory `{}`: {err}", dir.display())
            })?;
            logger
                .log_to_file(FileSpec::default().directory(dir).basename(LOG_FILE_BASENAME))
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
        }
        None => logger
            .log_to_stderr()
            .format_for_stderr(flexi_logger::default_format),
    };

    logger
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))
}

fn describe_target(log_dir: Option<&Path>) -> String {
    log_dir.map_or_else(|| "stderr".to_string(), |dir| dir.display().to_string())
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map_or_else(
            || "unknown".to_string(),
            |loc| format!("{}:{}", loc.file(), loc.line()),
        );
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            summarize_panic_payload(info.payload())
        );
        previous(info);
    }));
}
