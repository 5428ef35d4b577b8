//! Structured logging for taskwave, built on `tracing`.
//!
//! Log levels:
//! - ERROR: Fatal engine faults that abort a run
//! - WARN: Failed attempts, escalations and cancellation
//! - INFO: Run, wave and task lifecycle
//! - DEBUG: Scheduling decisions and retry bookkeeping
//! - TRACE: Very detailed traces
//!
//! Output goes to `~/.taskwave/taskwave.log`, truncated at startup.
//! Debug mode is enabled with `init_with_debug(true)` or `TASKWAVE_DEBUG=1`.
//! `TASKWAVE_LOG` takes a bare level such as `trace` or a full filter
//! directive such as `taskwave=trace,petgraph=warn`, and wins over both.

use std::fs::File;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::Result;

static TEST_INIT: Once = Once::new();

/// Log levels for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Initialize logging to ~/.taskwave/taskwave.log
pub fn init() -> Result<PathBuf> {
    init_with_debug(false)
}

/// Initialize logging with explicit debug mode setting.
///
/// Returns the log file path. Calling it again after a subscriber is
/// installed only truncates the file.
pub fn init_with_debug(debug: bool) -> Result<PathBuf> {
    let env_debug = std::env::var("TASKWAVE_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let debug_enabled = debug || env_debug;

    let dir = Config::taskwave_dir()?;
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("taskwave.log");
    // Truncate file on startup
    let file = File::create(&path)?;

    let default_level = if debug_enabled {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let _ = fmt()
        .with_env_filter(filter(default_level))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init();

    Ok(path)
}

/// Initialise tracing for tests, printing through the test harness.
///
/// Enable levels with e.g. `TASKWAVE_LOG=debug`.
pub fn init_for_tests() {
    TEST_INIT.call_once(|| {
        let _ = fmt()
            .with_env_filter(filter(LogLevel::Warn))
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

fn filter(default_level: LogLevel) -> EnvFilter {
    let requested = std::env::var("TASKWAVE_LOG").ok();
    EnvFilter::try_new(directive(requested.as_deref(), default_level))
        .unwrap_or_else(|_| EnvFilter::new(crate_directive(default_level)))
}

/// Filter directive for a `TASKWAVE_LOG` value.
///
/// A bare level applies to this crate only; anything else is passed
/// through as EnvFilter syntax.
fn directive(requested: Option<&str>, default_level: LogLevel) -> String {
    match requested.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => match LogLevel::parse(value) {
            Some(level) => crate_directive(level),
            None => value.to_string(),
        },
        None => crate_directive(default_level),
    }
}

fn crate_directive(level: LogLevel) -> String {
    format!("taskwave={}", level.as_str())
}
