//! Logging setup: `log` macros throughout the crate, rendered by a
//! `tracing-subscriber` fmt subscriber (its `tracing-log` bridge picks up
//! `log` records).
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `EXECUTOR_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `warn`
//!
//! Logs go to STDERR; stdout carries the command protocol only.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;

use crate::app::args::LogLevel;
use crate::errors::{ExecutorError, Result};

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var("EXECUTOR_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(LevelFilter::WARN),
    };

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| ExecutorError::Logging(e.to_string()))
}

fn level_from_log_level(lvl: LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<LevelFilter> {
    match s.trim().to_lowercase().as_str() {
        "off" => Some(LevelFilter::OFF),
        "error" => Some(LevelFilter::ERROR),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "debug" => Some(LevelFilter::DEBUG),
        "trace" => Some(LevelFilter::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_levels() {
        assert_eq!(parse_level_str(" Debug "), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level_str("warning"), Some(LevelFilter::WARN));
        assert_eq!(parse_level_str("off"), Some(LevelFilter::OFF));
        assert_eq!(parse_level_str("loud"), None);
    }
}
