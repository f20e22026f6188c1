//! Command-line arguments and executor configuration.

use clap::{Parser, ValueEnum};

use crate::models::line_buffer::DEFAULT_LINE_CAPACITY;
use crate::models::task::DEFAULT_MAX_TASKS;

/// Command-line arguments for `task_executor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "task_executor",
    version,
    about = "Run programs concurrently, driven by commands read from stdin.",
    long_about = None
)]
pub struct CliArgs {
    /// Maximum number of tasks accepted over the executor's lifetime.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_TASKS)]
    pub max_tasks: usize,

    /// Longest captured output line in bytes; longer lines are truncated.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_LINE_CAPACITY)]
    pub line_capacity: usize,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EXECUTOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub max_tasks: usize,
    pub line_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            line_capacity: DEFAULT_LINE_CAPACITY,
        }
    }
}

impl From<&CliArgs> for ExecutorConfig {
    fn from(args: &CliArgs) -> Self {
        Self {
            max_tasks: args.max_tasks,
            line_capacity: args.line_capacity,
        }
    }
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
