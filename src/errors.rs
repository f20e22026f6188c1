//! Crate-wide error type.
//!
//! Everything in here is an environment failure: once one of these shows up
//! the shared task state can no longer be trusted, so callers either
//! propagate it to `main` or hand it to [`fatal`]. Task-level outcomes
//! (non-zero exit codes, signals, unknown ids) never become errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task limit of {0} reached")]
    TaskLimit(usize),

    #[error("failed to reap task {task_id}: {source}")]
    Reap {
        task_id: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("thread '{0}' panicked")]
    ThreadPanicked(String),

    #[error("runner for task {0} exited before reporting its start")]
    Handshake(usize),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Abort the whole executor.
///
/// Used from background threads, which have nobody to propagate to.
pub fn fatal(err: ExecutorError) -> ! {
    eprintln!("task_executor: fatal: {err}");
    std::process::exit(1);
}
