pub mod app;
pub mod errors;
pub mod logging;
pub mod manager;
pub mod models;
pub mod worker;

use std::io;

use log::info;

use crate::app::args::{CliArgs, ExecutorConfig};
use crate::app::cli::run_cli;
use crate::app::console::Console;
use crate::errors::Result;
use crate::manager::task_manager::TaskManager;

/// High-level entry point used by `main.rs`: serve commands from stdin
/// until end of input or `quit`.
pub fn run(args: &CliArgs) -> Result<()> {
    let config = ExecutorConfig::from(args);
    info!(
        "Executor starting (max {} tasks, {} byte lines).",
        config.max_tasks, config.line_capacity
    );

    let manager = TaskManager::new(&config, Console::stdout());
    manager.start()?;

    run_cli(&manager, io::stdin().lock())
}
