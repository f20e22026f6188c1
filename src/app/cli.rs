use std::io::BufRead;

use log::{debug, info, warn};

use crate::errors::Result;
use crate::manager::task_manager::TaskManager;
use crate::models::line_buffer::read_bounded_line;
use crate::models::message::{split, Command};

/// Longest accepted command line in bytes; the rest of the line is dropped.
pub const MAX_COMMAND_LEN: usize = 512;

/// Read and dispatch commands until end of input or `quit`, then shut down.
///
/// Blank lines, unknown verbs and malformed arguments are ignored. Shutdown
/// also runs when dispatching fails, so running tasks are never orphaned.
pub fn run_cli<R: BufRead>(manager: &TaskManager, input: R) -> Result<()> {
    let dispatched = dispatch_commands(manager, input);
    if let Err(err) = &dispatched {
        warn!("Dispatching stopped: {}", err);
    }
    let shutdown = manager.shutdown();
    dispatched.and(shutdown)
}

fn dispatch_commands<R: BufRead>(manager: &TaskManager, mut input: R) -> Result<()> {
    let mut raw = Vec::new();
    while !manager.is_quit_requested() {
        if read_bounded_line(&mut input, MAX_COMMAND_LEN, &mut raw)? == 0 {
            info!("End of input.");
            break;
        }

        let line = String::from_utf8_lossy(&raw);
        let argv = split(&line);
        if argv.is_empty() {
            continue;
        }
        match Command::parse(&argv) {
            Some(command) => manager.execute(command)?,
            None => debug!("Ignoring command: {}", line.trim_end()),
        }
    }
    Ok(())
}
