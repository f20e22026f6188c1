use std::io::{self, BufRead, Cursor, Write};
use std::sync::{Arc, Mutex};

use task_executor::app::args::ExecutorConfig;
use task_executor::app::cli::run_cli;
use task_executor::app::console::Console;
use task_executor::errors::Result;
use task_executor::manager::task_manager::TaskManager;

/// Writer that collects console output for assertions.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

/// Feed `input` to a fresh executor; returns its result and printed lines.
pub fn run_input<R: BufRead>(input: R) -> (Result<()>, Vec<String>) {
    let capture = Capture::default();
    let manager = TaskManager::new(&ExecutorConfig::default(), Console::new(capture.clone()));
    manager.start().unwrap();
    let result = run_cli(&manager, input);
    (result, capture.lines())
}

/// Feed `script` to a fresh executor and return every printed line.
pub fn run_script(script: &str) -> Vec<String> {
    let (result, lines) = run_input(Cursor::new(script.to_owned()));
    result.unwrap();
    lines
}

/// Drop the pid from `Task <id> started: pid <pid>.` lines.
pub fn without_pids(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| match line.split_once(": pid ") {
            Some((head, _)) if line.ends_with('.') => format!("{head}: pid _."),
            _ => line.clone(),
        })
        .collect()
}
