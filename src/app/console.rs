use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::errors::fatal;
use crate::models::message::Report;
use crate::models::task::Stream;

/// Line-oriented protocol output. Every line is flushed immediately.
pub struct Console {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Console {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn line(&self, text: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(sink, "{text}").and_then(|()| sink.flush()) {
            fatal(err.into());
        }
    }

    pub fn started(&self, task_id: usize, pid: u32) {
        self.line(&format!("Task {task_id} started: pid {pid}."));
    }

    pub fn output(&self, task_id: usize, stream: Stream, text: &str) {
        self.line(&format!("Task {task_id} {}: '{text}'.", stream.label()));
    }

    pub fn ended(&self, report: &Report) {
        self.line(&report.to_string());
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}
