use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use super::task::Stream;

/// A command accepted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Vec<String>),
    Output(usize, Stream),
    Kill(usize),
    Sleep(Duration),
    Quit,
}

impl Command {
    /// Parse a tokenized input line.
    ///
    /// Unknown verbs and malformed arguments yield `None`; the dispatcher
    /// ignores those lines.
    pub fn parse(argv: &[String]) -> Option<Command> {
        let (verb, args) = argv.split_first()?;
        match verb.as_str() {
            "run" if !args.is_empty() => Some(Command::Run(args.to_vec())),
            "out" => parse_id(args).map(|id| Command::Output(id, Stream::Stdout)),
            "err" => parse_id(args).map(|id| Command::Output(id, Stream::Stderr)),
            "kill" => parse_id(args).map(Command::Kill),
            "sleep" => args
                .first()?
                .parse::<u64>()
                .ok()
                .map(|ms| Command::Sleep(Duration::from_millis(ms))),
            "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}

fn parse_id(args: &[String]) -> Option<usize> {
    args.first()?.parse().ok()
}

/// Split an input line on whitespace.
pub fn split(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}

/// How a task's process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    Exited(i32),
    Signalled,
}

impl From<ExitStatus> for ExitDisposition {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitDisposition::Exited(code),
            None => ExitDisposition::Signalled,
        }
    }
}

/// Completion report queued by a finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub task_id: usize,
    pub disposition: ExitDisposition,
}

impl Report {
    pub fn new(task_id: usize, disposition: ExitDisposition) -> Self {
        Self {
            task_id,
            disposition,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.disposition {
            ExitDisposition::Exited(code) => {
                write!(f, "Task {} ended: status {}.", self.task_id, code)
            }
            ExitDisposition::Signalled => write!(f, "Task {} ended: signalled.", self.task_id),
        }
    }
}
