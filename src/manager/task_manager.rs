use std::{
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};

use crate::app::args::ExecutorConfig;
use crate::app::console::Console;
use crate::errors::{ExecutorError, Result};
use crate::manager::coordinator::{Coordinator, DispatchToken};
use crate::models::message::Command;
use crate::models::task::{Stream, TaskArena};
use crate::worker::worker::{spawn_printer, spawn_runner};

pub struct TaskManager {
    arena: Arc<TaskArena>,
    coordinator: Arc<Coordinator>,
    console: Arc<Console>,
    printer: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(config: &ExecutorConfig, console: Console) -> Self {
        TaskManager {
            arena: Arc::new(TaskArena::new(config.max_tasks, config.line_capacity)),
            coordinator: Arc::new(Coordinator::new()),
            console: Arc::new(console),
            printer: Mutex::new(None),
        }
    }

    /// Start the printer actor. Must be called once before `execute`.
    pub fn start(&self) -> Result<()> {
        let printer = spawn_printer(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.arena),
            Arc::clone(&self.console),
        )?;
        *self.printer.lock().unwrap_or_else(PoisonError::into_inner) = Some(printer);
        Ok(())
    }

    /// Run one command while holding the command token.
    pub fn execute(&self, command: Command) -> Result<()> {
        let token = self.coordinator.acquire_for_dispatch();
        match command {
            Command::Run(argv) => match self.run_task(&token, argv) {
                Ok(id) => debug!("Task '{}' created.", id),
                Err(ExecutorError::TaskLimit(max)) => {
                    warn!("Task limit of {} reached, run ignored.", max)
                }
                Err(err) => return Err(err),
            },
            Command::Output(id, stream) => self.print_output(&token, id, stream),
            Command::Kill(id) => self.kill_task(&token, id),
            Command::Sleep(duration) => self.sleep(&token, duration),
            Command::Quit => self.quit(&token),
        }
        Ok(())
    }

    fn run_task(&self, _token: &DispatchToken<'_>, argv: Vec<String>) -> Result<usize> {
        let task = self.arena.create()?;
        let runner = spawn_runner(
            Arc::clone(&task),
            argv,
            Arc::clone(&self.coordinator),
            Arc::clone(&self.console),
        )?;
        task.attach_runner(runner);
        Ok(task.id)
    }

    fn print_output(&self, _token: &DispatchToken<'_>, id: usize, stream: Stream) {
        match self.arena.get(id) {
            Some(task) => {
                let line = task.buffer(stream).read_latest();
                self.console.output(id, stream, &line);
            }
            None => debug!("Task '{}' not found, {} query ignored.", id, stream.label()),
        }
    }

    fn kill_task(&self, _token: &DispatchToken<'_>, id: usize) {
        match self.arena.get(id) {
            Some(task) => {
                if task.send_signal(libc::SIGINT) {
                    info!("Sent interrupt to task '{}'.", id);
                }
            }
            None => debug!("Task '{}' not found, kill ignored.", id),
        }
    }

    fn sleep(&self, _token: &DispatchToken<'_>, duration: Duration) {
        debug!("Dispatcher sleeping for {:?}.", duration);
        thread::sleep(duration);
    }

    fn quit(&self, token: &DispatchToken<'_>) {
        info!(
            "Quit requested with {} active task(s).",
            self.coordinator.active_tasks()
        );
        self.coordinator.request_quit(token);
    }

    pub fn is_quit_requested(&self) -> bool {
        self.coordinator.is_quit_requested()
    }

    /// Stop accepting commands, kill every running task and wait until all
    /// of their reports have printed.
    pub fn shutdown(&self) -> Result<()> {
        {
            let token = self.coordinator.acquire_for_dispatch();
            if !self.coordinator.is_quit_requested() {
                self.coordinator.request_quit(&token);
            }
        }

        for task in self.arena.running() {
            if task.send_signal(libc::SIGKILL) {
                debug!("Task '{}' killed at shutdown.", task.id);
            }
        }

        let printer = self
            .printer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(printer) = printer {
            printer
                .join()
                .map_err(|_| ExecutorError::ThreadPanicked("printer".to_string()))?;
        }
        info!("Executor stopped after {} task(s).", self.arena.task_count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

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
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn manager(max_tasks: usize) -> (TaskManager, Capture) {
        let capture = Capture::default();
        let config = ExecutorConfig {
            max_tasks,
            ..ExecutorConfig::default()
        };
        let manager = TaskManager::new(&config, Console::new(capture.clone()));
        manager.start().unwrap();
        (manager, capture)
    }

    #[test]
    fn kill_on_unstarted_task_is_a_no_op() {
        let (manager, capture) = manager(4);
        let task = manager.arena.create().unwrap();
        manager.execute(Command::Kill(task.id)).unwrap();
        manager.execute(Command::Kill(99)).unwrap();
        manager.shutdown().unwrap();
        assert_eq!(capture.text(), "");
    }

    #[test]
    fn output_of_unknown_task_prints_nothing() {
        let (manager, capture) = manager(4);
        manager.execute(Command::Output(3, Stream::Stdout)).unwrap();
        manager.execute(Command::Output(3, Stream::Stderr)).unwrap();
        manager.shutdown().unwrap();
        assert_eq!(capture.text(), "");
    }

    #[test]
    fn output_of_silent_task_is_empty() {
        let (manager, capture) = manager(4);
        let task = manager.arena.create().unwrap();
        manager.execute(Command::Output(task.id, Stream::Stdout)).unwrap();
        manager.shutdown().unwrap();
        assert_eq!(capture.text(), "Task 0 stdout: ''.\n");
    }

    #[test]
    fn sleep_holds_the_dispatcher() {
        let (manager, _capture) = manager(4);
        let started = Instant::now();
        manager
            .execute(Command::Sleep(Duration::from_millis(100)))
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        manager.shutdown().unwrap();
    }

    #[test]
    fn quit_is_remembered() {
        let (manager, _capture) = manager(4);
        assert!(!manager.is_quit_requested());
        manager.execute(Command::Quit).unwrap();
        assert!(manager.is_quit_requested());
        manager.shutdown().unwrap();
    }

    #[test]
    fn runs_beyond_the_limit_are_ignored() {
        let (manager, capture) = manager(1);
        manager.execute(Command::Run(vec!["true".into()])).unwrap();
        manager.execute(Command::Run(vec!["true".into()])).unwrap();
        manager.shutdown().unwrap();

        let text = capture.text();
        assert_eq!(text.matches("started").count(), 1);
        assert_eq!(text.matches("Task 0 ended:").count(), 1);
        assert_eq!(manager.arena.task_count(), 1);
    }

    #[test]
    fn missing_program_reports_status_one() {
        let (manager, capture) = manager(4);
        manager
            .execute(Command::Run(vec!["no-such-program-xyz".into()]))
            .unwrap();
        manager.execute(Command::Kill(0)).unwrap();
        manager.shutdown().unwrap();
        assert_eq!(capture.text(), "Task 0 ended: status 1.\n");
    }
}
