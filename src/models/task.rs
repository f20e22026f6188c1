use std::io;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use std::thread::JoinHandle;

use log::debug;

use crate::errors::{ExecutorError, Result};
use crate::models::line_buffer::LineBuffer;

pub const DEFAULT_MAX_TASKS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn label(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// One externally-run program instance.
///
/// Records outlive the process they describe: they are dropped together with
/// the arena at executor shutdown, so queries about finished tasks resolve.
#[derive(Debug)]
pub struct Task {
    pub id: usize,
    pid: OnceLock<u32>,
    /// Set once the process has been reaped. Held while signalling and while
    /// reaping, so a signal never reaches a recycled pid.
    exited: Mutex<bool>,
    stdout: LineBuffer,
    stderr: LineBuffer,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl Task {
    pub fn new(id: usize, line_capacity: usize) -> Self {
        Self {
            id,
            pid: OnceLock::new(),
            exited: Mutex::new(false),
            stdout: LineBuffer::with_capacity(line_capacity),
            stderr: LineBuffer::with_capacity(line_capacity),
            runner: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    pub fn set_pid(&self, pid: u32) {
        if self.pid.set(pid).is_err() {
            debug!("Task '{}' already has a pid, ignoring {}.", self.id, pid);
        }
    }

    fn lock_exited(&self) -> MutexGuard<'_, bool> {
        self.exited.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Started and not yet reaped.
    pub fn is_running(&self) -> bool {
        self.pid().is_some() && !*self.lock_exited()
    }

    pub fn mark_exited(&self) {
        *self.lock_exited() = true;
    }

    /// Run `reap` (the call that frees the pid) and mark the task exited,
    /// with signalling locked out for the whole time.
    pub fn reap_with<T>(&self, reap: impl FnOnce() -> T) -> T {
        let mut exited = self.lock_exited();
        let outcome = reap();
        *exited = true;
        outcome
    }

    pub fn buffer(&self, stream: Stream) -> &LineBuffer {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }

    pub fn attach_runner(&self, handle: JoinHandle<()>) {
        *self.runner.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn take_runner(&self) -> Option<JoinHandle<()>> {
        self.runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Deliver `signal` to the task's process if it is still running.
    ///
    /// Returns `false` when there was nothing to signal: the task has not
    /// started yet or its process has already been reaped.
    pub fn send_signal(&self, signal: libc::c_int) -> bool {
        let exited = self.lock_exited();
        let Some(pid) = self.pid().filter(|_| !*exited) else {
            debug!("Task '{}' is not running, signal {} dropped.", self.id, signal);
            return false;
        };
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
        if rc != 0 {
            debug!(
                "Signal {} to task '{}' (pid {}) failed: {}",
                signal,
                self.id,
                pid,
                io::Error::last_os_error()
            );
        }
        rc == 0
    }
}

/// Append-only store of task records indexed by sequential id.
#[derive(Debug)]
pub struct TaskArena {
    tasks: RwLock<Vec<Arc<Task>>>,
    max_tasks: usize,
    line_capacity: usize,
}

impl TaskArena {
    pub fn new(max_tasks: usize, line_capacity: usize) -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            max_tasks,
            line_capacity,
        }
    }

    /// Allocate the record for the next task id.
    pub fn create(&self) -> Result<Arc<Task>> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        if tasks.len() >= self.max_tasks {
            return Err(ExecutorError::TaskLimit(self.max_tasks));
        }
        let task = Arc::new(Task::new(tasks.len(), self.line_capacity));
        tasks.push(Arc::clone(&task));
        Ok(task)
    }

    pub fn get(&self, id: usize) -> Option<Arc<Task>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn running(&self) -> Vec<Arc<Task>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|task| task.is_running())
            .cloned()
            .collect()
    }
}
