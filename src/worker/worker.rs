use std::{
    io::{self, BufReader, Read},
    process::{Child, Command, Stdio},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, Sender};
use log::{debug, info, warn};

use crate::app::console::Console;
use crate::errors::{fatal, ExecutorError, Result};
use crate::manager::coordinator::Coordinator;
use crate::models::{
    line_buffer::{read_bounded_line, LineBuffer},
    message::{ExitDisposition, Report},
    task::{Stream, Task, TaskArena},
};

/// Exit status reported for a program that could not be executed.
pub const EXEC_FAILURE_STATUS: i32 = 1;

/// Start the runner thread for `task` and wait until it is counted as active.
///
/// By the time this returns the pid is recorded and the started line has
/// been printed, or the program turned out not to be executable and the task
/// is about to report `EXEC_FAILURE_STATUS`. The returned handle is reaped by
/// the printer after the task's report.
pub fn spawn_runner(
    task: Arc<Task>,
    argv: Vec<String>,
    coordinator: Arc<Coordinator>,
    console: Arc<Console>,
) -> Result<JoinHandle<()>> {
    let task_id = task.id;
    let (started_tx, started_rx) = bounded::<Result<Option<u32>>>(1);

    let handle = thread::Builder::new()
        .name(format!("task-{task_id}"))
        .spawn(move || {
            if let Err(err) = run_task(&task, &argv, &coordinator, &console, started_tx) {
                fatal(err);
            }
        })?;

    match started_rx.recv() {
        Ok(Ok(pid)) => {
            debug!("Task '{}' handshake complete, pid {:?}.", task_id, pid);
            Ok(handle)
        }
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err)
        }
        Err(_) => {
            let _ = handle.join();
            Err(ExecutorError::Handshake(task_id))
        }
    }
}

fn run_task(
    task: &Arc<Task>,
    argv: &[String],
    coordinator: &Coordinator,
    console: &Console,
    started_tx: Sender<Result<Option<u32>>>,
) -> Result<()> {
    let mut child = match spawn_child(argv) {
        Ok(child) => child,
        Err(ExecutorError::Spawn { program, source }) if is_exec_failure(&source) => {
            warn!("Task '{}' cannot execute '{}': {}", task.id, program, source);
            coordinator.task_started();
            task.mark_exited();
            let _ = started_tx.send(Ok(None));
            drop(started_tx);
            let disposition = ExitDisposition::Exited(EXEC_FAILURE_STATUS);
            coordinator.request_report(Report::new(task.id, disposition));
            return Ok(());
        }
        Err(err) => {
            // The dispatcher decides what to do with a failed spawn.
            let _ = started_tx.send(Err(err));
            return Ok(());
        }
    };

    let pid = child.id();
    task.set_pid(pid);
    console.started(task.id, pid);
    coordinator.task_started();
    info!("Task '{}' started: {:?} (pid {}).", task.id, argv, pid);
    let _ = started_tx.send(Ok(Some(pid)));
    drop(started_tx);

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(ExecutorError::Io(io::Error::other("child pipes missing")));
    };
    let readers = [
        spawn_reader(task, Stream::Stdout, stdout)?,
        spawn_reader(task, Stream::Stderr, stderr)?,
    ];
    for reader in readers {
        let name = reader.thread().name().unwrap_or("reader").to_string();
        reader
            .join()
            .map_err(|_| ExecutorError::ThreadPanicked(name))??;
    }

    let disposition = wait_child(task, &mut child)?;
    info!("Task '{}' exited: {:?}.", task.id, disposition);

    coordinator.request_report(Report::new(task.id, disposition));
    Ok(())
}

fn spawn_child(argv: &[String]) -> Result<Child> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ExecutorError::Io(io::Error::other("empty command line")))?;

    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExecutorError::Spawn {
            program: program.clone(),
            source,
        })
}

/// The program itself is missing or not executable, as opposed to the
/// executor being unable to create processes at all.
fn is_exec_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

/// Wait for `child` to exit, then reap it with signalling locked out.
///
/// Until the reap the exited child is a zombie, so its pid cannot be reused
/// while `kill` may still target it.
fn wait_child(task: &Task, child: &mut Child) -> Result<ExitDisposition> {
    let reap_error = |source| ExecutorError::Reap {
        task_id: task.id,
        source,
    };
    wait_for_exit(child.id()).map_err(reap_error)?;
    task.reap_with(|| child.wait())
        .map(ExitDisposition::from)
        .map_err(reap_error)
}

/// Block until `pid` has exited without reaping it.
fn wait_for_exit(pid: u32) -> io::Result<()> {
    loop {
        // SAFETY: siginfo_t is plain data; waitid only writes into it.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid, writable siginfo_t.
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn spawn_reader<R>(task: &Arc<Task>, stream: Stream, pipe: R) -> Result<JoinHandle<io::Result<()>>>
where
    R: Read + Send + 'static,
{
    let task = Arc::clone(task);
    let handle = thread::Builder::new()
        .name(format!("task-{}-{}", task.id, stream.label()))
        .spawn(move || capture_stream(pipe, task.buffer(stream)))?;
    Ok(handle)
}

/// Publish every line of `pipe` into `buffer` until the pipe closes.
///
/// At most the buffer's capacity is kept per line. A last line without a
/// trailing newline is still published.
pub fn capture_stream<R: Read>(pipe: R, buffer: &LineBuffer) -> io::Result<()> {
    let mut reader = BufReader::new(pipe);
    let mut raw = Vec::new();
    while read_bounded_line(&mut reader, buffer.capacity(), &mut raw)? > 0 {
        buffer.write_line(&String::from_utf8_lossy(&raw));
    }
    Ok(())
}

/// Start the printer actor.
///
/// It prints queued completion reports one at a time and reaps the runner
/// thread each report came from, until quit is requested and no task is
/// active anymore.
pub fn spawn_printer(
    coordinator: Arc<Coordinator>,
    arena: Arc<TaskArena>,
    console: Arc<Console>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("printer".to_string())
        .spawn(move || {
            while let Some(report) = coordinator.next_report() {
                if let Err(err) = reap_runner(&arena, report.task_id) {
                    fatal(err);
                }
                console.ended(&report);
                coordinator.report_printed();
            }
            debug!("Printer stopped.");
        })?;
    Ok(handle)
}

fn reap_runner(arena: &TaskArena, task_id: usize) -> Result<()> {
    let Some(runner) = arena.get(task_id).and_then(|task| task.take_runner()) else {
        warn!("Task '{}' has no runner to reap.", task_id);
        return Ok(());
    };
    runner
        .join()
        .map_err(|_| ExecutorError::ThreadPanicked(format!("task-{task_id}")))
}
