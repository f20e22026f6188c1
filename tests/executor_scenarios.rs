mod common;

use std::io::{self, BufReader, Cursor, Read};
use std::time::{Duration, Instant};

use crate::common::{run_input, run_script, without_pids};

/// Input that fails after its scripted part has been read.
struct BrokenPipe;

impl Read for BrokenPipe {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

#[test]
fn shorter_task_reports_first() {
    let lines = run_script("run sleep 1\nrun sleep 0.1\nsleep 1500\n");
    assert_eq!(
        without_pids(&lines),
        vec![
            "Task 0 started: pid _.",
            "Task 1 started: pid _.",
            "Task 1 ended: status 0.",
            "Task 0 ended: status 0.",
        ]
    );
}

#[test]
fn output_before_any_line_is_empty() {
    let lines = run_script("run sleep 5\nout 0\nerr 0\n");
    assert_eq!(
        without_pids(&lines),
        vec![
            "Task 0 started: pid _.",
            "Task 0 stdout: ''.",
            "Task 0 stderr: ''.",
            "Task 0 ended: signalled.",
        ]
    );
}

#[test]
fn captures_latest_stdout_line() {
    let lines = run_script("run printf first\\nsecond\\n\nsleep 300\nout 0\nerr 0\n");
    assert_eq!(
        without_pids(&lines),
        vec![
            "Task 0 started: pid _.",
            "Task 0 ended: status 0.",
            "Task 0 stdout: 'second'.",
            "Task 0 stderr: ''.",
        ]
    );
}

#[test]
fn captures_stderr_and_exit_code() {
    let lines = run_script("run ls /definitely/not/here\nsleep 300\nerr 0\n");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("Task 0 ended: status "));
    assert_ne!(lines[1], "Task 0 ended: status 0.");
    assert!(lines[2].starts_with("Task 0 stderr: '"));
    assert!(lines[2].contains("/definitely/not/here"));
}

#[test]
fn kill_interrupts_a_running_task() {
    let lines = run_script("run sleep 10\nkill 0\nsleep 300\n");
    assert_eq!(
        without_pids(&lines),
        vec!["Task 0 started: pid _.", "Task 0 ended: signalled."]
    );
}

#[test]
fn unknown_ids_and_verbs_are_ignored() {
    let lines = run_script("out 4\nerr 4\nkill 4\nlaunch rockets\n\nrun\nsleep\n");
    assert!(lines.is_empty(), "unexpected output: {lines:?}");
}

#[test]
fn reports_never_interleave_with_a_sleeping_dispatcher() {
    // Both tasks finish while the dispatcher sleeps; their reports must wait
    // for the sleep and then drain before the `out` runs.
    let lines = run_script("run sleep 0.3\nrun sleep 0.1\nsleep 600\nout 0\n");
    assert_eq!(
        without_pids(&lines),
        vec![
            "Task 0 started: pid _.",
            "Task 1 started: pid _.",
            "Task 1 ended: status 0.",
            "Task 0 ended: status 0.",
            "Task 0 stdout: ''.",
        ]
    );
}

#[test]
fn quit_waits_for_active_tasks_to_report() {
    let started = Instant::now();
    let lines = run_script("run sleep 10\nrun sleep 10\nquit\nrun echo never\n");
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(lines.len(), 4, "unexpected output: {lines:?}");
    assert!(lines[0].starts_with("Task 0 started: pid "));
    assert!(lines[1].starts_with("Task 1 started: pid "));
    let mut ended = lines[2..].to_vec();
    ended.sort();
    assert_eq!(
        ended,
        vec!["Task 0 ended: signalled.", "Task 1 ended: signalled."]
    );
}

#[test]
fn quit_with_no_tasks_returns_immediately() {
    assert!(run_script("quit\nrun echo never\n").is_empty());
}

#[test]
fn missing_program_reports_and_executor_keeps_going() {
    let lines = run_script(
        "run sleep 5\nrun no-such-program-xyz\nsleep 100\nrun echo x\nsleep 300\nout 2\n",
    );
    assert_eq!(
        without_pids(&lines),
        vec![
            "Task 0 started: pid _.",
            "Task 1 ended: status 1.",
            "Task 2 started: pid _.",
            "Task 2 ended: status 0.",
            "Task 2 stdout: 'x'.",
            "Task 0 ended: signalled.",
        ]
    );
}

#[test]
fn input_error_still_reaps_running_tasks() {
    let input = BufReader::new(Cursor::new("run sleep 10\n").chain(BrokenPipe));
    let started = Instant::now();
    let (result, lines) = run_input(input);

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        without_pids(&lines),
        vec!["Task 0 started: pid _.", "Task 0 ended: signalled."]
    );
}

#[test]
fn overlong_command_line_does_not_swallow_the_next_one() {
    let script = format!("{}\nrun echo ok\nsleep 300\nout 0\n", "x".repeat(100_000));
    let lines = run_script(&script);
    assert_eq!(
        without_pids(&lines),
        vec![
            "Task 0 started: pid _.",
            "Task 0 ended: status 0.",
            "Task 0 stdout: 'ok'.",
        ]
    );
}
