//! Completion reporting protocol.
//!
//! A single command token is held either by the dispatcher (for exactly one
//! command) or by the reporters (for as long as any finished task is queued to
//! report). Finished tasks take a FIFO ticket and bump the join counter; the
//! first one in an empty queue claims the token on behalf of the whole queue.
//! Each reporter in ticket order writes its report into the single pending
//! slot and hands it to the printer, which prints it and advances the queue.
//! When the queue drains, the printer gives the token back to the dispatcher.
//!
//! Queued reporters always win over a dispatcher that asks for the token
//! later, so an unbroken stream of commands cannot starve completions.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use crate::models::message::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenHolder {
    Free,
    Dispatcher,
    Reporters,
}

#[derive(Debug)]
struct ProtocolState {
    token: TokenHolder,
    join_count: usize,
    next_ticket: u64,
    now_serving: u64,
    pending: Option<Report>,
    active_tasks: usize,
    quit_requested: bool,
}

impl ProtocolState {
    fn shutting_down(&self) -> bool {
        self.quit_requested && self.active_tasks == 0
    }
}

#[derive(Debug)]
pub struct Coordinator {
    state: Mutex<ProtocolState>,
    /// Dispatcher and first reporter waiting for the token.
    token_cv: Condvar,
    /// Queued reporters waiting for their ticket to be served.
    turn_cv: Condvar,
    /// Printer waiting for a pending report or shutdown.
    printer_cv: Condvar,
}

/// Proof that the dispatcher holds the command token. Released on drop.
#[derive(Debug)]
pub struct DispatchToken<'a> {
    coordinator: &'a Coordinator,
}

impl Drop for DispatchToken<'_> {
    fn drop(&mut self) {
        self.coordinator.release_dispatch();
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProtocolState {
                token: TokenHolder::Free,
                join_count: 0,
                next_ticket: 0,
                now_serving: 0,
                pending: None,
                active_tasks: 0,
                quit_requested: false,
            }),
            token_cv: Condvar::new(),
            turn_cv: Condvar::new(),
            printer_cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProtocolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the dispatcher may process one command.
    pub fn acquire_for_dispatch(&self) -> DispatchToken<'_> {
        let mut state = self
            .token_cv
            .wait_while(self.lock(), |s| {
                s.token != TokenHolder::Free || s.join_count > 0
            })
            .unwrap_or_else(PoisonError::into_inner);
        state.token = TokenHolder::Dispatcher;
        trace!("dispatcher holds the command token");
        DispatchToken { coordinator: self }
    }

    fn release_dispatch(&self) {
        let mut state = self.lock();
        debug_assert_eq!(state.token, TokenHolder::Dispatcher);
        state.token = TokenHolder::Free;
        drop(state);
        trace!("dispatcher released the command token");
        self.token_cv.notify_all();
    }

    /// Count a newly started task as active.
    pub fn task_started(&self) {
        self.lock().active_tasks += 1;
    }

    /// Queue a finished task's report and block until it is handed to the
    /// printer. Called exactly once per task.
    pub fn request_report(&self, report: Report) {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.join_count += 1;
        debug!(
            "Task '{}' queued to report (ticket {}, {} queued).",
            report.task_id, ticket, state.join_count
        );

        if state.join_count == 1 {
            state = self
                .token_cv
                .wait_while(state, |s| s.token != TokenHolder::Free)
                .unwrap_or_else(PoisonError::into_inner);
            state.token = TokenHolder::Reporters;
            trace!("task '{}' claimed the command token for reporting", report.task_id);
        }

        state = self
            .turn_cv
            .wait_while(state, |s| {
                s.token != TokenHolder::Reporters || s.now_serving != ticket || s.pending.is_some()
            })
            .unwrap_or_else(PoisonError::into_inner);

        state.pending = Some(report);
        drop(state);
        self.printer_cv.notify_one();
    }

    /// Printer side: wait for the next report to print.
    ///
    /// Returns `None` once quit has been requested and no task is active.
    pub fn next_report(&self) -> Option<Report> {
        let mut state = self
            .printer_cv
            .wait_while(self.lock(), |s| s.pending.is_none() && !s.shutting_down())
            .unwrap_or_else(PoisonError::into_inner);
        state.pending.take()
    }

    /// Printer side: the report returned by `next_report` has been printed.
    pub fn report_printed(&self) {
        let mut state = self.lock();
        debug_assert_eq!(state.token, TokenHolder::Reporters);
        state.active_tasks = state.active_tasks.saturating_sub(1);
        state.now_serving += 1;
        state.join_count -= 1;
        let drained = state.join_count == 0;
        if drained {
            state.token = TokenHolder::Free;
        }
        drop(state);

        if drained {
            trace!("report queue drained, command token released");
            self.token_cv.notify_all();
        } else {
            self.turn_cv.notify_all();
        }
    }

    /// Mark shutdown requested. The printer stops once no task is active.
    pub fn request_quit(&self, _token: &DispatchToken<'_>) {
        self.lock().quit_requested = true;
        debug!("quit requested");
        self.printer_cv.notify_all();
    }

    pub fn is_quit_requested(&self) -> bool {
        self.lock().quit_requested
    }

    pub fn active_tasks(&self) -> usize {
        self.lock().active_tasks
    }

    pub fn queued_reports(&self) -> usize {
        self.lock().join_count
    }
}
