// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-triggered dispatcher.
//!
//! The coordinator bridges completion events to next-step workflow
//! dispatches through a four-state loop: `idle` until an event arrives,
//! `queuing` while the debounce window coalesces more, `evaluating` to pick
//! at most one workflow per session by priority (user command >
//! failure-retry > natural-next > idle), then `cooldown` before returning
//! to `idle`. Evaluations are serialized; there is one coordinator per
//! daemon.

use crate::error::EngineError;
use crate::session::SessionManager;
use gaffer_core::{Clock, SessionId, SessionStatus, WorkflowKind};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Coordinator loop states (observable for tests and status surfaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Queuing,
    Evaluating,
    Cooldown,
}

/// An explicit user command queued for the next evaluation cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    StartExecution,
    RetryTask { task_id: String },
    Revise { feedback: String },
}

/// Cap on automatic failure retries per session.
const MAX_AUTO_RETRIES: u32 = 1;

struct CoordInner<C: Clock> {
    sessions: SessionManager<C>,
    state: Mutex<CoordinatorState>,
    commands: Mutex<HashMap<SessionId, VecDeque<UserCommand>>>,
    auto_retries: Mutex<HashMap<SessionId, u32>>,
    debounce: Duration,
    cooldown: Duration,
}

/// The coordinator. Clone to hand out submit handles.
pub struct Coordinator<C: Clock> {
    inner: Arc<CoordInner<C>>,
    wake_tx: mpsc::UnboundedSender<()>,
    wake_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl<C: Clock> Coordinator<C> {
    pub fn new(sessions: SessionManager<C>, debounce: Duration, cooldown: Duration) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(CoordInner {
                sessions,
                state: Mutex::new(CoordinatorState::Idle),
                commands: Mutex::new(HashMap::new()),
                auto_retries: Mutex::new(HashMap::new()),
                debounce,
                cooldown,
            }),
            wake_tx,
            wake_rx: Mutex::new(Some(wake_rx)),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.inner.state.lock()
    }

    /// Queue an explicit user command; takes priority over everything in
    /// the next cycle.
    pub fn submit_command(&self, session_id: SessionId, command: UserCommand) {
        self.inner.commands.lock().entry(session_id).or_default().push_back(command);
        self.notify();
    }

    /// Signal that something happened worth evaluating (wired to the bus's
    /// `workflow.completed` / `session.updated` topics by the daemon).
    pub fn notify(&self) {
        let _ = self.wake_tx.send(());
    }

    /// Run the coordinator loop until `shutdown`.
    ///
    /// Callable once; later calls return immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let Some(mut wake_rx) = self.wake_rx.lock().take() else {
            tracing::error!("coordinator loop started twice");
            return;
        };

        loop {
            self.set_state(CoordinatorState::Idle);
            tokio::select! {
                wake = wake_rx.recv() => {
                    if wake.is_none() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => break,
            }

            // Debounce window: let more events coalesce.
            self.set_state(CoordinatorState::Queuing);
            tokio::select! {
                _ = tokio::time::sleep(self.inner.debounce) => {}
                _ = shutdown.cancelled() => break,
            }
            while wake_rx.try_recv().is_ok() {}

            self.set_state(CoordinatorState::Evaluating);
            self.evaluate();

            self.set_state(CoordinatorState::Cooldown);
            tokio::select! {
                _ = tokio::time::sleep(self.inner.cooldown) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        self.set_state(CoordinatorState::Idle);
    }

    fn set_state(&self, state: CoordinatorState) {
        *self.inner.state.lock() = state;
    }

    /// One evaluation cycle: at most one dispatch per session; everything
    /// else stays queued for the next cycle.
    fn evaluate(&self) {
        for session in self.inner.sessions.sessions() {
            match self.next_action(&session.id) {
                Some(action) => {
                    if let Err(e) = self.dispatch_action(&session.id, action) {
                        tracing::warn!(
                            session = %session.id,
                            error = %e,
                            "coordinator dispatch failed"
                        );
                    }
                }
                None => continue,
            }
        }
    }

    /// Pick the highest-priority eligible action for one session.
    fn next_action(&self, session_id: &SessionId) -> Option<Action> {
        let session = self.inner.sessions.get_session(session_id.as_str()).ok()?;
        if session.live_workflow.is_some() {
            return None;
        }

        // 1. Explicit user command.
        if let Some(command) = self
            .inner
            .commands
            .lock()
            .get_mut(session_id)
            .and_then(|queue| queue.pop_front())
        {
            return Some(Action::Command(command));
        }

        // 2. Failure retry, bounded. Only execution failures are resumable;
        // a failed planning run waits for the user.
        if session.status == SessionStatus::Failed {
            if session.current_plan().is_none() {
                return None;
            }
            let mut retries = self.inner.auto_retries.lock();
            let used = retries.entry(*session_id).or_insert(0);
            if *used < MAX_AUTO_RETRIES {
                *used += 1;
                return Some(Action::FailureRetry);
            }
            return None;
        }

        // 3. Natural next step for sessions missing their workflow.
        self.inner.sessions.natural_next(&session).map(Action::Natural)
    }

    fn dispatch_action(&self, session_id: &SessionId, action: Action) -> Result<(), EngineError> {
        let sessions = &self.inner.sessions;
        match action {
            Action::Command(UserCommand::StartExecution) => {
                sessions.start_execution(session_id.as_str()).map(|_| ())
            }
            Action::Command(UserCommand::RetryTask { task_id }) => {
                sessions.retry_task(session_id.as_str(), &task_id).map(|_| ())
            }
            Action::Command(UserCommand::Revise { feedback }) => {
                sessions.revise(session_id.as_str(), &feedback)
            }
            Action::FailureRetry => {
                // Rewind to executing first so the completion transition
                // lands on a legal arrow, then resume from the checkpoint.
                let session = sessions.get_session(session_id.as_str())?;
                if session.status == SessionStatus::Failed {
                    tracing::info!(session = %session_id, "automatic failure retry");
                    sessions.recover_status(session_id, SessionStatus::Executing)?;
                    sessions.dispatch(*session_id, WorkflowKind::Resume, None).map(|_| ())?;
                }
                Ok(())
            }
            Action::Natural(kind) => {
                tracing::info!(session = %session_id, kind = %kind, "natural-next dispatch");
                sessions.dispatch(*session_id, kind, None).map(|_| ())
            }
        }
    }
}

enum Action {
    Command(UserCommand),
    FailureRetry,
    Natural(WorkflowKind),
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
