// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle management.
//!
//! Sessions are the goal; workflows are the mechanism. The manager owns
//! every status transition, dispatches the workflow matching each lifecycle
//! step, folds workflow completions back into session state, and recovers
//! non-terminal sessions after a daemon restart.
//!
//! Plan convention: planning and revision graphs deliver the new plan text
//! on their end node's `plan` input; the manager versions it into the
//! session directory.

use crate::context::ExecutionContext;
use crate::deps::EngineDeps;
use crate::error::EngineError;
use crate::interpreter::{RunOptions, WorkflowEngine, WorkflowResult};
use gaffer_core::{
    Clock, Event, PlanVersion, Session, SessionId, SessionStatus, Value, WorkflowId,
    WorkflowInstance, WorkflowKind, WorkflowStatus,
};
use gaffer_wire::{SessionSummary, StateSnapshot, WorkflowSummary};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Control handle for one live workflow.
struct RunHandle {
    cancel: CancellationToken,
    pause: watch::Sender<bool>,
}

struct SmInner<C: Clock> {
    deps: Arc<EngineDeps<C>>,
    engine: WorkflowEngine<C>,
    live: Mutex<HashMap<WorkflowId, RunHandle>>,
    /// Instances for live and recently finished workflows.
    instances: Mutex<HashMap<WorkflowId, WorkflowInstance>>,
}

/// The session manager. Cloneable handle; clones share state.
pub struct SessionManager<C: Clock> {
    inner: Arc<SmInner<C>>,
}

impl<C: Clock> Clone for SessionManager<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> SessionManager<C> {
    pub fn new(deps: Arc<EngineDeps<C>>) -> Self {
        Self {
            inner: Arc::new(SmInner {
                engine: WorkflowEngine::new(Arc::clone(&deps)),
                deps,
                live: Mutex::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn deps(&self) -> &EngineDeps<C> {
        &self.inner.deps
    }

    // ------------------------------------------------------------- lookup

    pub fn get_session(&self, id: &str) -> Result<Session, EngineError> {
        self.deps()
            .store
            .get_session(&SessionId::from_string(id))
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.deps().store.sessions()
    }

    pub fn workflow(&self, id: &str) -> Option<WorkflowInstance> {
        self.inner.instances.lock().get(&WorkflowId::from_string(id)).cloned()
    }

    /// Read plan text (current version when `version` is `None`).
    pub fn read_plan(&self, id: &str, version: Option<u32>) -> Result<String, EngineError> {
        let session = self.get_session(id)?;
        let version = match version {
            Some(version) => version,
            None => {
                session
                    .current_plan()
                    .ok_or_else(|| {
                        EngineError::SessionNotFound(format!("session {id} has no plan yet"))
                    })?
                    .version
            }
        };
        Ok(self.deps().store.read_plan(&session.id, version)?)
    }

    /// Full UI-facing snapshot.
    pub fn snapshot(&self, uptime_ms: u64) -> StateSnapshot {
        let sessions = self
            .sessions()
            .into_iter()
            .map(|s| SessionSummary {
                id: s.id.to_string(),
                requirement: s.requirement.clone(),
                status: s.status,
                plan_version: s.current_plan().map(|p| p.version),
                created_at_ms: s.created_at_ms,
                updated_at_ms: s.updated_at_ms,
                live_workflow: s.live_workflow.map(|w| w.to_string()),
            })
            .collect();
        let workflows = self
            .inner
            .instances
            .lock()
            .values()
            .map(|w| WorkflowSummary {
                id: w.id.to_string(),
                session_id: w.session_id.to_string(),
                graph: w.graph.clone(),
                kind: w.kind,
                status: w.status,
                started_at_ms: w.started_at_ms,
                ended_at_ms: w.ended_at_ms,
            })
            .collect();
        StateSnapshot {
            sessions,
            pool: self.deps().pool.status(),
            workflows,
            uptime_ms,
        }
    }

    // ---------------------------------------------------------- lifecycle

    /// Create a session in `planning` and dispatch the planning workflow.
    pub fn create_session(
        &self,
        requirement: impl Into<String>,
        docs: Vec<PathBuf>,
    ) -> Result<SessionId, EngineError> {
        let requirement = requirement.into();
        let id = SessionId::new();
        let session = Session::new(id, requirement.clone(), docs, self.deps().clock.epoch_ms());
        self.deps().store.save_session(&session)?;
        self.deps().bus.publish(Event::SessionCreated { id, requirement });

        self.dispatch(id, WorkflowKind::Planning, None)?;
        Ok(id)
    }

    /// Dispatch a revision workflow; the session returns to `reviewing`
    /// when the new plan version lands.
    pub fn revise(&self, id: &str, feedback: impl Into<String>) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        if !session.status.can_revise() {
            return Err(EngineError::BadTransition(format!(
                "cannot revise session in status {}",
                session.status
            )));
        }
        self.transition(session.id, SessionStatus::Revising)?;
        let mut params = BTreeMap::new();
        params.insert("feedback".to_string(), Value::String(feedback.into()));
        self.dispatch(session.id, WorkflowKind::Revision, Some(params))?;
        Ok(())
    }

    /// `reviewing → approved`; with `auto_start`, straight into execution.
    pub fn approve(&self, id: &str, auto_start: bool) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        self.require_transition(&session, SessionStatus::Approved)?;
        self.transition(session.id, SessionStatus::Approved)?;
        if auto_start {
            self.start_execution(id)?;
        }
        Ok(())
    }

    /// `approved → executing`, dispatching the execute workflow.
    pub fn start_execution(&self, id: &str) -> Result<WorkflowId, EngineError> {
        let session = self.get_session(id)?;
        self.require_transition(&session, SessionStatus::Executing)?;
        self.transition(session.id, SessionStatus::Executing)?;
        self.dispatch(session.id, WorkflowKind::Execute, None)
    }

    /// Pause the session's live workflow.
    pub fn pause(&self, id: &str) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        let workflow_id = session
            .live_workflow
            .ok_or_else(|| EngineError::BadTransition("no live workflow to pause".into()))?;
        self.pause_workflow(&workflow_id.to_string())?;
        if session.status == SessionStatus::Executing {
            self.transition(session.id, SessionStatus::Paused)?;
        }
        Ok(())
    }

    /// Resume a paused session.
    pub fn resume(&self, id: &str) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        if let Some(workflow_id) = session.live_workflow {
            self.resume_workflow(&workflow_id.to_string())?;
        }
        if session.status == SessionStatus::Paused {
            self.transition(session.id, SessionStatus::Executing)?;
        }
        Ok(())
    }

    /// Stop the session: cancel its workflow, release its agents.
    pub fn stop(&self, id: &str) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        self.require_transition(&session, SessionStatus::Stopped)?;
        self.cancel_live_workflow(&session);
        self.transition(session.id, SessionStatus::Stopped)
    }

    /// Cancel the session terminally.
    pub fn cancel(&self, id: &str) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        self.require_transition(&session, SessionStatus::Cancelled)?;
        self.cancel_live_workflow(&session);
        self.transition(session.id, SessionStatus::Cancelled)
    }

    /// Dispatch a single-task workflow against the approved plan. The
    /// session stays in `executing` whatever the outcome.
    pub fn retry_task(&self, id: &str, task_id: &str) -> Result<WorkflowId, EngineError> {
        let session = self.get_session(id)?;
        let mut params = BTreeMap::new();
        params.insert("task_id".to_string(), Value::String(task_id.to_string()));
        self.dispatch(session.id, WorkflowKind::SingleTask, Some(params))
    }

    /// Reopen a completed session for post-hoc revision.
    pub fn reopen(&self, id: &str) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        if session.status != SessionStatus::Completed {
            return Err(EngineError::BadTransition(format!(
                "cannot reopen session in status {}",
                session.status
            )));
        }
        self.transition(session.id, SessionStatus::Reviewing)
    }

    /// Delete a session. Only permitted when no workflow references it.
    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        if session.live_workflow.is_some() {
            return Err(EngineError::BadTransition(
                "cannot delete a session with a live workflow".into(),
            ));
        }
        self.deps().store.delete_session(&session.id)?;
        self.deps().bus.publish(Event::SessionDeleted { id: session.id });
        Ok(())
    }

    /// Startup recovery: for every non-terminal session, rehydrate its
    /// checkpoint (if any) and dispatch the workflow matching its state.
    pub fn recover_all(&self) -> usize {
        let mut recovered = 0;
        for mut session in self.sessions() {
            if session.status.is_terminal() {
                continue;
            }
            // The previous daemon's workflow died with it.
            if let Some(dead) = session.live_workflow.take() {
                session.finish_workflow(dead);
                if let Err(e) = self.deps().store.save_session(&session) {
                    tracing::error!(session = %session.id, error = %e, "recovery save failed");
                    continue;
                }
            }

            let dispatched = match session.status {
                SessionStatus::Planning => {
                    self.dispatch(session.id, WorkflowKind::Planning, None).ok()
                }
                SessionStatus::Revising => {
                    self.dispatch(session.id, WorkflowKind::Revision, None).ok()
                }
                SessionStatus::Executing => {
                    self.dispatch(session.id, WorkflowKind::Resume, None).ok()
                }
                // Reviewing/approved/paused sessions wait for the user.
                _ => None,
            };

            self.deps().bus.publish(Event::SessionRecovered {
                id: session.id,
                status: session.status,
                resumed_workflow: dispatched,
            });
            recovered += 1;
        }
        recovered
    }

    // ------------------------------------------------- workflow controls

    pub fn pause_workflow(&self, id: &str) -> Result<(), EngineError> {
        let workflow_id = WorkflowId::from_string(id);
        let live = self.inner.live.lock();
        let handle = live
            .get(&workflow_id)
            .ok_or_else(|| EngineError::SessionNotFound(format!("workflow {id} not live")))?;
        let _ = handle.pause.send(true);
        drop(live);
        self.set_instance_status(workflow_id, WorkflowStatus::Paused);
        self.deps().bus.publish(Event::WorkflowPaused { id: workflow_id });
        Ok(())
    }

    pub fn resume_workflow(&self, id: &str) -> Result<(), EngineError> {
        let workflow_id = WorkflowId::from_string(id);
        let live = self.inner.live.lock();
        let handle = live
            .get(&workflow_id)
            .ok_or_else(|| EngineError::SessionNotFound(format!("workflow {id} not live")))?;
        let _ = handle.pause.send(false);
        drop(live);
        self.set_instance_status(workflow_id, WorkflowStatus::Running);
        self.deps().bus.publish(Event::WorkflowResumed { id: workflow_id });
        Ok(())
    }

    pub fn stop_workflow(&self, id: &str) -> Result<(), EngineError> {
        let workflow_id = WorkflowId::from_string(id);
        let live = self.inner.live.lock();
        let handle = live
            .get(&workflow_id)
            .ok_or_else(|| EngineError::SessionNotFound(format!("workflow {id} not live")))?;
        handle.cancel.cancel();
        // Unpause so the interpreter observes the cancellation.
        let _ = handle.pause.send(false);
        Ok(())
    }

    // ----------------------------------------------------------- dispatch

    /// Create and launch a workflow instance for `session_id`.
    ///
    /// Exactly one live workflow per session; a second dispatch is a
    /// transition error.
    pub fn dispatch(
        &self,
        session_id: SessionId,
        kind: WorkflowKind,
        extra_params: Option<BTreeMap<String, Value>>,
    ) -> Result<WorkflowId, EngineError> {
        let mut session = self
            .deps()
            .store
            .get_session(&session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        if session.live_workflow.is_some() {
            return Err(EngineError::BadTransition(format!(
                "session {session_id} already has a live workflow"
            )));
        }

        let graph_name = match kind {
            WorkflowKind::Planning => "planning",
            WorkflowKind::Revision => "revision",
            WorkflowKind::Execute | WorkflowKind::Resume => "execute",
            WorkflowKind::SingleTask => "single_task",
        };
        let graph = self.deps().graphs.load(graph_name)?;

        // Resume rehydrates the newest checkpoint for this session.
        let resume = match kind {
            WorkflowKind::Resume => {
                self.deps().store.list_checkpoints(&session_id)?.pop()
            }
            _ => None,
        };

        let workflow_id = WorkflowId::new();
        let now_ms = self.deps().clock.epoch_ms();
        let mut instance =
            WorkflowInstance::new(workflow_id, session_id, graph.name.clone(), kind, now_ms);
        instance.status = WorkflowStatus::Running;
        self.inner.instances.lock().insert(workflow_id, instance);

        let mut params = BTreeMap::new();
        params.insert("requirement".to_string(), Value::String(session.requirement.clone()));
        params.insert("session_id".to_string(), Value::String(session_id.to_string()));
        if let Some(plan) = session.current_plan() {
            params.insert("plan_version".to_string(), Value::Number(plan.version as f64));
            if let Ok(text) = self.deps().store.read_plan(&session_id, plan.version) {
                params.insert("plan".to_string(), Value::String(text));
            }
        }
        if !session.docs.is_empty() {
            params.insert(
                "docs".to_string(),
                Value::List(
                    session
                        .docs
                        .iter()
                        .map(|d| Value::String(d.display().to_string()))
                        .collect(),
                ),
            );
        }
        if let Some(extra) = extra_params {
            params.extend(extra);
        }

        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);
        self.inner.live.lock().insert(
            workflow_id,
            RunHandle { cancel: cancel.clone(), pause: pause_tx },
        );

        session.live_workflow = Some(workflow_id);
        session.updated_at_ms = now_ms;
        self.deps().store.save_session(&session)?;

        self.deps().bus.publish(Event::WorkflowStarted {
            id: workflow_id,
            session_id,
            graph: graph.name.clone(),
            kind,
        });
        if let Err(e) = self
            .deps()
            .store
            .append_progress(&session_id, &format!("workflow.started {workflow_id} kind={kind}"))
        {
            tracing::warn!(error = %e, "progress log append failed");
        }

        let manager = self.clone();
        let ctx = Arc::new(ExecutionContext::new(
            workflow_id,
            session_id,
            graph.name.clone(),
            params,
            cancel,
            Arc::clone(&self.inner.deps),
        ));
        tokio::spawn(async move {
            let options = RunOptions {
                resume,
                pause: Some(pause_rx),
                ..RunOptions::default()
            };
            let result = manager.inner.engine.run(&graph, Arc::clone(&ctx), options).await;
            manager.on_finished(workflow_id, kind, result);
        });

        Ok(workflow_id)
    }

    /// Fold a finished workflow back into session state.
    fn on_finished(&self, workflow_id: WorkflowId, kind: WorkflowKind, result: WorkflowResult) {
        self.inner.live.lock().remove(&workflow_id);

        let session_id = {
            let mut instances = self.inner.instances.lock();
            match instances.get_mut(&workflow_id) {
                Some(instance) => {
                    instance.status = result.status;
                    instance.ended_at_ms = Some(self.deps().clock.epoch_ms());
                    instance.node_results = result.node_results.clone();
                    instance.error = result.error.clone();
                    instance.session_id
                }
                None => return,
            }
        };

        // Agents and children owned by this workflow are reclaimed
        // whatever the outcome.
        self.deps().pool.force_release_owner(workflow_id);
        self.deps().supervisor.stop_owner(workflow_id);

        let Some(mut session) = self.deps().store.get_session(&session_id) else { return };
        session.finish_workflow(workflow_id);
        session.updated_at_ms = self.deps().clock.epoch_ms();

        let mut plan_diff = None;
        if result.success() {
            // Planning and revision workflows deliver a new plan version.
            if matches!(kind, WorkflowKind::Planning | WorkflowKind::Revision) {
                match result.outputs.get("plan").map(|v| v.coerce_string()) {
                    Some(text) => {
                        let version = session.next_plan_version();
                        let previous = session
                            .current_plan()
                            .and_then(|p| self.deps().store.read_plan(&session_id, p.version).ok());
                        match self.deps().store.write_plan(&session_id, version, &text) {
                            Ok(path) => {
                                plan_diff =
                                    previous.map(|old| line_diff_counts(&old, &text));
                                let author_role = result
                                    .outputs
                                    .get("author_role")
                                    .map(|v| v.coerce_string())
                                    .unwrap_or_else(|| match kind {
                                        WorkflowKind::Planning => "planner".to_string(),
                                        _ => "reviser".to_string(),
                                    });
                                session.push_plan(PlanVersion {
                                    version,
                                    path,
                                    created_at_ms: session.updated_at_ms,
                                    author_role,
                                });
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "failed to write plan artifact")
                            }
                        }
                    }
                    None => {
                        tracing::warn!(
                            workflow = %workflow_id,
                            "plan workflow produced no plan output"
                        );
                    }
                }
            }
            // A finished run's checkpoint is spent.
            if let Err(e) = self.deps().store.remove_checkpoint(&session_id, &workflow_id) {
                tracing::warn!(error = %e, "failed to remove checkpoint");
            }
        }

        let next_status = session_status_after(kind, &result, session.status);
        if let Some(next) = next_status {
            if session.status.can_transition_to(next) {
                session.status = next;
            } else if session.status != next {
                tracing::warn!(
                    session = %session_id,
                    from = %session.status,
                    to = %next,
                    "skipping invalid post-workflow transition"
                );
            }
        }

        if let Err(e) = self.deps().store.save_session(&session) {
            tracing::error!(error = %e, "failed to save session after workflow");
        }
        if let Err(e) = self.deps().store.append_progress(
            &session_id,
            &format!("workflow.completed {workflow_id} status={}", result.status),
        ) {
            tracing::warn!(error = %e, "progress log append failed");
        }

        // Single-task failures surface to the UI but leave the session in
        // `executing`.
        if kind == WorkflowKind::SingleTask && !result.success() {
            self.deps().bus.publish(Event::TaskFailedFinal {
                session_id,
                workflow_id,
                task_id: result
                    .node_results
                    .keys()
                    .next_back()
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                error_code: result
                    .error_code
                    .clone()
                    .unwrap_or_else(|| "workflow.failed".to_string()),
                error: result.error.clone().unwrap_or_default(),
            });
        }

        self.deps().bus.publish(Event::WorkflowCompleted {
            id: workflow_id,
            session_id,
            success: result.success(),
            status: result.status,
            error_code: result.error_code.clone(),
            error: result.error.clone(),
        });
        self.deps().bus.publish(Event::SessionUpdated {
            id: session_id,
            status: session.status,
            plan_version: session.current_plan().map(|p| p.version),
            plan_diff,
        });
    }

    // ------------------------------------------------------------ helpers

    fn cancel_live_workflow(&self, session: &Session) {
        if let Some(workflow_id) = session.live_workflow {
            let live = self.inner.live.lock();
            if let Some(handle) = live.get(&workflow_id) {
                handle.cancel.cancel();
                let _ = handle.pause.send(false);
            }
        }
    }

    fn require_transition(
        &self,
        session: &Session,
        next: SessionStatus,
    ) -> Result<(), EngineError> {
        if !session.status.can_transition_to(next) {
            return Err(EngineError::BadTransition(format!(
                "{} -> {} is not a valid transition",
                session.status, next
            )));
        }
        Ok(())
    }

    fn transition(&self, id: SessionId, next: SessionStatus) -> Result<(), EngineError> {
        let mut session = self
            .deps()
            .store
            .get_session(&id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        self.require_transition(&session, next)?;
        session.status = next;
        session.updated_at_ms = self.deps().clock.epoch_ms();
        self.deps().store.save_session(&session)?;
        self.deps().bus.publish(Event::SessionUpdated {
            id,
            status: next,
            plan_version: session.current_plan().map(|p| p.version),
            plan_diff: None,
        });
        Ok(())
    }

    /// Recovery-path transition used by the coordinator's failure retry.
    pub fn recover_status(&self, id: &SessionId, next: SessionStatus) -> Result<(), EngineError> {
        self.transition(*id, next)
    }

    /// Pool resize passthrough for the IPC surface.
    pub fn resize_pool(&self, size: usize) -> Result<(), EngineError> {
        self.deps().pool.resize(size)
    }

    fn set_instance_status(&self, id: WorkflowId, status: WorkflowStatus) {
        if let Some(instance) = self.inner.instances.lock().get_mut(&id) {
            instance.status = status;
        }
    }

    /// The workflow a session in `status` still needs, for the
    /// coordinator's natural-next evaluation.
    pub fn natural_next(&self, session: &Session) -> Option<WorkflowKind> {
        if session.live_workflow.is_some() {
            return None;
        }
        match session.status {
            SessionStatus::Planning => Some(WorkflowKind::Planning),
            SessionStatus::Revising => Some(WorkflowKind::Revision),
            SessionStatus::Executing => Some(WorkflowKind::Resume),
            _ => None,
        }
    }
}

/// The session status implied by a finished workflow, when any.
fn session_status_after(
    kind: WorkflowKind,
    result: &WorkflowResult,
    current: SessionStatus,
) -> Option<SessionStatus> {
    match (kind, result.status) {
        (WorkflowKind::Planning, WorkflowStatus::Completed) => Some(SessionStatus::Reviewing),
        (WorkflowKind::Planning, WorkflowStatus::Failed) => Some(SessionStatus::Failed),
        (WorkflowKind::Revision, WorkflowStatus::Completed) => Some(SessionStatus::Reviewing),
        (WorkflowKind::Revision, WorkflowStatus::Failed) => Some(SessionStatus::Failed),
        (WorkflowKind::Execute | WorkflowKind::Resume, WorkflowStatus::Completed) => {
            Some(SessionStatus::Completed)
        }
        (WorkflowKind::Execute | WorkflowKind::Resume, WorkflowStatus::Failed) => {
            Some(SessionStatus::Failed)
        }
        (WorkflowKind::Execute | WorkflowKind::Resume, WorkflowStatus::Cancelled) => {
            // Stop/cancel paths already set the session status; only
            // reflect a stop if nothing else did.
            if current == SessionStatus::Executing {
                Some(SessionStatus::Stopped)
            } else {
                None
            }
        }
        // Single-task outcomes never move the session.
        (WorkflowKind::SingleTask, _) => None,
        _ => None,
    }
}

/// Line-level (added, removed) counts between two plan versions.
fn line_diff_counts(old: &str, new: &str) -> (usize, usize) {
    use std::collections::HashMap;
    let mut old_lines: HashMap<&str, usize> = HashMap::new();
    for line in old.lines() {
        *old_lines.entry(line).or_default() += 1;
    }
    let mut added = 0;
    let mut remaining = old_lines;
    for line in new.lines() {
        match remaining.get_mut(line) {
            Some(count) if *count > 0 => *count -= 1,
            _ => added += 1,
        }
    }
    let removed: usize = remaining.values().sum();
    (added, removed)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
