// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC method dispatch.
//!
//! Narrowed [`Method`] calls map onto session manager and pool operations;
//! results serialize into the response envelope, errors carry their stable
//! codes.

use gaffer_core::SystemClock;
use gaffer_engine::{EngineError, SessionManager};
use gaffer_wire::{Envelope, Method, SessionSummary};

/// Execute one request and build its response envelope.
pub fn dispatch_method(
    sessions: &SessionManager<SystemClock>,
    method: Method,
    id: u64,
    uptime_ms: u64,
) -> Envelope {
    match run(sessions, method, uptime_ms) {
        Ok(result) => Envelope::response_ok(id, result),
        Err(e) => Envelope::response_err(id, e.code(), e.to_string()),
    }
}

fn run(
    sessions: &SessionManager<SystemClock>,
    method: Method,
    uptime_ms: u64,
) -> Result<serde_json::Value, EngineError> {
    match method {
        Method::CreateSession { requirement, docs } => {
            let id = sessions.create_session(requirement, docs)?;
            Ok(serde_json::json!({ "id": id }))
        }
        Method::ReviseSession { id, feedback } => {
            sessions.revise(&id, feedback)?;
            Ok(ok())
        }
        Method::ApproveSession { id, auto_start } => {
            sessions.approve(&id, auto_start)?;
            Ok(ok())
        }
        Method::PauseSession { id } => {
            sessions.pause(&id)?;
            Ok(ok())
        }
        Method::ResumeSession { id } => {
            sessions.resume(&id)?;
            Ok(ok())
        }
        Method::StopSession { id } => {
            sessions.stop(&id)?;
            Ok(ok())
        }
        Method::CancelSession { id } => {
            sessions.cancel(&id)?;
            Ok(ok())
        }
        Method::RetryTask { id, task_id } => {
            let workflow_id = sessions.retry_task(&id, &task_id)?;
            Ok(serde_json::json!({ "workflow_id": workflow_id }))
        }
        Method::ReopenSession { id } => {
            sessions.reopen(&id)?;
            Ok(ok())
        }
        Method::DeleteSession { id } => {
            sessions.delete(&id)?;
            Ok(ok())
        }
        Method::GetSession { id } => {
            let session = sessions.get_session(&id)?;
            let summary = SessionSummary {
                id: session.id.to_string(),
                requirement: session.requirement.clone(),
                status: session.status,
                plan_version: session.current_plan().map(|p| p.version),
                created_at_ms: session.created_at_ms,
                updated_at_ms: session.updated_at_ms,
                live_workflow: session.live_workflow.map(|w| w.to_string()),
            };
            serde_json::to_value(summary).map_err(internal)
        }
        Method::ListSessions => {
            let snapshot = sessions.snapshot(uptime_ms);
            serde_json::to_value(snapshot.sessions).map_err(internal)
        }
        Method::ReadPlan { id, version } => {
            let text = sessions.read_plan(&id, version)?;
            Ok(serde_json::json!({ "text": text }))
        }
        Method::PoolStatus => {
            serde_json::to_value(sessions.snapshot(uptime_ms).pool).map_err(internal)
        }
        Method::PoolResize { size } => {
            sessions.resize_pool(size)?;
            Ok(ok())
        }
        Method::PauseWorkflow { id } => {
            sessions.pause_workflow(&id)?;
            Ok(ok())
        }
        Method::ResumeWorkflow { id } => {
            sessions.resume_workflow(&id)?;
            Ok(ok())
        }
        Method::StopWorkflow { id } => {
            sessions.stop_workflow(&id)?;
            Ok(ok())
        }
        Method::Snapshot => {
            serde_json::to_value(sessions.snapshot(uptime_ms)).map_err(internal)
        }
    }
}

fn ok() -> serde_json::Value {
    serde_json::json!({ "ok": true })
}

fn internal(e: serde_json::Error) -> EngineError {
    EngineError::WorkflowFailed(format!("serialization failure: {e}"))
}

#[cfg(test)]
#[path = "methods_tests.rs"]
mod tests;
