// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events published on the daemon bus.
//!
//! Serializes with `{"type": "topic.name", ...fields}` format. The type tag
//! is the bus topic external clients subscribe to; unknown tags deserialize
//! to `Unknown` so old daemons tolerate new clients.

use crate::process::ProcessId;
use crate::session::{SessionId, SessionStatus};
use crate::workflow::{WorkflowId, WorkflowKind, WorkflowStatus};
use serde::{Deserialize, Serialize};

/// Events that flow through the in-process bus and out over IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- session --
    #[serde(rename = "session.created")]
    SessionCreated { id: SessionId, requirement: String },

    #[serde(rename = "session.updated")]
    SessionUpdated {
        id: SessionId,
        status: SessionStatus,
        /// Current plan version, when one exists.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plan_version: Option<u32>,
        /// Line-level summary of the latest revision: (added, removed).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plan_diff: Option<(usize, usize)>,
    },

    #[serde(rename = "session.recovered")]
    SessionRecovered { id: SessionId, status: SessionStatus, resumed_workflow: Option<WorkflowId> },

    #[serde(rename = "session.deleted")]
    SessionDeleted { id: SessionId },

    // -- pool --
    #[serde(rename = "pool.changed")]
    PoolChanged { available: usize, busy: usize, resting: usize, total: usize },

    // -- workflow --
    #[serde(rename = "workflow.started")]
    WorkflowStarted {
        id: WorkflowId,
        session_id: SessionId,
        graph: String,
        kind: WorkflowKind,
    },

    #[serde(rename = "workflow.completed")]
    WorkflowCompleted {
        id: WorkflowId,
        session_id: SessionId,
        success: bool,
        status: WorkflowStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "workflow.paused")]
    WorkflowPaused { id: WorkflowId },

    #[serde(rename = "workflow.resumed")]
    WorkflowResumed { id: WorkflowId },

    // -- node (also emitted in debug mode) --
    #[serde(rename = "node_start")]
    NodeStart { workflow_id: WorkflowId, node_id: String, node_type: String },

    #[serde(rename = "node_complete")]
    NodeComplete { workflow_id: WorkflowId, node_id: String },

    #[serde(rename = "node_error")]
    NodeError { workflow_id: WorkflowId, node_id: String, error: String },

    #[serde(rename = "breakpoint")]
    Breakpoint { workflow_id: WorkflowId, node_id: String },

    #[serde(rename = "step")]
    Step { workflow_id: WorkflowId, node_id: String },

    #[serde(rename = "port_value")]
    PortValue {
        workflow_id: WorkflowId,
        node_id: String,
        port: String,
        value: serde_json::Value,
    },

    // -- task --
    /// A node-level task failed but its policy may still recover it.
    #[serde(rename = "task.failed")]
    TaskFailed {
        session_id: SessionId,
        workflow_id: WorkflowId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        error_code: String,
        error: String,
        retry_available: bool,
    },

    /// A single-task workflow exhausted its recovery options. The session
    /// stays in `executing`; external UIs prompt the user.
    #[serde(rename = "task.failedFinal")]
    TaskFailedFinal {
        session_id: SessionId,
        workflow_id: WorkflowId,
        task_id: String,
        error_code: String,
        error: String,
    },

    // -- process --
    #[serde(rename = "process.exited")]
    ProcessExited { id: ProcessId, workflow_id: WorkflowId, exit_code: Option<i32> },

    #[serde(rename = "process.stuck")]
    ProcessStuck { id: ProcessId, workflow_id: WorkflowId, idle_ms: u64 },

    // -- prompt --
    /// A prompt was staged for an external UI to pick up.
    #[serde(rename = "prompt.ready")]
    PromptReady { session_id: SessionId, role: String },

    /// Workflow-authored event (`event` node) or any topic the daemon does
    /// not model structurally.
    #[serde(rename = "custom")]
    Custom { topic: String, payload: serde_json::Value },

    /// Catch-all so newer peers' events don't break deserialization.
    #[serde(other, skip_serializing)]
    Unknown,
}

impl Event {
    /// The bus topic this event publishes under.
    pub fn topic(&self) -> &str {
        match self {
            Event::SessionCreated { .. } => "session.created",
            Event::SessionUpdated { .. } => "session.updated",
            Event::SessionRecovered { .. } => "session.recovered",
            Event::SessionDeleted { .. } => "session.deleted",
            Event::PoolChanged { .. } => "pool.changed",
            Event::WorkflowStarted { .. } => "workflow.started",
            Event::WorkflowCompleted { .. } => "workflow.completed",
            Event::WorkflowPaused { .. } => "workflow.paused",
            Event::WorkflowResumed { .. } => "workflow.resumed",
            Event::NodeStart { .. } => "node_start",
            Event::NodeComplete { .. } => "node_complete",
            Event::NodeError { .. } => "node_error",
            Event::Breakpoint { .. } => "breakpoint",
            Event::Step { .. } => "step",
            Event::PortValue { .. } => "port_value",
            Event::TaskFailed { .. } => "task.failed",
            Event::TaskFailedFinal { .. } => "task.failedFinal",
            Event::ProcessExited { .. } => "process.exited",
            Event::ProcessStuck { .. } => "process.stuck",
            Event::PromptReady { .. } => "prompt.ready",
            Event::Custom { topic, .. } => topic,
            Event::Unknown => "unknown",
        }
    }

    /// One-line summary for activity logs.
    pub fn log_summary(&self) -> String {
        match self {
            Event::SessionCreated { id, .. } => format!("session.created {id}"),
            Event::SessionUpdated { id, status, .. } => {
                format!("session.updated {id} status={status}")
            }
            Event::SessionRecovered { id, status, .. } => {
                format!("session.recovered {id} status={status}")
            }
            Event::SessionDeleted { id } => format!("session.deleted {id}"),
            Event::PoolChanged { available, busy, resting, total } => {
                format!("pool.changed avail={available} busy={busy} resting={resting} total={total}")
            }
            Event::WorkflowStarted { id, graph, .. } => format!("workflow.started {id} graph={graph}"),
            Event::WorkflowCompleted { id, success, .. } => {
                format!("workflow.completed {id} success={success}")
            }
            Event::WorkflowPaused { id } => format!("workflow.paused {id}"),
            Event::WorkflowResumed { id } => format!("workflow.resumed {id}"),
            Event::NodeStart { node_id, .. } => format!("node_start {node_id}"),
            Event::NodeComplete { node_id, .. } => format!("node_complete {node_id}"),
            Event::NodeError { node_id, error, .. } => format!("node_error {node_id}: {error}"),
            Event::Breakpoint { node_id, .. } => format!("breakpoint {node_id}"),
            Event::Step { node_id, .. } => format!("step {node_id}"),
            Event::PortValue { node_id, port, .. } => format!("port_value {node_id}.{port}"),
            Event::TaskFailed { error_code, .. } => format!("task.failed {error_code}"),
            Event::TaskFailedFinal { task_id, .. } => format!("task.failedFinal {task_id}"),
            Event::ProcessExited { id, exit_code, .. } => {
                format!("process.exited {id} code={exit_code:?}")
            }
            Event::ProcessStuck { id, idle_ms, .. } => {
                format!("process.stuck {id} idle_ms={idle_ms}")
            }
            Event::PromptReady { session_id, role } => {
                format!("prompt.ready {session_id} role={role}")
            }
            Event::Custom { topic, .. } => format!("custom {topic}"),
            Event::Unknown => "unknown".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
