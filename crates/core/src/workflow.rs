// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow instance and checkpoint records.

use crate::session::SessionId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

crate::define_id! {
    /// Unique identifier for one run of a graph against a session.
    pub struct WorkflowId("wf-");
}

/// Why a workflow was dispatched. The Coordinator uses this to pick the
/// next step and the Session Manager to decide how failures reflect on
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Planning,
    Revision,
    Execute,
    SingleTask,
    /// Post-restart resumption of a checkpointed run.
    Resume,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowKind::Planning => "planning",
            WorkflowKind::Revision => "revision",
            WorkflowKind::Execute => "execute",
            WorkflowKind::SingleTask => "single_task",
            WorkflowKind::Resume => "resume",
        };
        write!(f, "{s}")
    }
}

/// Workflow instance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Queued => "queued",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Per-node run state inside a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One live (or recently finished) run of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowId,
    pub session_id: SessionId,
    pub graph: String,
    pub kind: WorkflowKind,
    pub status: WorkflowStatus,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    /// Completed node outputs: node id → port id → value.
    #[serde(default)]
    pub node_results: BTreeMap<String, BTreeMap<String, Value>>,
    /// Nodes currently executing.
    #[serde(default)]
    pub running_nodes: BTreeSet<String>,
    /// Error that terminated the run, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowInstance {
    pub fn new(
        id: WorkflowId,
        session_id: SessionId,
        graph: impl Into<String>,
        kind: WorkflowKind,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            session_id,
            graph: graph.into(),
            kind,
            status: WorkflowStatus::Queued,
            started_at_ms: now_ms,
            ended_at_ms: None,
            node_results: BTreeMap::new(),
            running_nodes: BTreeSet::new(),
            error: None,
        }
    }
}

/// Resumable snapshot written after each checkpoint-flagged node completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub workflow_id: WorkflowId,
    pub graph: String,
    pub taken_at_ms: u64,
    /// Nodes that finished successfully (or were skipped) before the snapshot.
    pub completed_nodes: BTreeSet<String>,
    /// Variable values at snapshot time.
    pub variables: BTreeMap<String, Value>,
    /// Outputs of completed nodes: node id → port id → value.
    pub node_results: BTreeMap<String, BTreeMap<String, Value>>,
    /// Nodes that were in flight; re-executed on resume.
    pub running_nodes: BTreeSet<String>,
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
