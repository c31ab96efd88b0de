// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UI-facing summary types returned over IPC.

use gaffer_core::{SessionStatus, SlotState, WorkflowKind, WorkflowStatus};
use serde::{Deserialize, Serialize};

/// One session as rendered by an external client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub requirement: String,
    pub status: SessionStatus,
    pub plan_version: Option<u32>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_workflow: Option<String>,
}

/// Per-slot detail inside a pool status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDetail {
    pub name: String,
    pub state: SlotState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

/// Pool status counts plus per-slot detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub available: usize,
    pub busy: usize,
    pub resting: usize,
    pub total: usize,
    #[serde(default)]
    pub slots: Vec<SlotDetail>,
}

/// One live or recent workflow as rendered by an external client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub session_id: String,
    pub graph: String,
    pub kind: WorkflowKind,
    pub status: WorkflowStatus,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
}

/// Everything an external UI needs to render in one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub sessions: Vec<SessionSummary>,
    pub pool: PoolStatus,
    pub workflows: Vec<WorkflowSummary>,
    pub uptime_ms: u64,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
