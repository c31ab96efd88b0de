// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent slot records for the pool.
//!
//! A slot is a long-lived named worker identity. Slot names are minted once
//! per workspace and survive restarts; the slot's state tracks what the
//! current allocation (if any) is doing.

use crate::workflow::WorkflowId;
use serde::{Deserialize, Serialize};

/// State of a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Free for allocation.
    Available,
    /// Handed to a workflow, no agent process running yet.
    Allocated,
    /// An agent process is running on this slot.
    Busy,
    /// Recently released; returns to available when rest elapses.
    Resting,
    /// Removed from service; ignored by allocation.
    Retired,
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SlotState::Available => "available",
            SlotState::Allocated => "allocated",
            SlotState::Busy => "busy",
            SlotState::Resting => "resting",
            SlotState::Retired => "retired",
        };
        write!(f, "{s}")
    }
}

/// A named worker slot in the pool (persisted in `pool.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSlot {
    /// Stable name, e.g. `agent-3`. Generated once, never reused.
    pub name: String,
    pub state: SlotState,
    /// Workflow currently holding this slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    /// Role the current allocation was requested for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated_at_ms: Option<u64>,
    /// When a resting slot returns to available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_until_ms: Option<u64>,
}

impl AgentSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SlotState::Available,
            workflow_id: None,
            role: None,
            allocated_at_ms: None,
            rest_until_ms: None,
        }
    }

    /// True when this slot can satisfy an allocation request.
    pub fn is_free(&self) -> bool {
        self.state == SlotState::Available
    }

    /// Clear allocation fields back to an idle shape.
    pub fn clear_allocation(&mut self) {
        self.workflow_id = None;
        self.role = None;
        self.allocated_at_ms = None;
    }
}

#[cfg(test)]
#[path = "slot_tests.rs"]
mod tests;
