// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session record and lifecycle state machine.
//!
//! A session is the user-facing unit of work spanning planning through
//! execution. Workflows are the mechanism; sessions are the goal. Status
//! transitions are validated here so every caller shares one arrow set.

use crate::workflow::WorkflowId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a session.
    pub struct SessionId("ses-");
}

/// Session lifecycle states. Terminal states are absorbing only through
/// the transition table (`reopen` routes a completed session back through
/// `reviewing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planning,
    Debating,
    Reviewing,
    Revising,
    Approved,
    Executing,
    Paused,
    Completed,
    Stopped,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled
        )
    }

    /// True when the status permits dispatching a revision workflow.
    pub fn can_revise(&self) -> bool {
        matches!(
            self,
            SessionStatus::Reviewing | SessionStatus::Approved | SessionStatus::Executing
        )
    }

    /// Valid transition arrows. Everything else is `session.bad_transition`.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            // Forward path
            (Planning, Debating) | (Planning, Reviewing) => true,
            (Debating, Reviewing) => true,
            (Reviewing, Approved) | (Reviewing, Revising) => true,
            (Revising, Reviewing) => true,
            (Approved, Executing) | (Approved, Revising) => true,
            (Executing, Completed) | (Executing, Failed) | (Executing, Stopped) => true,
            (Executing, Paused) | (Paused, Executing) => true,
            (Executing, Revising) => true,
            // Stop/cancel from any non-terminal state
            (s, Stopped) | (s, Cancelled) if !s.is_terminal() => true,
            // Failure surfaces from the active states
            (Planning, Failed) | (Debating, Failed) | (Revising, Failed) => true,
            // Recovery arrows
            (Stopped, Executing) | (Stopped, Reviewing) => true,
            (Failed, Executing) | (Failed, Reviewing) => true,
            // Post-hoc revision of a finished session
            (Completed, Reviewing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Planning => "planning",
            SessionStatus::Debating => "debating",
            SessionStatus::Reviewing => "reviewing",
            SessionStatus::Revising => "revising",
            SessionStatus::Approved => "approved",
            SessionStatus::Executing => "executing",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One entry in a session's append-only plan history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanVersion {
    pub version: u32,
    /// Path of the plan artifact relative to the session directory.
    pub path: PathBuf,
    pub created_at_ms: u64,
    /// Role of the agent that authored this version.
    pub author_role: String,
}

/// Persisted session record (`session.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Free-text requirement the session was created with.
    pub requirement: String,
    /// Supporting document paths supplied at creation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<PathBuf>,
    pub status: SessionStatus,
    /// Append-only; the last entry is always the current plan.
    #[serde(default)]
    pub plan_history: Vec<PlanVersion>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    /// The one live workflow, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_workflow: Option<WorkflowId>,
    /// Recently finished workflow ids, newest last, capped.
    #[serde(default)]
    pub workflow_history: Vec<WorkflowId>,
}

/// Cap on retained completed-workflow history per session.
pub const WORKFLOW_HISTORY_CAP: usize = 32;

impl Session {
    pub fn new(id: SessionId, requirement: String, docs: Vec<PathBuf>, now_ms: u64) -> Self {
        Self {
            id,
            requirement,
            docs,
            status: SessionStatus::Planning,
            plan_history: Vec::new(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            live_workflow: None,
            workflow_history: Vec::new(),
        }
    }

    /// Current plan — the last history entry.
    pub fn current_plan(&self) -> Option<&PlanVersion> {
        self.plan_history.last()
    }

    /// Next plan version number (1-based).
    pub fn next_plan_version(&self) -> u32 {
        self.plan_history.last().map(|p| p.version + 1).unwrap_or(1)
    }

    /// Append a plan version. History is append-only; versions must ascend.
    pub fn push_plan(&mut self, plan: PlanVersion) {
        debug_assert!(
            self.plan_history.last().map(|p| plan.version > p.version).unwrap_or(true),
            "plan versions must ascend"
        );
        self.plan_history.push(plan);
    }

    /// Record a finished workflow, clearing the live pointer if it matches.
    pub fn finish_workflow(&mut self, id: WorkflowId) {
        if self.live_workflow == Some(id) {
            self.live_workflow = None;
        }
        self.workflow_history.push(id);
        if self.workflow_history.len() > WORKFLOW_HISTORY_CAP {
            let excess = self.workflow_history.len() - WORKFLOW_HISTORY_CAP;
            self.workflow_history.drain(..excess);
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
