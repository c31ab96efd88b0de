// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised child process records.

use crate::workflow::WorkflowId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier for a tracked child process (distinct from the OS pid).
    pub struct ProcessId("prc-");
}

/// Bookkeeping for one spawned child. Every record corresponds to a live
/// OS process until reaped by the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub id: ProcessId,
    /// OS process id, when the spawn succeeded.
    pub pid: Option<u32>,
    pub command: String,
    pub owner: WorkflowId,
    pub started_at_ms: u64,
    /// Refreshed on every captured output byte.
    pub last_activity_ms: u64,
    pub stdout_bytes: u64,
    pub stderr_bytes: u64,
}

impl ProcessRecord {
    /// Inactivity age at `now_ms`.
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_ms)
    }
}
