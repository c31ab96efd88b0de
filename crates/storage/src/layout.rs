// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace directory layout.
//!
//! ```text
//! <workspace>/<workingDir>/
//!   .cache/pool.json            pool snapshot
//!   .cache/daemon.port          IPC port file
//!   .cache/daemon.lock          workspace writer lock
//!   Plans/<sessionId>/
//!     session.json              session record
//!     plan-v<n>.md              plan artifacts
//!     tasks.json                expanded task list (opaque to the core)
//!     progress.log              append-only workflow log
//!     agent-<name>.log          per-agent streams
//!     checkpoints/<wfId>.json   checkpoint blobs
//! ```

use std::path::{Path, PathBuf};

/// Resolves every persisted path from the working directory root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self { root: working_dir.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache")
    }

    pub fn pool_path(&self) -> PathBuf {
        self.cache_dir().join("pool.json")
    }

    pub fn port_path(&self) -> PathBuf {
        self.cache_dir().join("daemon.port")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.cache_dir().join("daemon.lock")
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.root.join("Plans")
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.plans_dir().join(session_id)
    }

    pub fn session_json(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("session.json")
    }

    pub fn plan_path(&self, session_id: &str, version: u32) -> PathBuf {
        self.session_dir(session_id).join(format!("plan-v{version}.md"))
    }

    pub fn tasks_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("tasks.json")
    }

    pub fn progress_log(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("progress.log")
    }

    pub fn agent_log(&self, session_id: &str, agent: &str) -> PathBuf {
        self.session_dir(session_id).join(format!("agent-{agent}.log"))
    }

    pub fn checkpoints_dir(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("checkpoints")
    }

    pub fn checkpoint_path(&self, session_id: &str, workflow_id: &str) -> PathBuf {
        self.checkpoints_dir(session_id).join(format!("{workflow_id}.json"))
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
