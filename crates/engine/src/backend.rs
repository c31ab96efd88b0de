// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent backend recipes.
//!
//! A backend turns an agent task (role, prompt, workspace, stage) into the
//! concrete command line the supervisor spawns. The daemon ships a Claude
//! Code recipe; tests use the mock.

use gaffer_core::AgentBackendKind;
use std::path::PathBuf;
use std::sync::Arc;

/// One agent task to be run as a child process.
#[derive(Debug, Clone)]
pub struct AgentTaskSpec {
    pub role: String,
    pub prompt: String,
    pub workspace_dir: PathBuf,
    /// Stage tag used by external CLI callbacks (`plan`, `implement`, ...).
    pub stage: String,
    pub agent_name: String,
}

/// A fully-built spawn recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecipe {
    /// Shell command line (run via `sh -c`).
    pub command: String,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

/// Backend recipe plug-in.
pub trait AgentBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn build(&self, task: &AgentTaskSpec) -> CommandRecipe;
}

/// Escape a string for a shell single-quoted context (`'` → `'\''`).
pub fn escape_for_shell(s: &str) -> String {
    s.replace('\'', "'\\''")
}

/// Claude Code CLI in non-interactive print mode.
#[derive(Debug, Default)]
pub struct ClaudeBackend;

impl AgentBackend for ClaudeBackend {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn build(&self, task: &AgentTaskSpec) -> CommandRecipe {
        let command = format!(
            "claude -p '{}' --output-format text",
            escape_for_shell(&task.prompt)
        );
        CommandRecipe {
            command,
            env: vec![
                ("GAFFER_ROLE".to_string(), task.role.clone()),
                ("GAFFER_STAGE".to_string(), task.stage.clone()),
                ("GAFFER_AGENT".to_string(), task.agent_name.clone()),
            ],
            cwd: Some(task.workspace_dir.clone()),
        }
    }
}

/// Resolve the configured backend kind.
pub fn backend_for(kind: AgentBackendKind) -> Arc<dyn AgentBackend> {
    match kind {
        AgentBackendKind::Claude => Arc::new(ClaudeBackend),
        AgentBackendKind::Mock => Arc::new(mock::MockBackend::default()),
    }
}

pub(crate) mod mock {
    use super::*;

    /// Echo backend: replies with a fixed line (or the prompt itself),
    /// so engine tests exercise the full spawn path without an agent CLI.
    #[derive(Debug, Default)]
    pub struct MockBackend {
        /// Fixed reply; `None` echoes the prompt back.
        pub reply: Option<String>,
    }

    impl MockBackend {
        pub fn replying(reply: impl Into<String>) -> Self {
            Self { reply: Some(reply.into()) }
        }
    }

    impl AgentBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn build(&self, task: &AgentTaskSpec) -> CommandRecipe {
            let reply = self.reply.clone().unwrap_or_else(|| task.prompt.clone());
            CommandRecipe {
                command: format!("echo '{}'", escape_for_shell(&reply)),
                env: vec![("GAFFER_STAGE".to_string(), task.stage.clone())],
                cwd: None,
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use mock::MockBackend;

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
