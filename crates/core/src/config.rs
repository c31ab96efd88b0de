// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Loaded from `gaffer.toml` in the workspace root (all keys optional),
//! with bounds enforced at load time. Invalid values are a startup error
//! (exit code 64), never silently clamped.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Which agent-backend recipe spawned agents use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentBackendKind {
    /// Claude Code CLI in non-interactive mode.
    #[default]
    Claude,
    /// Echo-style stub for tests and dry runs.
    Mock,
}

/// Coordinator timing windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Debounce window before evaluating queued events.
    pub debounce_ms: u64,
    /// Hold after dispatch before returning to idle.
    pub cooldown_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000, cooldown_ms: 1000 }
    }
}

/// The recognized daemon option set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Subpath under the workspace root holding all daemon state.
    pub working_directory: String,
    /// Initial pool size.
    pub agent_pool_size: usize,
    /// Store flush cadence in ms.
    pub state_update_interval_ms: u64,
    /// Agent-backend recipe for spawned agents.
    pub default_agent_backend: AgentBackendKind,
    /// Inactivity window before a child process counts as stuck.
    pub stuck_process_threshold_ms: u64,
    /// Slot rest after release.
    pub rest_duration_ms: u64,
    /// Coordinator debounce/cooldown windows.
    pub coordinator: CoordinatorConfig,
    /// Maximum subgraph nesting depth.
    pub max_subgraph_depth: usize,
    /// Command-line substring used by the orphan sweep. Empty disables
    /// orphan killing entirely (err on the side of non-kill).
    pub orphan_signature: String,
    /// Gates for optional subsystem integrations.
    pub enable_domain_extensions: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            working_directory: "_AiDevLog".to_string(),
            agent_pool_size: 5,
            state_update_interval_ms: 5000,
            default_agent_backend: AgentBackendKind::default(),
            stuck_process_threshold_ms: 600_000,
            rest_duration_ms: 0,
            coordinator: CoordinatorConfig::default(),
            max_subgraph_depth: 8,
            orphan_signature: String::new(),
            enable_domain_extensions: false,
        }
    }
}

/// Configuration load/validation failure (daemon exit code 64).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{field} = {value} outside bounds {min}..={max}")]
    OutOfBounds { field: &'static str, value: u64, min: u64, max: u64 },
}

impl DaemonConfig {
    /// Load from `gaffer.toml` under `workspace_root`, falling back to
    /// defaults when the file is absent.
    pub fn load(workspace_root: &Path) -> Result<Self, ConfigError> {
        let path = workspace_root.join("gaffer.toml");
        let config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Enforce the documented bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_bounds("agent_pool_size", self.agent_pool_size as u64, 1, 32)?;
        check_bounds("state_update_interval_ms", self.state_update_interval_ms, 500, 60_000)?;
        check_bounds("max_subgraph_depth", self.max_subgraph_depth as u64, 1, 64)?;
        Ok(())
    }

    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_millis(self.stuck_process_threshold_ms)
    }

    pub fn rest_duration(&self) -> Duration {
        Duration::from_millis(self.rest_duration_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.coordinator.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.coordinator.cooldown_ms)
    }

    /// Root of all daemon state under the workspace.
    pub fn working_dir(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(&self.working_directory)
    }
}

fn check_bounds(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfBounds { field, value, min, max });
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
