// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed request methods.
//!
//! The envelope carries `method` as a string and `params` as loose JSON;
//! [`Method::from_parts`] narrows the pair into this enum so the daemon
//! dispatch is exhaustive and misspelled methods become
//! `ipc.unknown_method`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    // -- sessions --
    CreateSession {
        requirement: String,
        #[serde(default)]
        docs: Vec<PathBuf>,
    },
    ReviseSession {
        id: String,
        feedback: String,
    },
    ApproveSession {
        id: String,
        #[serde(default)]
        auto_start: bool,
    },
    PauseSession {
        id: String,
    },
    ResumeSession {
        id: String,
    },
    StopSession {
        id: String,
    },
    CancelSession {
        id: String,
    },
    RetryTask {
        id: String,
        task_id: String,
    },
    ReopenSession {
        id: String,
    },
    DeleteSession {
        id: String,
    },
    GetSession {
        id: String,
    },
    ListSessions,
    /// Plan text for a version (current when omitted).
    ReadPlan {
        id: String,
        #[serde(default)]
        version: Option<u32>,
    },

    // -- pool --
    PoolStatus,
    PoolResize {
        size: usize,
    },

    // -- workflows --
    PauseWorkflow {
        id: String,
    },
    ResumeWorkflow {
        id: String,
    },
    StopWorkflow {
        id: String,
    },

    /// Full UI-facing state snapshot.
    Snapshot,
}

impl Method {
    /// Narrow an envelope's `(method, params)` pair.
    pub fn from_parts(
        method: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        // Unit variants (no params) deserialize from the bare method name.
        let no_params =
            params.map(|p| p.as_object().map(|o| o.is_empty()).unwrap_or(false)).unwrap_or(true);
        if no_params {
            if let Ok(method) = serde_json::from_value(serde_json::Value::String(method.into())) {
                return Ok(method);
            }
        }
        let params = params.cloned().unwrap_or(serde_json::Value::Object(Default::default()));
        let tagged = serde_json::json!({ method: params });
        serde_json::from_value(tagged)
    }

    /// The envelope `(method, params)` pair for this call.
    pub fn to_parts(&self) -> (String, serde_json::Value) {
        // Externally-tagged serialization: { "<method>": { ...params } }
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) if map.len() == 1 => {
                // Non-empty struct variants.
                #[allow(clippy::unwrap_used)] // len()==1 checked above
                let (name, params) = map.into_iter().next().unwrap();
                (name, params)
            }
            Ok(serde_json::Value::String(name)) => {
                // Unit variants serialize as a bare string.
                (name, serde_json::Value::Object(Default::default()))
            }
            _ => ("invalid".to_string(), serde_json::Value::Null),
        }
    }

    /// Method name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Method::CreateSession { .. } => "create_session",
            Method::ReviseSession { .. } => "revise_session",
            Method::ApproveSession { .. } => "approve_session",
            Method::PauseSession { .. } => "pause_session",
            Method::ResumeSession { .. } => "resume_session",
            Method::StopSession { .. } => "stop_session",
            Method::CancelSession { .. } => "cancel_session",
            Method::RetryTask { .. } => "retry_task",
            Method::ReopenSession { .. } => "reopen_session",
            Method::DeleteSession { .. } => "delete_session",
            Method::GetSession { .. } => "get_session",
            Method::ListSessions => "list_sessions",
            Method::ReadPlan { .. } => "read_plan",
            Method::PoolStatus => "pool_status",
            Method::PoolResize { .. } => "pool_resize",
            Method::PauseWorkflow { .. } => "pause_workflow",
            Method::ResumeWorkflow { .. } => "resume_workflow",
            Method::StopWorkflow { .. } => "stop_workflow",
            Method::Snapshot => "snapshot",
        }
    }
}

#[cfg(test)]
#[path = "method_tests.rs"]
mod tests;
