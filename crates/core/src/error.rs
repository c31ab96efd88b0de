// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System-wide error type with stable, machine-readable codes.
//!
//! Every variant maps to a wire code that external clients switch on. The
//! codes are part of the IPC contract and must not change once shipped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes carried over IPC and in events. Serializes as the
/// dotted wire form (`pool.timeout`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationGraph,
    ValidationConfig,
    ValidationSubgraphTooDeep,
    PoolTimeout,
    PoolUnknownRole,
    PoolShrinkConflict,
    ProcessSpawnFailed,
    ProcessTimeout,
    ProcessStuck,
    ProcessCrashed,
    WorkflowCancelled,
    WorkflowFailed,
    WorkflowTimeout,
    NodeRetryExhausted,
    NodeExpressionError,
    NodeScriptError,
    SessionBadTransition,
    SessionNotFound,
    IpcProtocolError,
    IpcUnknownMethod,
    StoreLockHeld,
    StoreIoError,
}

impl ErrorCode {
    /// The dotted wire form, e.g. `pool.timeout`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationGraph => "validation.graph",
            ErrorCode::ValidationConfig => "validation.config",
            ErrorCode::ValidationSubgraphTooDeep => "validation.subgraph_too_deep",
            ErrorCode::PoolTimeout => "pool.timeout",
            ErrorCode::PoolUnknownRole => "pool.unknown_role",
            ErrorCode::PoolShrinkConflict => "pool.shrink_conflict",
            ErrorCode::ProcessSpawnFailed => "process.spawn_failed",
            ErrorCode::ProcessTimeout => "process.timeout",
            ErrorCode::ProcessStuck => "process.stuck",
            ErrorCode::ProcessCrashed => "process.crashed",
            ErrorCode::WorkflowCancelled => "workflow.cancelled",
            ErrorCode::WorkflowFailed => "workflow.failed",
            ErrorCode::WorkflowTimeout => "workflow.timeout",
            ErrorCode::NodeRetryExhausted => "node.retry_exhausted",
            ErrorCode::NodeExpressionError => "node.expression_error",
            ErrorCode::NodeScriptError => "node.script_error",
            ErrorCode::SessionBadTransition => "session.bad_transition",
            ErrorCode::SessionNotFound => "session.not_found",
            ErrorCode::IpcProtocolError => "ipc.protocol_error",
            ErrorCode::IpcUnknownMethod => "ipc.unknown_method",
            ErrorCode::StoreLockHeld => "store.lock_held",
            ErrorCode::StoreIoError => "store.io_error",
        }
    }
}

impl ErrorCode {
    /// Parse the dotted wire form.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "validation.graph" => ErrorCode::ValidationGraph,
            "validation.config" => ErrorCode::ValidationConfig,
            "validation.subgraph_too_deep" => ErrorCode::ValidationSubgraphTooDeep,
            "pool.timeout" => ErrorCode::PoolTimeout,
            "pool.unknown_role" => ErrorCode::PoolUnknownRole,
            "pool.shrink_conflict" => ErrorCode::PoolShrinkConflict,
            "process.spawn_failed" => ErrorCode::ProcessSpawnFailed,
            "process.timeout" => ErrorCode::ProcessTimeout,
            "process.stuck" => ErrorCode::ProcessStuck,
            "process.crashed" => ErrorCode::ProcessCrashed,
            "workflow.cancelled" => ErrorCode::WorkflowCancelled,
            "workflow.failed" => ErrorCode::WorkflowFailed,
            "workflow.timeout" => ErrorCode::WorkflowTimeout,
            "node.retry_exhausted" => ErrorCode::NodeRetryExhausted,
            "node.expression_error" => ErrorCode::NodeExpressionError,
            "node.script_error" => ErrorCode::NodeScriptError,
            "session.bad_transition" => ErrorCode::SessionBadTransition,
            "session.not_found" => ErrorCode::SessionNotFound,
            "ipc.protocol_error" => ErrorCode::IpcProtocolError,
            "ipc.unknown_method" => ErrorCode::IpcUnknownMethod,
            "store.lock_held" => ErrorCode::StoreLockHeld,
            "store.io_error" => ErrorCode::StoreIoError,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ErrorCode::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code '{s}'")))
    }
}

/// A coded error suitable for crossing the IPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct GafferError {
    pub code: ErrorCode,
    pub message: String,
}

impl GafferError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
