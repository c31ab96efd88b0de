// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type.
//!
//! Variants map one-to-one onto the stable wire codes; `code()` is what
//! crosses the IPC boundary and feeds node error policies.

use gaffer_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("pool request timed out for role '{role}'")]
    PoolTimeout { role: String },

    #[error("unknown role '{role}'")]
    PoolUnknownRole { role: String },

    #[error("cannot resize pool to {requested}: {reason}")]
    PoolShrinkConflict { requested: usize, reason: String },

    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("process exceeded its {timeout_ms}ms budget")]
    ProcessTimeout { timeout_ms: u64 },

    #[error("process killed after {idle_ms}ms without activity")]
    ProcessStuck { idle_ms: u64 },

    #[error("process crashed with exit code {exit_code:?}")]
    ProcessCrashed { exit_code: Option<i32> },

    #[error("workflow cancelled")]
    Cancelled,

    #[error("workflow failed: {0}")]
    WorkflowFailed(String),

    #[error("workflow timed out")]
    WorkflowTimeout,

    #[error("node '{node}' exhausted {attempts} attempt(s): {last_error}")]
    RetryExhausted { node: String, attempts: u32, last_error: String },

    #[error("expression error: {0}")]
    Expression(#[from] gaffer_graph::ExprError),

    #[error("script error in node '{node}': {message}")]
    Script { node: String, message: String },

    #[error("invalid transition: {0}")]
    BadTransition(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("subgraph depth {depth} exceeds bound {max}")]
    SubgraphTooDeep { depth: usize, max: usize },

    #[error(transparent)]
    Store(#[from] gaffer_storage::StoreError),

    #[error("event wait timed out for topic '{topic}'")]
    EventWaitTimeout { topic: String },
}

impl EngineError {
    /// The stable wire code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::PoolTimeout { .. } => ErrorCode::PoolTimeout,
            EngineError::EventWaitTimeout { .. } => ErrorCode::WorkflowTimeout,
            EngineError::PoolUnknownRole { .. } => ErrorCode::PoolUnknownRole,
            EngineError::PoolShrinkConflict { .. } => ErrorCode::PoolShrinkConflict,
            EngineError::SpawnFailed(_) => ErrorCode::ProcessSpawnFailed,
            EngineError::ProcessTimeout { .. } => ErrorCode::ProcessTimeout,
            EngineError::ProcessStuck { .. } => ErrorCode::ProcessStuck,
            EngineError::ProcessCrashed { .. } => ErrorCode::ProcessCrashed,
            EngineError::Cancelled => ErrorCode::WorkflowCancelled,
            EngineError::WorkflowFailed(_) => ErrorCode::WorkflowFailed,
            EngineError::WorkflowTimeout => ErrorCode::WorkflowTimeout,
            EngineError::RetryExhausted { .. } => ErrorCode::NodeRetryExhausted,
            EngineError::Expression(_) => ErrorCode::NodeExpressionError,
            EngineError::Script { .. } => ErrorCode::NodeScriptError,
            EngineError::BadTransition(_) => ErrorCode::SessionBadTransition,
            EngineError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            EngineError::Graph(_) => ErrorCode::ValidationGraph,
            EngineError::SubgraphTooDeep { .. } => ErrorCode::ValidationSubgraphTooDeep,
            EngineError::Store(e) => match e {
                gaffer_storage::StoreError::LockHeld { .. } => ErrorCode::StoreLockHeld,
                gaffer_storage::StoreError::SessionNotFound(_) => ErrorCode::SessionNotFound,
                _ => ErrorCode::StoreIoError,
            },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
