// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Gaffer coordination engine.
//!
//! Everything between the IPC surface and the filesystem: the agent pool,
//! the process supervisor, the in-process event bus, the workflow
//! interpreter with its node executors, the session manager, and the
//! coordinator that turns completion events into next-step dispatches.
//!
//! Components are constructed explicitly and wired through [`EngineDeps`];
//! there are no process-global registries, so tests may run several
//! independent engines in one process.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod backend;
pub mod bus;
pub mod context;
pub mod coordinator;
pub mod deps;
pub mod error;
pub mod executors;
pub mod interpreter;
pub mod pool;
pub mod session;
pub mod supervisor;

pub use backend::{backend_for, AgentBackend, AgentTaskSpec, ClaudeBackend, CommandRecipe};
pub use bus::{Dispatch, EventBus, OwnerToken};
pub use context::ExecutionContext;
pub use coordinator::{Coordinator, CoordinatorState, UserCommand};
pub use deps::{EngineDeps, FileGraphSource, GraphSource};
pub use error::EngineError;
pub use interpreter::{DebugController, DebugOptions, WorkflowEngine, WorkflowResult};
pub use pool::{AgentPool, AnyRolePolicy, RolePolicy};
pub use session::SessionManager;
pub use supervisor::{ProcessOutcome, ProcessSupervisor, SpawnSpec};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(any(test, feature = "test-support"))]
pub use backend::MockBackend;
