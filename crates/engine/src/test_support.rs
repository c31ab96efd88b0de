// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test fixtures for engine and integration tests.
//!
//! `Harness` assembles a full dependency bundle over a temp directory with
//! the mock backend and an in-memory graph source pre-seeded with minimal
//! session workflows (planning, revision, execute, single_task).

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use crate::backend::{AgentBackend, MockBackend};
use crate::bus::EventBus;
use crate::context::ExecutionContext;
use crate::deps::{EngineDeps, GraphSource};
use crate::error::EngineError;
use crate::interpreter::WorkflowEngine;
use crate::pool::{AgentPool, AnyRolePolicy};
use crate::session::SessionManager;
use crate::supervisor::ProcessSupervisor;
use gaffer_core::{DaemonConfig, Event, SessionId, SystemClock, Value, WorkflowId};
use gaffer_graph::{builtin_registry, load_graph, Graph, NodeRegistry};
use gaffer_storage::{Layout, StateStore};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PLANNING_GRAPH: &str = r#"
graph "planning" {
  node "entry" { type = "start" }
  node "draft" {
    type = "script"
    config { code = "return {plan: '# Plan: ' + requirement}" }
    output "plan" { type = "string" }
  }
  node "finish" {
    type = "end"
    input "in" { from = "draft.done" }
    input "plan" { from = "draft.plan" }
  }
  connect "c1" { from = "entry.out", to = "draft.in" }
}
"#;

const REVISION_GRAPH: &str = r#"
graph "revision" {
  node "entry" { type = "start" }
  node "redraft" {
    type = "script"
    config { code = "return {plan: plan + '\n- ' + feedback}" }
    output "plan" { type = "string" }
  }
  node "finish" {
    type = "end"
    input "in" { from = "redraft.done" }
    input "plan" { from = "redraft.plan" }
  }
  connect "c1" { from = "entry.out", to = "redraft.in" }
}
"#;

const EXECUTE_GRAPH: &str = r#"
graph "execute" {
  node "entry" { type = "start" }
  node "work" {
    type = "log"
    config { message = "executing {{session_id}}" }
  }
  node "finish" {
    type = "end"
    input "in" { from = "work.out" }
  }
  connect "c1" { from = "entry.out", to = "work.in" }
}
"#;

const SINGLE_TASK_GRAPH: &str = r#"
graph "single_task" {
  node "entry" { type = "start" }
  node "task" {
    type = "script"
    config { code = "return {done_task: task_id}" }
    output "done_task" { type = "string" }
  }
  node "finish" {
    type = "end"
    input "in" { from = "task.done" }
    input "done_task" { from = "task.done_task" }
  }
  connect "c1" { from = "entry.out", to = "task.in" }
}
"#;

/// In-memory graph source, seeded with named HCL documents.
pub struct StaticGraphSource {
    registry: Arc<NodeRegistry>,
    graphs: Mutex<HashMap<String, Graph>>,
}

impl StaticGraphSource {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry, graphs: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, name: &str, hcl: &str) {
        let (graph, _) = load_graph(hcl, &self.registry).expect("test graph loads");
        self.graphs.lock().insert(name.to_string(), graph);
    }
}

impl GraphSource for StaticGraphSource {
    fn load(&self, name: &str) -> Result<Graph, EngineError> {
        let key = name.trim_end_matches(".hcl");
        self.graphs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::Graph(format!("no such graph '{name}'")))
    }
}

/// Builder for [`Harness`].
pub struct HarnessBuilder {
    pool_size: usize,
    rest: Duration,
    stuck_threshold: Duration,
    backend: Option<Arc<dyn AgentBackend>>,
    config: DaemonConfig,
    root: Option<std::path::PathBuf>,
}

impl HarnessBuilder {
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn rest(mut self, rest: Duration) -> Self {
        self.rest = rest;
        self
    }

    pub fn stuck_threshold(mut self, threshold: Duration) -> Self {
        self.stuck_threshold = threshold;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn AgentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(mut self, config: DaemonConfig) -> Self {
        self.config = config;
        self
    }

    /// Build over an existing workspace root instead of a fresh tempdir
    /// (restart-shaped tests run two stacks over one directory).
    pub fn at(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn build(self) -> Harness {
        let (dir, root) = match self.root {
            Some(root) => (None, root),
            None => {
                let dir = tempfile::tempdir().expect("tempdir");
                let root = dir.path().to_path_buf();
                (Some(dir), root)
            }
        };
        let store = Arc::new(StateStore::new(Layout::new(root.join("_AiDevLog"))));
        store.load().expect("store loads");

        let bus = EventBus::new();
        let clock = SystemClock;
        let pool = AgentPool::new(
            self.pool_size,
            self.rest,
            Arc::new(AnyRolePolicy),
            clock.clone(),
            bus.clone(),
            Arc::clone(&store),
        )
        .expect("pool builds");
        let supervisor = ProcessSupervisor::new(
            clock.clone(),
            bus.clone(),
            Arc::clone(&store),
            self.stuck_threshold,
        );

        let registry = Arc::new(builtin_registry());
        let graphs = Arc::new(StaticGraphSource::new(Arc::clone(&registry)));
        graphs.insert("planning", PLANNING_GRAPH);
        graphs.insert("revision", REVISION_GRAPH);
        graphs.insert("execute", EXECUTE_GRAPH);
        graphs.insert("single_task", SINGLE_TASK_GRAPH);

        let deps = Arc::new(EngineDeps {
            clock,
            config: self.config,
            bus,
            store,
            pool,
            supervisor,
            backend: self.backend.unwrap_or_else(|| Arc::new(MockBackend::default())),
            registry,
            graphs: Arc::clone(&graphs) as Arc<dyn GraphSource>,
        });

        Harness { dir, graphs, deps }
    }
}

/// A complete engine over a temp workspace.
pub struct Harness {
    pub dir: Option<tempfile::TempDir>,
    pub graphs: Arc<StaticGraphSource>,
    pub deps: Arc<EngineDeps<SystemClock>>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            pool_size: 2,
            rest: Duration::ZERO,
            stuck_threshold: Duration::from_secs(600),
            backend: None,
            config: DaemonConfig::default(),
            root: None,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn pool(&self) -> &AgentPool<SystemClock> {
        &self.deps.pool
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<SystemClock> {
        &self.deps.supervisor
    }

    pub fn bus(&self) -> &EventBus {
        &self.deps.bus
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.deps.store
    }

    pub fn engine(&self) -> WorkflowEngine<SystemClock> {
        WorkflowEngine::new(Arc::clone(&self.deps))
    }

    pub fn manager(&self) -> SessionManager<SystemClock> {
        SessionManager::new(Arc::clone(&self.deps))
    }

    /// Collect events on a topic pattern into a channel.
    pub fn collect(&self, pattern: &str) -> tokio::sync::mpsc::UnboundedReceiver<Event> {
        let owner = self.deps.bus.owner();
        self.deps.bus.subscribe_channel(pattern, owner)
    }

    /// Parse a graph document against the builtin registry.
    pub fn graph(&self, hcl: &str) -> Graph {
        load_graph(hcl, &self.deps.registry).expect("test graph loads").0
    }

    /// Fresh context for an ad-hoc workflow run.
    pub fn context(&self, params: BTreeMap<String, Value>) -> Arc<ExecutionContext<SystemClock>> {
        let session_id = SessionId::new();
        // Session directory must exist for progress/agent logs.
        let session = gaffer_core::Session::new(session_id, "fixture".into(), vec![], 0);
        self.deps.store.save_session(&session).expect("session saves");
        self.context_in(session_id, params)
    }

    /// Context bound to an existing session (checkpoint-resume tests).
    pub fn context_in(
        &self,
        session_id: SessionId,
        params: BTreeMap<String, Value>,
    ) -> Arc<ExecutionContext<SystemClock>> {
        Arc::new(ExecutionContext::new(
            WorkflowId::new(),
            session_id,
            "fixture",
            params,
            CancellationToken::new(),
            Arc::clone(&self.deps),
        ))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll until `condition` holds, failing after ~2 seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
