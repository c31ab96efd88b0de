// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workflow execution context.
//!
//! Every node executor receives a reference to this object. Variables, the
//! bench, and node outputs are shared across parallel branches
//! (last-writer-wins); parameters are immutable after dispatch. All
//! time-consuming calls observe the cancellation token.

use crate::deps::EngineDeps;
use crate::error::EngineError;
use crate::supervisor::{ProcessOutcome, SpawnSpec};
use gaffer_core::{Clock, Event, SessionId, Value, WorkflowId};
use gaffer_graph::{evaluate, render_template, EvalBudget, Resolver};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Output of an external command run through the context.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The per-workflow context handed to node executors.
pub struct ExecutionContext<C: Clock> {
    pub workflow_id: WorkflowId,
    pub session_id: SessionId,
    pub graph_name: String,
    params: BTreeMap<String, Value>,
    vars: Mutex<BTreeMap<String, Value>>,
    /// Seat number → allocated slot name.
    bench: Mutex<BTreeMap<u32, String>>,
    /// Completed node outputs, for `nodes.<id>.<port>` resolution.
    node_outputs: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    cancel: CancellationToken,
    pub(crate) deps: Arc<EngineDeps<C>>,
}

impl<C: Clock> ExecutionContext<C> {
    pub fn new(
        workflow_id: WorkflowId,
        session_id: SessionId,
        graph_name: impl Into<String>,
        params: BTreeMap<String, Value>,
        cancel: CancellationToken,
        deps: Arc<EngineDeps<C>>,
    ) -> Self {
        Self {
            workflow_id,
            session_id,
            graph_name: graph_name.into(),
            params,
            vars: Mutex::new(BTreeMap::new()),
            bench: Mutex::new(BTreeMap::new()),
            node_outputs: Mutex::new(BTreeMap::new()),
            cancel,
            deps,
        }
    }

    // --------------------------------------------------------- variables

    pub fn param(&self, name: &str) -> Option<Value> {
        self.params.get(name).cloned()
    }

    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.vars.lock().get(name).cloned()
    }

    pub fn set_var(&self, name: impl Into<String>, value: Value) {
        self.vars.lock().insert(name.into(), value);
    }

    pub fn vars_snapshot(&self) -> BTreeMap<String, Value> {
        self.vars.lock().clone()
    }

    pub fn restore_vars(&self, vars: BTreeMap<String, Value>) {
        *self.vars.lock() = vars;
    }

    // ------------------------------------------------------ node outputs

    pub fn record_node_outputs(&self, node_id: &str, outputs: BTreeMap<String, Value>) {
        self.node_outputs.lock().insert(node_id.to_string(), outputs);
    }

    pub fn node_output(&self, node_id: &str, port: &str) -> Option<Value> {
        self.node_outputs.lock().get(node_id).and_then(|outputs| outputs.get(port)).cloned()
    }

    pub fn node_outputs_snapshot(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.node_outputs.lock().clone()
    }

    pub fn restore_node_outputs(&self, outputs: BTreeMap<String, BTreeMap<String, Value>>) {
        *self.node_outputs.lock() = outputs;
    }

    pub fn clear_node_outputs(&self, node_ids: &[String]) {
        let mut outputs = self.node_outputs.lock();
        for id in node_ids {
            outputs.remove(id);
        }
    }

    // -------------------------------------------------------- evaluation

    /// Evaluate an expression against parameters, variables, and completed
    /// node outputs.
    pub fn evaluate(&self, source: &str) -> Result<Value, EngineError> {
        let resolver = self.resolver();
        Ok(evaluate(source, &resolver, &EvalBudget::standard())?)
    }

    /// Render a `{{…}}` template string.
    pub fn render(&self, template: &str) -> Result<String, EngineError> {
        let resolver = self.resolver();
        Ok(render_template(template, &resolver, &EvalBudget::standard())?)
    }

    fn resolver(&self) -> ScopeResolver {
        let mut nodes = BTreeMap::new();
        for (id, outputs) in self.node_outputs.lock().iter() {
            let filtered: BTreeMap<String, Value> = outputs
                .iter()
                .filter(|(_, v)| !matches!(v, Value::Trigger))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            nodes.insert(id.clone(), Value::Map(filtered));
        }
        ScopeResolver {
            params: self.params.clone(),
            vars: self.vars.lock().clone(),
            nodes: Value::Map(nodes),
        }
    }

    // ------------------------------------------------------------- agents

    /// Allocate a pool slot and seat it on the bench.
    pub async fn request_agent(
        &self,
        role: &str,
        timeout: Duration,
        seat: u32,
    ) -> Result<String, EngineError> {
        let name = self
            .deps
            .pool
            .request(role, timeout, self.workflow_id, &self.cancel)
            .await?;
        self.bench.lock().insert(seat, name.clone());
        Ok(name)
    }

    /// Release a slot by name, clearing any bench seat holding it.
    pub fn release_agent(&self, name: &str) {
        self.bench.lock().retain(|_, held| held != name);
        self.deps.pool.release(name);
    }

    pub fn bench_get(&self, seat: u32) -> Option<String> {
        self.bench.lock().get(&seat).cloned()
    }

    pub fn bench_set(&self, seat: u32, name: impl Into<String>) {
        self.bench.lock().insert(seat, name.into());
    }

    pub fn bench_remove(&self, seat: u32) -> Option<String> {
        self.bench.lock().remove(&seat)
    }

    pub fn bench_snapshot(&self) -> BTreeMap<u32, String> {
        self.bench.lock().clone()
    }

    /// Run an agent task on a named slot and return the captured reply.
    ///
    /// The backend recipe builds the command line; the supervisor owns the
    /// child. The slot is marked busy for the duration.
    pub async fn run_agent_task(
        &self,
        agent_name: &str,
        prompt: &str,
        stage: &str,
        role: &str,
        timeout: Option<Duration>,
    ) -> Result<String, EngineError> {
        let task = crate::backend::AgentTaskSpec {
            role: role.to_string(),
            prompt: prompt.to_string(),
            workspace_dir: self
                .deps
                .store
                .layout()
                .root()
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            stage: stage.to_string(),
            agent_name: agent_name.to_string(),
        };
        let recipe = self.deps.backend.build(&task);

        // Reply capture starts at the log's current end, so earlier runs on
        // this slot are not replayed.
        let log_path = self.deps.store.layout().agent_log(&self.session_id, agent_name);
        let log_offset = std::fs::metadata(&log_path).map(|m| m.len()).unwrap_or(0);

        self.deps.pool.mark_busy(agent_name);
        let (_, done) = self.deps.supervisor.start(SpawnSpec {
            command: recipe.command,
            cwd: recipe.cwd,
            env: recipe.env,
            owner: self.workflow_id,
            session_id: self.session_id,
            log_name: agent_name.to_string(),
            timeout,
        })?;

        let outcome = tokio::select! {
            outcome = done => outcome.map_err(|_| EngineError::WorkflowFailed("supervisor dropped completion".into()))?,
            _ = self.cancel.cancelled() => {
                self.deps.supervisor.stop_owner(self.workflow_id);
                return Err(EngineError::Cancelled);
            }
        };

        match outcome {
            ProcessOutcome::Exited { exit_code: Some(0) } => {
                // Reply is whatever the agent wrote to its log this run.
                let full = std::fs::read_to_string(&log_path).unwrap_or_default();
                let reply = full.get(log_offset as usize..).unwrap_or("");
                Ok(reply.trim_end().to_string())
            }
            ProcessOutcome::Exited { exit_code } => {
                Err(EngineError::ProcessCrashed { exit_code })
            }
            ProcessOutcome::TimedOut => Err(EngineError::ProcessTimeout {
                timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
            }),
            ProcessOutcome::KilledStuck { idle_ms } => Err(EngineError::ProcessStuck { idle_ms }),
            ProcessOutcome::Killed => Err(EngineError::Cancelled),
        }
    }

    // ------------------------------------------------------------ actions

    /// Execute an external command through the supervisor, capturing
    /// stdout/stderr/exit code. Supervision means command children are
    /// subject to stuck detection and the orphan sweep like agents.
    pub async fn run_command(
        &self,
        command: &str,
        cwd: Option<PathBuf>,
        timeout: Option<Duration>,
        log_name: &str,
    ) -> Result<CommandOutput, EngineError> {
        let log_path = self.deps.store.layout().agent_log(&self.session_id, log_name);
        let log_offset = std::fs::metadata(&log_path).map(|m| m.len()).unwrap_or(0);

        let (_, done) = self.deps.supervisor.start(SpawnSpec {
            command: command.to_string(),
            cwd,
            env: Vec::new(),
            owner: self.workflow_id,
            session_id: self.session_id,
            log_name: log_name.to_string(),
            timeout,
        })?;

        let outcome = tokio::select! {
            outcome = done => outcome.map_err(|_| EngineError::WorkflowFailed("supervisor dropped completion".into()))?,
            _ = self.cancel.cancelled() => {
                self.deps.supervisor.stop_owner(self.workflow_id);
                return Err(EngineError::Cancelled);
            }
        };

        match outcome {
            ProcessOutcome::Exited { exit_code } => {
                let full = std::fs::read_to_string(&log_path).unwrap_or_default();
                let captured = full.get(log_offset as usize..).unwrap_or("");
                let mut stdout = String::new();
                let mut stderr = String::new();
                for line in captured.lines() {
                    match line.strip_prefix("[stderr] ") {
                        Some(err_line) => {
                            stderr.push_str(err_line);
                            stderr.push('\n');
                        }
                        None => {
                            stdout.push_str(line);
                            stdout.push('\n');
                        }
                    }
                }
                Ok(CommandOutput { stdout, stderr, exit_code: exit_code.unwrap_or(-1) })
            }
            ProcessOutcome::TimedOut => Err(EngineError::ProcessTimeout {
                timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
            }),
            ProcessOutcome::KilledStuck { idle_ms } => Err(EngineError::ProcessStuck { idle_ms }),
            ProcessOutcome::Killed => Err(EngineError::Cancelled),
        }
    }

    /// Read a file relative to the workspace working directory.
    pub fn read_file(&self, path: &str) -> Result<String, EngineError> {
        let resolved = {
            let p = PathBuf::from(path);
            if p.is_absolute() {
                p
            } else {
                self.deps.store.layout().root().join(p)
            }
        };
        std::fs::read_to_string(&resolved).map_err(|source| {
            EngineError::Store(gaffer_storage::StoreError::Io { path: resolved, source })
        })
    }

    /// Block until an event on `topic` arrives or the timeout elapses.
    pub async fn wait_event(
        &self,
        topic: &str,
        timeout: Duration,
    ) -> Result<Event, EngineError> {
        let owner = self.deps.bus.owner();
        let mut rx = self.deps.bus.subscribe_channel(topic, owner);
        let result = tokio::select! {
            event = rx.recv() => event.ok_or(EngineError::EventWaitTimeout { topic: topic.to_string() }),
            _ = tokio::time::sleep(timeout) => {
                Err(EngineError::EventWaitTimeout { topic: topic.to_string() })
            }
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
        };
        self.deps.bus.unsubscribe_owner(owner);
        result
    }

    pub fn emit_event(&self, topic: &str, payload: serde_json::Value) {
        self.deps.bus.publish(Event::Custom { topic: topic.to_string(), payload });
    }

    /// Cancellation-aware sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), EngineError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
        }
    }

    /// True when the workflow was cancelled; executors bail at safe points.
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Append a line to the session's progress log.
    pub fn log(&self, line: &str) {
        if let Err(e) = self.deps.store.append_progress(&self.session_id, line) {
            tracing::warn!(error = %e, "failed to append progress log");
        }
    }
}

/// Resolves expression roots: parameters, then variables, then `nodes`.
struct ScopeResolver {
    params: BTreeMap<String, Value>,
    vars: BTreeMap<String, Value>,
    nodes: Value,
}

impl Resolver for ScopeResolver {
    fn lookup(&self, name: &str) -> Option<Value> {
        if name == "nodes" {
            return Some(self.nodes.clone());
        }
        self.vars.get(name).cloned().or_else(|| self.params.get(name).cloned())
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
