// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow interpreter.
//!
//! Walks a node graph against an execution context. Eligibility: a node
//! runs when every incoming data connection has a completed source and at
//! least one incoming trigger edge has fired (nodes without trigger inputs,
//! like `start`, are trigger-satisfied from the outset). Eligible nodes on
//! disjoint branches run concurrently; completions are processed one at a
//! time by the interpreter loop.
//!
//! Trigger firings are recorded as `Trigger`-valued entries in node output
//! maps, which makes them checkpointable without persisting sentinels.

use crate::context::ExecutionContext;
use crate::deps::EngineDeps;
use crate::error::EngineError;
use crate::executors::execute_node;
use gaffer_core::{Checkpoint, Clock, Event, Value, WorkflowStatus};
use gaffer_graph::{
    ErrorPolicy, Graph, NodeInstance, SENTINEL_BRANCH, SENTINEL_LOOP, SENTINEL_PARALLEL,
    SENTINEL_SUBGRAPH, SENTINEL_SYNC,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

type Outputs = BTreeMap<String, Value>;

/// Debug-mode options: step-through, breakpoints, and mock executors.
#[derive(Default)]
pub struct DebugOptions {
    pub breakpoints: HashSet<String>,
    /// Node id → canned outputs. Mocked runs never persist checkpoints.
    pub mocks: HashMap<String, Outputs>,
    /// Pause before every node, not only at breakpoints.
    pub step: bool,
}

impl DebugOptions {
    pub fn is_mocked(&self) -> bool {
        !self.mocks.is_empty()
    }
}

/// Client half of the step gate.
#[derive(Clone)]
pub struct DebugController {
    permits: mpsc::UnboundedSender<()>,
}

impl DebugController {
    pub fn new() -> (Self, DebugGate) {
        let (permits, rx) = mpsc::unbounded_channel();
        (Self { permits }, DebugGate { rx })
    }

    /// Allow the interpreter to run one more node.
    pub fn step(&self) {
        let _ = self.permits.send(());
    }
}

/// Interpreter half of the step gate.
pub struct DebugGate {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Options for one interpreter run.
#[derive(Default)]
pub struct RunOptions {
    pub resume: Option<Checkpoint>,
    pub debug: Option<(DebugOptions, DebugGate)>,
    /// Pause gate; `true` suspends scheduling of new nodes.
    pub pause: Option<watch::Receiver<bool>>,
    /// Subgraph nesting depth of this run.
    pub depth: usize,
}

/// Structured result of one workflow run.
#[derive(Debug)]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    /// The end node's gathered non-trigger inputs.
    pub outputs: Outputs,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub node_results: BTreeMap<String, Outputs>,
    pub completed: BTreeSet<String>,
}

impl WorkflowResult {
    pub fn success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}

enum Verdict {
    Completed(Outputs),
    Skipped(Outputs),
    Failed(EngineError),
    Goto(String, EngineError),
}

struct LoopState {
    kind: LoopKind,
    index: usize,
    results: Vec<Value>,
    body: BTreeSet<String>,
}

enum LoopKind {
    For { items: Vec<Value> },
    While { condition: String, max: usize },
}

struct RunState {
    completed: BTreeSet<String>,
    running: HashSet<String>,
    /// Nodes that failed under a goto policy; never rescheduled.
    failed_nodes: HashSet<String>,
    /// Fired trigger ports: (node id, output port).
    fired: HashSet<(String, String)>,
    loops: HashMap<String, LoopState>,
    /// Targets forced runnable by goto policies.
    goto_ready: VecDeque<String>,
    failed: Option<EngineError>,
}

/// The workflow execution engine.
pub struct WorkflowEngine<C: Clock> {
    deps: Arc<EngineDeps<C>>,
}

impl<C: Clock> Clone for WorkflowEngine<C> {
    fn clone(&self) -> Self {
        Self { deps: Arc::clone(&self.deps) }
    }
}

impl<C: Clock> WorkflowEngine<C> {
    pub fn new(deps: Arc<EngineDeps<C>>) -> Self {
        Self { deps }
    }

    /// Interpret `graph` to completion against `ctx`.
    pub fn run<'a>(
        &'a self,
        graph: &'a Graph,
        ctx: Arc<ExecutionContext<C>>,
        mut options: RunOptions,
    ) -> Pin<Box<dyn Future<Output = WorkflowResult> + Send + 'a>> {
        Box::pin(async move {
        let mut state = RunState {
            completed: BTreeSet::new(),
            running: HashSet::new(),
            failed_nodes: HashSet::new(),
            fired: HashSet::new(),
            loops: HashMap::new(),
            goto_ready: VecDeque::new(),
            failed: None,
        };

        // Checkpoint rehydration: completed nodes are not re-executed and
        // variables resume with identical values. Fired trigger edges are
        // reconstructed from the Trigger entries in recorded outputs.
        if let Some(ckpt) = options.resume.take() {
            state.completed = ckpt.completed_nodes.clone();
            ctx.restore_vars(ckpt.variables.clone());
            ctx.restore_node_outputs(ckpt.node_results.clone());
            for (node_id, outputs) in &ckpt.node_results {
                for (port, value) in outputs {
                    if matches!(value, Value::Trigger) {
                        state.fired.insert((node_id.clone(), port.clone()));
                    }
                }
            }
        }

        let (debug, mut gate) = match options.debug.take() {
            Some((debug, gate)) => (Some(debug), Some(gate)),
            None => (None, None),
        };
        let checkpoints_enabled =
            options.depth == 0 && debug.as_ref().map(|d| !d.is_mocked()).unwrap_or(true);

        let mut tasks: JoinSet<(String, Verdict)> = JoinSet::new();

        'drive: loop {
            if ctx.should_stop() && state.failed.is_none() {
                break;
            }

            // Pause gate: hold scheduling while paused.
            if let Some(pause) = options.pause.as_mut() {
                while *pause.borrow() {
                    tokio::select! {
                        changed = pause.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = ctx.cancel_token().cancelled() => break 'drive,
                    }
                }
            }

            // Schedule everything currently eligible.
            let eligible = self.eligible_nodes(graph, &state);
            for node_id in eligible {
                let Some(node) = graph.node(&node_id) else { continue };

                // Debug gating: breakpoints and step mode pause before the
                // node runs.
                if let (Some(debug), Some(gate)) = (debug.as_ref(), gate.as_mut()) {
                    let at_breakpoint = debug.breakpoints.contains(&node_id);
                    if debug.step || at_breakpoint {
                        let event = if at_breakpoint {
                            Event::Breakpoint {
                                workflow_id: ctx.workflow_id,
                                node_id: node_id.clone(),
                            }
                        } else {
                            Event::Step { workflow_id: ctx.workflow_id, node_id: node_id.clone() }
                        };
                        self.deps.bus.publish(event);
                        tokio::select! {
                            permit = gate.rx.recv() => {
                                if permit.is_none() {
                                    break 'drive;
                                }
                            }
                            _ = ctx.cancel_token().cancelled() => break 'drive,
                        }
                    }
                }

                state.running.insert(node_id.clone());
                self.deps.bus.publish(Event::NodeStart {
                    workflow_id: ctx.workflow_id,
                    node_id: node_id.clone(),
                    node_type: node.node_type.clone(),
                });
                ctx.log(&format!("node_start {node_id}"));

                let engine = self.clone();
                let node = node.clone();
                let inputs = gather_inputs(graph, &node, &ctx);
                let ctx = Arc::clone(&ctx);
                let mock = debug.as_ref().and_then(|d| d.mocks.get(&node_id).cloned());
                let depth = options.depth;
                tasks.spawn(async move {
                    let id = node.id.clone();
                    let verdict = engine.run_one(&node, inputs, &ctx, mock, depth).await;
                    (id, verdict)
                });
            }

            if tasks.is_empty() {
                break;
            }

            // Process one completion.
            let Some(joined) = tasks.join_next().await else { break };
            let (node_id, verdict) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "node task join error");
                    state.failed =
                        Some(EngineError::WorkflowFailed(format!("node task panicked: {e}")));
                    break;
                }
            };
            state.running.remove(&node_id);

            match verdict {
                Verdict::Completed(outputs) => {
                    if let Err(e) = self.handle_completion(
                        graph,
                        &node_id,
                        outputs,
                        &mut state,
                        &ctx,
                        debug.as_ref(),
                        checkpoints_enabled,
                    ) {
                        state.failed = Some(e);
                        ctx.cancel_token().cancel();
                        break;
                    }
                }
                Verdict::Skipped(outputs) => {
                    tracing::warn!(node = %node_id, "node error masked by skip policy");
                    ctx.log(&format!("node_skipped {node_id}"));
                    self.record_completion(graph, &node_id, outputs, &mut state, &ctx);
                }
                Verdict::Failed(error) => {
                    self.deps.bus.publish(Event::NodeError {
                        workflow_id: ctx.workflow_id,
                        node_id: node_id.clone(),
                        error: error.to_string(),
                    });
                    self.deps.bus.publish(Event::TaskFailed {
                        session_id: ctx.session_id,
                        workflow_id: ctx.workflow_id,
                        task_id: Some(node_id.clone()),
                        error_code: error.code().as_str().to_string(),
                        error: error.to_string(),
                        retry_available: false,
                    });
                    ctx.log(&format!("node_failed {node_id}: {error}"));
                    if !matches!(error, EngineError::Cancelled) {
                        state.failed = Some(error);
                        // Stop in-flight siblings.
                        ctx.cancel_token().cancel();
                    }
                    break;
                }
                Verdict::Goto(target, error) => {
                    tracing::warn!(node = %node_id, target = %target, error = %error, "goto policy");
                    self.deps.bus.publish(Event::NodeError {
                        workflow_id: ctx.workflow_id,
                        node_id: node_id.clone(),
                        error: error.to_string(),
                    });
                    ctx.log(&format!("node_goto {node_id} -> {target}"));
                    state.failed_nodes.insert(node_id.clone());
                    if graph.node(&target).is_some() {
                        state.goto_ready.push_back(target);
                    } else {
                        state.failed = Some(EngineError::Graph(format!(
                            "goto target '{target}' does not exist"
                        )));
                        break;
                    }
                }
            }
        }

        // Drain any stragglers (cancelled or post-failure).
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        let status = if let Some(ref error) = state.failed {
            tracing::warn!(workflow = %ctx.workflow_id, error = %error, "workflow failed");
            WorkflowStatus::Failed
        } else if ctx.should_stop() {
            WorkflowStatus::Cancelled
        } else {
            WorkflowStatus::Completed
        };

        let outputs = graph
            .nodes
            .values()
            .find(|n| n.node_type == "end" && state.completed.contains(&n.id))
            .and_then(|n| ctx.node_outputs_snapshot().get(&n.id).cloned())
            .unwrap_or_default();

        let (error_code, error) = match (&status, &state.failed) {
            (WorkflowStatus::Failed, Some(e)) => {
                (Some(e.code().as_str().to_string()), Some(e.to_string()))
            }
            (WorkflowStatus::Cancelled, _) => {
                (Some("workflow.cancelled".to_string()), Some("workflow cancelled".to_string()))
            }
            _ => (None, None),
        };

        WorkflowResult {
            status,
            outputs,
            error_code,
            error,
            node_results: ctx.node_outputs_snapshot(),
            completed: state.completed,
        }
        })
    }

    // -------------------------------------------------------- eligibility

    fn eligible_nodes(&self, graph: &Graph, state: &RunState) -> Vec<String> {
        let mut eligible: Vec<String> = Vec::new();

        // Goto targets bypass data-flow gathering.
        let mut seen_goto = HashSet::new();
        for target in &state.goto_ready {
            if !state.completed.contains(target) && !state.running.contains(target) {
                seen_goto.insert(target.clone());
                eligible.push(target.clone());
            }
        }

        for node in graph.nodes.values() {
            if state.completed.contains(&node.id)
                || state.running.contains(&node.id)
                || state.failed_nodes.contains(&node.id)
                || seen_goto.contains(&node.id)
                || node.node_type == "note"
            {
                continue;
            }

            let is_loop = matches!(node.node_type.as_str(), "for_loop" | "while_loop");
            let mut trigger_conns = Vec::new();
            let mut data_conns = Vec::new();
            for conn in graph.incoming(&node.id) {
                let Some(port) = node.input_port(&conn.to_port) else { continue };
                if port.data_type == gaffer_graph::DataType::Trigger {
                    // Loop back-edges are handled by the loop state machine.
                    if is_loop && conn.to_port == "continue" {
                        continue;
                    }
                    trigger_conns.push(conn);
                } else {
                    data_conns.push(conn);
                }
            }

            let has_trigger_inputs = node
                .trigger_inputs()
                .any(|p| !(is_loop && p.id == "continue"));
            let trigger_ok = if !has_trigger_inputs {
                true
            } else if trigger_conns.is_empty() {
                false
            } else if node.node_type == "sync"
                && crate::executors::sync_mode(node) == "all"
            {
                trigger_conns
                    .iter()
                    .all(|c| state.fired.contains(&(c.from_node.clone(), c.from_port.clone())))
            } else {
                trigger_conns
                    .iter()
                    .any(|c| state.fired.contains(&(c.from_node.clone(), c.from_port.clone())))
            };
            if !trigger_ok {
                continue;
            }

            let data_ok = data_conns
                .iter()
                .all(|c| state.completed.contains(c.from_node.as_str()));
            if !data_ok {
                continue;
            }

            eligible.push(node.id.clone());
        }

        eligible
    }

    // ----------------------------------------------------- node execution

    /// Run one node under its timeout and error policy.
    async fn run_one(
        &self,
        node: &NodeInstance,
        inputs: Outputs,
        ctx: &Arc<ExecutionContext<C>>,
        mock: Option<Outputs>,
        depth: usize,
    ) -> Verdict {
        if let Some(mut outputs) = mock {
            // Mocked nodes still sequence downstream flow.
            for port in node.trigger_outputs() {
                outputs.entry(port.id.clone()).or_insert(Value::Trigger);
            }
            return Verdict::Completed(outputs);
        }

        let (max_attempts, delay) = match &node.on_error {
            ErrorPolicy::Retry { max_retries, delay_ms } => {
                (1 + *max_retries, Duration::from_millis(*delay_ms))
            }
            _ => (1, Duration::ZERO),
        };

        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            let budget = node.timeout_ms.map(Duration::from_millis);
            let executed = match budget {
                Some(budget) => {
                    match tokio::time::timeout(budget, execute_node(node, &inputs, ctx)).await {
                        Ok(result) => result,
                        Err(_) => Err(EngineError::WorkflowTimeout),
                    }
                }
                None => execute_node(node, &inputs, ctx).await,
            };

            match executed {
                Ok(mut outputs) => {
                    // Inline subgraph runs feed failures back into this
                    // node's policy.
                    if let Some(Value::Map(payload)) = outputs.remove(SENTINEL_SUBGRAPH) {
                        match self.run_subgraph(&payload, ctx, depth).await {
                            Ok(sub_outputs) => {
                                outputs.insert("out".to_string(), Value::Trigger);
                                outputs
                                    .insert("result".to_string(), Value::Map(sub_outputs));
                            }
                            Err(e) => {
                                if matches!(e, EngineError::Cancelled) {
                                    return Verdict::Failed(e);
                                }
                                if attempt < max_attempts {
                                    tokio::time::sleep(delay).await;
                                    continue;
                                }
                                break e;
                            }
                        }
                    }
                    return Verdict::Completed(outputs);
                }
                Err(EngineError::Cancelled) => return Verdict::Failed(EngineError::Cancelled),
                Err(e) => {
                    if attempt < max_attempts && !ctx.should_stop() {
                        tracing::warn!(node = %node.id, attempt, error = %e, "retrying node");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    break e;
                }
            }
        };

        match &node.on_error {
            ErrorPolicy::Retry { .. } => Verdict::Failed(EngineError::RetryExhausted {
                node: node.id.clone(),
                attempts: attempt,
                last_error: last_error.to_string(),
            }),
            ErrorPolicy::Skip { default } => {
                let mut outputs: Outputs = BTreeMap::new();
                if let Some(default) = default {
                    match Value::from_json(default) {
                        Value::Map(entries) => outputs.extend(entries),
                        other => {
                            outputs.insert("result".to_string(), other);
                        }
                    }
                }
                for port in node.trigger_outputs() {
                    outputs.entry(port.id.clone()).or_insert(Value::Trigger);
                }
                Verdict::Skipped(outputs)
            }
            ErrorPolicy::Goto { target } => Verdict::Goto(target.clone(), last_error),
            ErrorPolicy::Abort => Verdict::Failed(last_error),
        }
    }

    // ------------------------------------------------- completion handling

    #[allow(clippy::too_many_arguments)]
    fn handle_completion(
        &self,
        graph: &Graph,
        node_id: &str,
        mut outputs: Outputs,
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
        debug: Option<&DebugOptions>,
        checkpoints_enabled: bool,
    ) -> Result<(), EngineError> {
        // Interpret control-flow sentinels into trigger firings.
        if let Some(Value::String(branch)) = outputs.remove(SENTINEL_BRANCH) {
            outputs.insert(branch, Value::Trigger);
        }
        if let Some(Value::List(branches)) = outputs.remove(SENTINEL_PARALLEL) {
            for branch in branches {
                outputs.insert(branch.coerce_string(), Value::Trigger);
            }
        }
        outputs.remove(SENTINEL_SYNC);

        if let Some(Value::Map(payload)) = outputs.remove(SENTINEL_LOOP) {
            self.init_loop(graph, node_id, &payload, state, ctx)?;
            // init_loop records outputs itself.
            self.after_node(graph, node_id, state, ctx, debug, checkpoints_enabled);
            return Ok(());
        }

        self.record_outputs_and_fire(graph, node_id, outputs, state, ctx, debug);
        self.after_node(graph, node_id, state, ctx, debug, checkpoints_enabled);
        Ok(())
    }

    /// Shared tail for skip-path completions.
    fn record_completion(
        &self,
        graph: &Graph,
        node_id: &str,
        outputs: Outputs,
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
    ) {
        self.record_outputs_and_fire(graph, node_id, outputs, state, ctx, None);
        self.after_node(graph, node_id, state, ctx, None, false);
    }

    fn record_outputs_and_fire(
        &self,
        graph: &Graph,
        node_id: &str,
        outputs: Outputs,
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
        debug: Option<&DebugOptions>,
    ) {
        state.completed.insert(node_id.to_string());
        let fired_ports: Vec<String> = outputs
            .iter()
            .filter(|(_, v)| matches!(v, Value::Trigger))
            .map(|(k, _)| k.clone())
            .collect();

        if debug.is_some() {
            for (port, value) in &outputs {
                if !matches!(value, Value::Trigger) {
                    self.deps.bus.publish(Event::PortValue {
                        workflow_id: ctx.workflow_id,
                        node_id: node_id.to_string(),
                        port: port.clone(),
                        value: value.to_json(),
                    });
                }
            }
        }

        ctx.record_node_outputs(node_id, outputs);

        for port in fired_ports {
            self.fire_port(graph, node_id, &port, state, ctx);
        }
    }

    /// Mark a trigger port fired and route loop back-edges.
    fn fire_port(
        &self,
        graph: &Graph,
        node_id: &str,
        port: &str,
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
    ) {
        state.fired.insert((node_id.to_string(), port.to_string()));
        let back_edges: Vec<(String, String)> = graph
            .outgoing_from_port(node_id, port)
            .filter(|c| {
                c.to_port == "continue"
                    && graph
                        .node(&c.to_node)
                        .map(|n| matches!(n.node_type.as_str(), "for_loop" | "while_loop"))
                        .unwrap_or(false)
            })
            .map(|c| (c.to_node.clone(), c.from_node.clone()))
            .collect();
        for (loop_id, via_node) in back_edges {
            self.loop_continue(graph, &loop_id, &via_node, state, ctx);
        }
    }

    fn after_node(
        &self,
        graph: &Graph,
        node_id: &str,
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
        debug: Option<&DebugOptions>,
        checkpoints_enabled: bool,
    ) {
        self.deps.bus.publish(Event::NodeComplete {
            workflow_id: ctx.workflow_id,
            node_id: node_id.to_string(),
        });
        ctx.log(&format!("node_complete {node_id}"));

        let is_mocked = debug.map(|d| d.is_mocked()).unwrap_or(false);
        let checkpoint_flagged =
            graph.node(node_id).map(|n| n.checkpoint).unwrap_or(false);
        if checkpoint_flagged && checkpoints_enabled && !is_mocked {
            let ckpt = Checkpoint {
                workflow_id: ctx.workflow_id,
                graph: graph.name.clone(),
                taken_at_ms: self.deps.clock.epoch_ms(),
                completed_nodes: state.completed.clone(),
                variables: ctx.vars_snapshot(),
                node_results: ctx.node_outputs_snapshot(),
                running_nodes: state.running.iter().cloned().collect(),
            };
            if let Err(e) = self.deps.store.save_checkpoint(&ctx.session_id, &ckpt) {
                tracing::error!(error = %e, "failed to persist checkpoint");
            }
        }
    }

    // -------------------------------------------------------------- loops

    fn init_loop(
        &self,
        graph: &Graph,
        node_id: &str,
        payload: &Outputs,
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
    ) -> Result<(), EngineError> {
        let kind = match payload.get("kind").and_then(Value::as_str) {
            Some("for") => {
                let items = payload
                    .get("items")
                    .and_then(|v| v.as_list().map(<[Value]>::to_vec))
                    .unwrap_or_default();
                LoopKind::For { items }
            }
            _ => {
                let condition = payload
                    .get("condition")
                    .and_then(Value::as_str)
                    .unwrap_or("false")
                    .to_string();
                let max = payload
                    .get("max")
                    .and_then(Value::coerce_number)
                    .unwrap_or(1000.0) as usize;
                LoopKind::While { condition, max }
            }
        };

        let body = loop_body(graph, node_id);
        state.loops.insert(
            node_id.to_string(),
            LoopState { kind, index: 0, results: Vec::new(), body },
        );
        state.completed.insert(node_id.to_string());

        self.advance_loop(graph, node_id, state, ctx, true)
    }

    fn loop_continue(
        &self,
        graph: &Graph,
        loop_id: &str,
        via_node: &str,
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
    ) {
        // A continue with no loop state means this run was rehydrated from
        // a checkpoint taken mid-loop. Iteration bookkeeping is not part of
        // a checkpoint, so restart the whole loop: reset it and its body to
        // pending and let eligibility re-run it.
        if !state.loops.contains_key(loop_id) {
            tracing::warn!(node = loop_id, "restarting loop after mid-loop resume");
            let mut reset = vec![loop_id.to_string()];
            reset.extend(loop_body(graph, loop_id));
            self.reset_loop_body(&reset, state, ctx);
            return;
        }

        // Collect the body's final output for this iteration.
        let result = ctx
            .node_outputs_snapshot()
            .get(via_node)
            .map(collect_iteration_result)
            .unwrap_or(Value::Null);
        if let Some(loop_state) = state.loops.get_mut(loop_id) {
            loop_state.results.push(result);
            loop_state.index += 1;
        }

        if ctx.should_stop() {
            // Cancellation breaks at the iteration boundary.
            return;
        }
        if let Err(e) = self.advance_loop(graph, loop_id, state, ctx, false) {
            tracing::error!(node = loop_id, error = %e, "loop advance failed");
            state.failed = Some(e);
            ctx.cancel_token().cancel();
        }
    }

    /// Start the next iteration or finish the loop.
    fn advance_loop(
        &self,
        graph: &Graph,
        loop_id: &str,
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
        first: bool,
    ) -> Result<(), EngineError> {
        let Some(loop_state) = state.loops.get(loop_id) else { return Ok(()) };
        let index = loop_state.index;

        let next = match &loop_state.kind {
            LoopKind::For { items } => {
                if index < items.len() {
                    Some(items[index].clone())
                } else {
                    None
                }
            }
            LoopKind::While { condition, max } => {
                if index >= *max {
                    None
                } else if ctx.evaluate(condition)?.is_truthy() {
                    Some(Value::Number(index as f64))
                } else {
                    None
                }
            }
        };

        match next {
            Some(item) => {
                if !first {
                    let body: Vec<String> =
                        state.loops.get(loop_id).map(|l| l.body.iter().cloned().collect()).unwrap_or_default();
                    self.reset_loop_body(&body, state, ctx);
                }
                ctx.set_var("item", item.clone());
                ctx.set_var("index", Value::Number(index as f64));
                let outputs = BTreeMap::from([
                    ("body".to_string(), Value::Trigger),
                    ("item".to_string(), item),
                    ("index".to_string(), Value::Number(index as f64)),
                ]);
                ctx.record_node_outputs(loop_id, outputs);
                state.fired.insert((loop_id.to_string(), "body".to_string()));
                Ok(())
            }
            None => {
                let results =
                    state.loops.get(loop_id).map(|l| l.results.clone()).unwrap_or_default();
                let outputs = BTreeMap::from([
                    ("done".to_string(), Value::Trigger),
                    ("results".to_string(), Value::List(results)),
                    ("index".to_string(), Value::Number(index as f64)),
                ]);
                ctx.record_node_outputs(loop_id, outputs);
                self.fire_port(graph, loop_id, "done", state, ctx);
                Ok(())
            }
        }
    }

    /// Reset loop body nodes to pending between iterations; their old
    /// results are dropped.
    fn reset_loop_body(
        &self,
        body: &[String],
        state: &mut RunState,
        ctx: &Arc<ExecutionContext<C>>,
    ) {
        for node_id in body {
            state.completed.remove(node_id);
            state.fired.retain(|(from, _)| from != node_id);
        }
        ctx.clear_node_outputs(body);
    }

    // ----------------------------------------------------------- subgraph

    async fn run_subgraph(
        &self,
        payload: &Outputs,
        ctx: &Arc<ExecutionContext<C>>,
        depth: usize,
    ) -> Result<Outputs, EngineError> {
        let max = self.deps.config.max_subgraph_depth;
        if depth + 1 > max {
            return Err(EngineError::SubgraphTooDeep { depth: depth + 1, max });
        }

        let path = payload
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Graph("subgraph payload missing path".into()))?;
        let child_graph = self.deps.graphs.load(path)?;

        // Child parameters: the host's `input` map; inherit the parent's
        // variables when asked.
        let mut params = BTreeMap::new();
        if let Some(Value::Map(input)) = payload.get("input") {
            params.extend(input.clone());
        }
        let child_ctx = Arc::new(ExecutionContext::new(
            ctx.workflow_id,
            ctx.session_id,
            child_graph.name.clone(),
            params,
            ctx.cancel_token().clone(),
            Arc::clone(&self.deps),
        ));
        if payload.get("inherit_variables").map(|v| v.is_truthy()).unwrap_or(false) {
            child_ctx.restore_vars(ctx.vars_snapshot());
        }

        let engine = self.clone();
        let result = engine
            .run(&child_graph, child_ctx, RunOptions { depth: depth + 1, ..RunOptions::default() })
            .await;

        match result.status {
            WorkflowStatus::Completed => Ok(result.outputs),
            WorkflowStatus::Cancelled => Err(EngineError::Cancelled),
            _ => Err(EngineError::WorkflowFailed(
                result.error.unwrap_or_else(|| "subgraph failed".to_string()),
            )),
        }
    }
}

/// Gather a node's inputs from completed upstream outputs plus port
/// defaults.
fn gather_inputs<C: Clock>(
    graph: &Graph,
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Outputs {
    let mut inputs: Outputs = Outputs::new();
    for port in node.ports.iter().filter(|p| p.direction == gaffer_graph::PortDirection::Input) {
        if let Some(default) = &port.default {
            inputs.insert(port.id.clone(), Value::from_json(default));
        }
    }
    for conn in graph.incoming(&node.id) {
        let Some(port) = node.input_port(&conn.to_port) else { continue };
        if port.data_type == gaffer_graph::DataType::Trigger {
            inputs.insert(conn.to_port.clone(), Value::Trigger);
            continue;
        }
        if let Some(value) = ctx.node_output(&conn.from_node, &conn.from_port) {
            inputs.insert(conn.to_port.clone(), value);
        }
    }
    inputs
}

/// Nodes reachable from the loop's `body` port, excluding the loop itself.
fn loop_body(graph: &Graph, loop_id: &str) -> BTreeSet<String> {
    let mut body = BTreeSet::new();
    let mut queue: Vec<String> = graph
        .outgoing_from_port(loop_id, "body")
        .map(|c| c.to_node.clone())
        .collect();
    while let Some(node) = queue.pop() {
        if node == loop_id || !body.insert(node.clone()) {
            continue;
        }
        for conn in graph.outgoing(&node) {
            queue.push(conn.to_node.clone());
        }
    }
    body
}

/// The body's last-node output for one iteration: the single non-trigger
/// output when unambiguous, otherwise the `result` port, otherwise the
/// whole map.
fn collect_iteration_result(outputs: &Outputs) -> Value {
    let data: Vec<(&String, &Value)> = outputs
        .iter()
        .filter(|(k, v)| !matches!(v, Value::Trigger) && *k != "result")
        .collect();
    match data.len() {
        1 => data[0].1.clone(),
        _ => match outputs.get("result") {
            Some(result) => result.clone(),
            None => Value::Map(
                data.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ),
        },
    }
}

#[cfg(test)]
#[path = "interpreter_tests.rs"]
mod tests;
