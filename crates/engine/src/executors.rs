// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in node executors.
//!
//! Each executor receives the node instance, its gathered inputs, and the
//! workflow context, and returns an output map. Control-flow executors
//! return sentinel keys (`__branch__`, `__loop__`, ...) that the
//! interpreter consumes; sentinels never land in recorded port data.

use crate::context::ExecutionContext;
use crate::error::EngineError;
use gaffer_core::{Clock, Value};
use gaffer_graph::{
    NodeInstance, SENTINEL_BRANCH, SENTINEL_LOOP, SENTINEL_PARALLEL, SENTINEL_SUBGRAPH,
    SENTINEL_SYNC,
};
use std::collections::BTreeMap;
use std::time::Duration;

type Outputs = BTreeMap<String, Value>;

fn trigger(port: &str) -> (String, Value) {
    (port.to_string(), Value::Trigger)
}

/// Dispatch a node to its executor.
pub async fn execute_node<C: Clock>(
    node: &NodeInstance,
    inputs: &Outputs,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    match node.node_type.as_str() {
        "start" => Ok(BTreeMap::from([trigger("out")])),
        "end" => Ok(inputs
            .iter()
            .filter(|(_, v)| !matches!(v, Value::Trigger))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        "note" | "agent_bench" => Ok(BTreeMap::from([trigger("out")])),

        "if" => run_if(node, ctx),
        "switch" => run_switch(node, ctx),
        "for_loop" => run_for_loop(node, inputs, ctx),
        "while_loop" => run_while_loop(node),
        "parallel" => run_parallel(node),
        "sync" => Ok(BTreeMap::from([
            trigger("out"),
            (SENTINEL_SYNC.to_string(), Value::String(sync_mode(node))),
        ])),
        "subgraph" => run_subgraph_sentinel(node, ctx),

        "agent_request" => run_agent_request(node, ctx).await,
        "agentic_work" => run_agentic_work(node, inputs, ctx).await,
        "agent_release" => run_agent_release(node, inputs, ctx),

        "script" => run_script(node, ctx),
        "log" => run_log(node, inputs, ctx),
        "variable_set" => run_variable_set(node, inputs, ctx),
        "variable_get" => run_variable_get(node, ctx),

        "event" => run_event(node, ctx).await,
        "command" => run_command(node, ctx).await,
        "delay" => run_delay(node, ctx).await,
        "wait_event" => run_wait_event(node, ctx).await,

        other => Err(EngineError::Graph(format!("no executor for node type '{other}'"))),
    }
}

/// The join mode of a `sync` node (`all` unless configured otherwise).
/// Consulted by the interpreter's eligibility check.
pub fn sync_mode(node: &NodeInstance) -> String {
    node.config_str("mode").unwrap_or("all").to_string()
}

// ------------------------------------------------------------------ flow

fn run_if<C: Clock>(node: &NodeInstance, ctx: &ExecutionContext<C>) -> Result<Outputs, EngineError> {
    let condition = node.config_str("condition").unwrap_or("false");
    let value = ctx.evaluate(condition)?;
    let branch = if value.is_truthy() { "true" } else { "false" };
    Ok(BTreeMap::from([(SENTINEL_BRANCH.to_string(), Value::String(branch.to_string()))]))
}

fn run_switch<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let expression = node.config_str("expression").unwrap_or("null");
    let value = ctx.evaluate(expression)?;
    let needle = value.coerce_string();
    let case = node
        .trigger_outputs()
        .map(|p| p.id.as_str())
        .find(|id| *id != "default" && *id == needle)
        .unwrap_or("default");
    Ok(BTreeMap::from([(SENTINEL_BRANCH.to_string(), Value::String(case.to_string()))]))
}

fn run_for_loop<C: Clock>(
    node: &NodeInstance,
    inputs: &Outputs,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    // Items come from the `items` input port, the `items` expression, or an
    // integer `count` interpreted as [0..n).
    let items = if let Some(value) = inputs.get("items").filter(|v| !matches!(v, Value::Trigger)) {
        value.clone()
    } else if let Some(expr) = node.config_str("items") {
        ctx.evaluate(expr)?
    } else if let Some(count) = node.config_num("count") {
        Value::List((0..count as i64).map(|i| Value::Number(i as f64)).collect())
    } else {
        Value::List(Vec::new())
    };
    let items = match items {
        Value::List(items) => items,
        Value::Number(n) => (0..n as i64).map(|i| Value::Number(i as f64)).collect(),
        other => {
            return Err(EngineError::Script {
                node: node.id.clone(),
                message: format!("for_loop items must be an array, got {}", other.type_name()),
            })
        }
    };
    let payload = BTreeMap::from([
        ("kind".to_string(), Value::String("for".to_string())),
        ("items".to_string(), Value::List(items)),
    ]);
    Ok(BTreeMap::from([(SENTINEL_LOOP.to_string(), Value::Map(payload))]))
}

fn run_while_loop(node: &NodeInstance) -> Result<Outputs, EngineError> {
    let condition = node.config_str("condition").unwrap_or("false").to_string();
    let max = node.config_num("max_iterations").unwrap_or(1000.0);
    let payload = BTreeMap::from([
        ("kind".to_string(), Value::String("while".to_string())),
        ("condition".to_string(), Value::String(condition)),
        ("max".to_string(), Value::Number(max)),
    ]);
    Ok(BTreeMap::from([(SENTINEL_LOOP.to_string(), Value::Map(payload))]))
}

fn run_parallel(node: &NodeInstance) -> Result<Outputs, EngineError> {
    let branches: Vec<Value> = node
        .trigger_outputs()
        .map(|p| Value::String(p.id.clone()))
        .collect();
    if branches.is_empty() {
        return Err(EngineError::Graph(format!(
            "parallel node '{}' declares no branch ports",
            node.id
        )));
    }
    Ok(BTreeMap::from([(SENTINEL_PARALLEL.to_string(), Value::List(branches))]))
}

fn run_subgraph_sentinel<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let path = node
        .config_str("path")
        .ok_or_else(|| EngineError::Graph(format!("subgraph '{}' missing path", node.id)))?;
    let input = match node.config.get("input") {
        Some(json) => {
            // Config values may contain templates; render strings.
            let mut rendered = BTreeMap::new();
            if let Some(map) = json.as_object() {
                for (key, value) in map {
                    let value = match value.as_str() {
                        Some(s) => Value::String(ctx.render(s)?),
                        None => Value::from_json(value),
                    };
                    rendered.insert(key.clone(), value);
                }
            }
            Value::Map(rendered)
        }
        None => Value::Map(BTreeMap::new()),
    };
    let inherit = node.config_bool("inherit_variables").unwrap_or(false);
    let payload = BTreeMap::from([
        ("path".to_string(), Value::String(path.to_string())),
        ("input".to_string(), input),
        ("inherit_variables".to_string(), Value::Bool(inherit)),
    ]);
    Ok(BTreeMap::from([(SENTINEL_SUBGRAPH.to_string(), Value::Map(payload))]))
}

// ----------------------------------------------------------------- agent

async fn run_agent_request<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let role = node
        .config_str("role")
        .ok_or_else(|| EngineError::Graph(format!("agent_request '{}' missing role", node.id)))?;
    let seat = node.config_num("seat").unwrap_or(1.0) as u32;
    let timeout = Duration::from_millis(node.config_num("timeout_ms").unwrap_or(30000.0) as u64);

    let name = ctx.request_agent(role, timeout, seat).await?;
    Ok(BTreeMap::from([trigger("out"), ("agent".to_string(), Value::Agent(name))]))
}

async fn run_agentic_work<C: Clock>(
    node: &NodeInstance,
    inputs: &Outputs,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let agent_name = agent_from(node, inputs, ctx).ok_or_else(|| {
        EngineError::Graph(format!("agentic_work '{}' has no agent or seated bench", node.id))
    })?;
    let prompt_template = node
        .config_str("prompt")
        .ok_or_else(|| EngineError::Graph(format!("agentic_work '{}' missing prompt", node.id)))?;
    let prompt = ctx.render(prompt_template)?;
    let stage = node.config_str("stage").unwrap_or("work").to_string();
    let role = node.config_str("role").unwrap_or("worker").to_string();
    let timeout = node.config_num("timeout_ms").map(|ms| Duration::from_millis(ms as u64));

    let reply = ctx.run_agent_task(&agent_name, &prompt, &stage, &role, timeout).await?;

    let mut outputs = BTreeMap::from([
        trigger("out"),
        ("reply".to_string(), Value::String(reply.clone())),
    ]);
    if node.config_bool("parse_response").unwrap_or(false) {
        outputs.insert("parsed".to_string(), parse_structured_reply(&reply));
    }
    if node.config_bool("release").unwrap_or(false) {
        ctx.release_agent(&agent_name);
    }
    Ok(outputs)
}

fn run_agent_release<C: Clock>(
    node: &NodeInstance,
    inputs: &Outputs,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    match agent_from(node, inputs, ctx) {
        Some(name) => ctx.release_agent(&name),
        None => tracing::warn!(node = %node.id, "agent_release with nothing to release"),
    }
    Ok(BTreeMap::from([trigger("out")]))
}

/// Resolve the agent for a node: explicit `agent` input port first, then
/// the configured bench seat.
fn agent_from<C: Clock>(
    node: &NodeInstance,
    inputs: &Outputs,
    ctx: &ExecutionContext<C>,
) -> Option<String> {
    if let Some(Value::Agent(name)) = inputs.get("agent") {
        return Some(name.clone());
    }
    let seat = node.config_num("seat")? as u32;
    ctx.bench_get(seat)
}

/// Pull the first JSON object out of an agent reply, tolerating prose
/// around it.
fn parse_structured_reply(reply: &str) -> Value {
    let start = match reply.find('{') {
        Some(start) => start,
        None => return Value::Null,
    };
    let mut depth = 0usize;
    for (offset, ch) in reply[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let candidate = &reply[start..start + offset + 1];
                    return serde_json::from_str::<serde_json::Value>(candidate)
                        .map(|json| Value::from_json(&json))
                        .unwrap_or(Value::Null);
                }
            }
            _ => {}
        }
    }
    Value::Null
}

// ------------------------------------------------------------------ data

fn run_script<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let code = node
        .config_str("code")
        .ok_or_else(|| EngineError::Graph(format!("script '{}' missing code", node.id)))?;
    let value = ctx.evaluate(code).map_err(|e| EngineError::Script {
        node: node.id.clone(),
        message: e.to_string(),
    })?;

    let mut outputs = BTreeMap::from([trigger("done")]);
    if let Value::Map(entries) = &value {
        for (key, entry) in entries {
            outputs.insert(key.clone(), entry.clone());
        }
    }
    outputs.insert("result".to_string(), value);
    Ok(outputs)
}

fn run_log<C: Clock>(
    node: &NodeInstance,
    inputs: &Outputs,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let message = match node.config_str("message") {
        Some(template) => ctx.render(template)?,
        None => inputs
            .get("value")
            .map(|v| v.coerce_string())
            .unwrap_or_default(),
    };
    tracing::info!(workflow = %ctx.workflow_id, node = %node.id, "{message}");
    ctx.log(&message);
    Ok(BTreeMap::from([trigger("out")]))
}

fn run_variable_set<C: Clock>(
    node: &NodeInstance,
    inputs: &Outputs,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let name = node
        .config_str("name")
        .ok_or_else(|| EngineError::Graph(format!("variable_set '{}' missing name", node.id)))?;
    let value = if let Some(value) = inputs.get("value").filter(|v| !matches!(v, Value::Trigger)) {
        value.clone()
    } else if let Some(expr) = node.config_str("value") {
        ctx.evaluate(expr)?
    } else {
        Value::Null
    };
    ctx.set_var(name, value);
    Ok(BTreeMap::from([trigger("out")]))
}

fn run_variable_get<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let name = node
        .config_str("name")
        .ok_or_else(|| EngineError::Graph(format!("variable_get '{}' missing name", node.id)))?;
    let value = ctx.get_var(name).unwrap_or(Value::Null);
    Ok(BTreeMap::from([trigger("out"), ("value".to_string(), value)]))
}

// --------------------------------------------------------------- actions

async fn run_event<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let action = node.config_str("action").unwrap_or("emit");
    let result = match action {
        "emit" => {
            let topic = match node.config_str("topic") {
                Some(template) => ctx.render(template)?,
                None => format!("workflow.{}", ctx.graph_name),
            };
            let payload = node
                .config
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Object(Default::default()));
            ctx.emit_event(&topic, payload);
            Value::Null
        }
        "read_plan" => {
            let session = ctx
                .deps
                .store
                .get_session(&ctx.session_id)
                .ok_or_else(|| EngineError::SessionNotFound(ctx.session_id.to_string()))?;
            match session.current_plan() {
                Some(plan) => {
                    Value::String(ctx.deps.store.read_plan(&ctx.session_id, plan.version)?)
                }
                None => Value::Null,
            }
        }
        "read_task_state" => {
            let path = ctx.deps.store.layout().tasks_path(&ctx.session_id);
            match std::fs::read_to_string(&path) {
                Ok(text) => serde_json::from_str::<serde_json::Value>(&text)
                    .map(|json| Value::from_json(&json))
                    .unwrap_or(Value::String(text)),
                Err(_) => Value::Null,
            }
        }
        "read_context_brief" => {
            let path = ctx.deps.store.layout().session_dir(&ctx.session_id).join("context.md");
            Value::String(std::fs::read_to_string(&path).unwrap_or_default())
        }
        "request_agent" => {
            let role = node.config_str("role").unwrap_or("worker");
            let timeout =
                Duration::from_millis(node.config_num("timeout_ms").unwrap_or(30000.0) as u64);
            let name = ctx
                .deps
                .pool
                .request(role, timeout, ctx.workflow_id, ctx.cancel_token())
                .await?;
            Value::Agent(name)
        }
        "release_agent" => {
            let template = node.config_str("agent").unwrap_or_default();
            let name = ctx.render(template)?;
            ctx.deps.pool.release(&name);
            Value::Null
        }
        other => {
            return Err(EngineError::Graph(format!("unknown event action '{other}'")));
        }
    };
    Ok(BTreeMap::from([trigger("out"), ("result".to_string(), result)]))
}

async fn run_command<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let template = node
        .config_str("command")
        .ok_or_else(|| EngineError::Graph(format!("command '{}' missing command", node.id)))?;
    let command = ctx.render(template)?;
    let cwd = match node.config_str("cwd") {
        Some(template) => Some(std::path::PathBuf::from(ctx.render(template)?)),
        None => None,
    };
    let timeout = node.config_num("timeout_ms").map(|ms| Duration::from_millis(ms as u64));

    let output = ctx.run_command(&command, cwd, timeout, &node.id).await?;
    Ok(BTreeMap::from([
        trigger("out"),
        ("stdout".to_string(), Value::String(output.stdout)),
        ("stderr".to_string(), Value::String(output.stderr)),
        ("exit_code".to_string(), Value::Number(output.exit_code as f64)),
    ]))
}

async fn run_delay<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let duration = Duration::from_millis(node.config_num("duration_ms").unwrap_or(0.0) as u64);
    ctx.sleep(duration).await?;
    Ok(BTreeMap::from([trigger("out")]))
}

async fn run_wait_event<C: Clock>(
    node: &NodeInstance,
    ctx: &ExecutionContext<C>,
) -> Result<Outputs, EngineError> {
    let topic = node
        .config_str("topic")
        .ok_or_else(|| EngineError::Graph(format!("wait_event '{}' missing topic", node.id)))?;
    let timeout = Duration::from_millis(node.config_num("timeout_ms").unwrap_or(30000.0) as u64);

    let event = ctx.wait_event(topic, timeout).await?;
    let payload = match &event {
        gaffer_core::Event::Custom { payload, .. } => Value::from_json(payload),
        other => Value::from_json(&serde_json::to_value(other).unwrap_or_default()),
    };
    Ok(BTreeMap::from([trigger("out"), ("payload".to_string(), payload)]))
}

#[cfg(test)]
#[path = "executors_tests.rs"]
mod tests;
