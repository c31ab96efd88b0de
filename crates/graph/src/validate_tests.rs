// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::builtin::builtin_registry;
use crate::loader::load_graph;

fn issues_for(doc: &str) -> Vec<Issue> {
    let registry = builtin_registry();
    match load_graph(doc, &registry) {
        Ok((_, warnings)) => warnings,
        Err(crate::loader::LoadError::Invalid { issues, .. }) => issues,
        Err(other) => panic!("unexpected load error: {other:?}"),
    }
}

fn has_error(issues: &[Issue], needle: &str) -> bool {
    issues
        .iter()
        .any(|i| i.severity == Severity::Error && i.message.contains(needle))
}

#[test]
fn missing_start_node_is_an_error() {
    let issues = issues_for(
        r#"
graph "g" {
  node "emit" { type = "log" }
}
"#,
    );
    assert!(has_error(&issues, "no start node"));
}

#[test]
fn two_start_nodes_are_an_error() {
    let issues = issues_for(
        r#"
graph "g" {
  node "a" { type = "start" }
  node "b" { type = "start" }
}
"#,
    );
    assert!(has_error(&issues, "2 start nodes"));
}

#[test]
fn unknown_connection_endpoints_are_errors() {
    let issues = issues_for(
        r#"
graph "g" {
  node "entry" { type = "start" }
  connect "c1" { from = "entry.out", to = "ghost.in" }
}
"#,
    );
    assert!(has_error(&issues, "unknown target node 'ghost'"));
}

#[test]
fn unknown_port_is_an_error() {
    let issues = issues_for(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "emit" { type = "log" }
  connect "c1" { from = "entry.sideways", to = "emit.in" }
}
"#,
    );
    assert!(has_error(&issues, "no output port 'sideways'"));
}

#[test]
fn trigger_to_value_port_is_incompatible() {
    let issues = issues_for(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "emit" { type = "log" }
  connect "c1" { from = "entry.out", to = "emit.in" }
  connect "c2" { from = "entry.out", to = "emit.value" }
}
"#,
    );
    assert!(has_error(&issues, "not connectable"));
}

#[test]
fn agent_port_only_connects_to_agent() {
    let issues = issues_for(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "req" {
    type = "agent_request"
    config { role = "engineer", seat = 1 }
  }
  node "work" {
    type = "agentic_work"
    config { prompt = "implement" }
  }
  connect "c1" { from = "entry.out", to = "req.in" }
  connect "c2" { from = "req.out", to = "work.in" }
  connect "c3" { from = "req.agent", to = "work.agent" }
}
"#,
    );
    // agent → agent is identical: no issues at all
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");

    let bad = issues_for(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "req" {
    type = "agent_request"
    config { role = "engineer", seat = 1 }
  }
  node "emit" { type = "log" }
  connect "c1" { from = "entry.out", to = "req.in" }
  connect "c2" { from = "req.out", to = "emit.in" }
  connect "c3" { from = "req.agent", to = "emit.value" }
}
"#,
    );
    assert!(has_error(&bad, "agent is not connectable"));
}

#[test]
fn coercible_pair_is_a_warning_not_error() {
    let registry = builtin_registry();
    let doc = r#"
graph "g" {
  node "entry" { type = "start" }
  node "calc" {
    type = "script"
    config { code = "return {out: 2}" }
    output "out" { type = "number" }
  }
  node "finish" {
    type = "end"
    input "in" { from = "calc.done" }
    input "label" { type = "string" }
  }
  connect "c1" { from = "entry.out", to = "calc.in" }
  connect "c2" { from = "calc.out", to = "finish.label" }
}
"#;
    let (_, warnings) = load_graph(doc, &registry).unwrap();
    assert!(warnings
        .iter()
        .any(|i| i.severity == Severity::Warning && i.message.contains("coerced")));
}

#[test]
fn duplicate_connection_ids_are_errors() {
    use crate::graph::{Connection, Graph};
    use indexmap::IndexMap;

    let registry = builtin_registry();
    let mut nodes = IndexMap::new();
    let (base, _) = load_graph(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "emit" { type = "log" }
  connect "c1" { from = "entry.out", to = "emit.in" }
}
"#,
        &registry,
    )
    .unwrap();
    nodes.clone_from(&base.nodes);

    let mut graph = Graph {
        name: "g".into(),
        version: 0,
        parameters: IndexMap::new(),
        variables: IndexMap::new(),
        nodes,
        connections: base.connections.clone(),
    };
    graph.connections.push(Connection {
        id: "c1".into(),
        from_node: "entry".into(),
        from_port: "out".into(),
        to_node: "emit".into(),
        to_port: "in".into(),
    });

    let issues = validate_graph(&graph, &registry);
    assert!(has_error(&issues, "duplicate connection id"));
}

#[test]
fn unreachable_node_is_a_warning() {
    let registry = builtin_registry();
    let (_, warnings) = load_graph(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "island" { type = "log" }
}
"#,
        &registry,
    )
    .unwrap();
    assert!(warnings
        .iter()
        .any(|i| i.severity == Severity::Warning && i.message.contains("unreachable")));
}

#[test]
fn cycle_among_non_loop_nodes_is_rejected() {
    let issues = issues_for(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "a" { type = "agent_bench" }
  node "b" { type = "agent_bench" }
  connect "c1" { from = "entry.out", to = "a.in" }
  connect "c2" { from = "a.out", to = "b.in" }
  connect "c3" { from = "b.out", to = "a.in" }
}
"#,
    );
    assert!(has_error(&issues, "cycle detected"));
}

#[test]
fn loop_back_edge_is_not_a_cycle() {
    let registry = builtin_registry();
    let result = load_graph(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "loop" {
    type = "for_loop"
    config { items = "[1, 2, 3]" }
  }
  node "body" {
    type = "agent_bench"
    input "in" { from = "loop.body" }
  }
  node "finish" {
    type = "end"
    input "in" { from = "loop.done" }
  }
  connect "c1" { from = "entry.out", to = "loop.in" }
  connect "c2" { from = "body.out", to = "loop.continue" }
}
"#,
        &registry,
    );
    assert!(result.is_ok(), "loop graph should validate: {result:?}");
}

#[test]
fn multiple_connections_into_single_port_are_rejected() {
    let issues = issues_for(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "a" { type = "agent_bench" }
  node "b" { type = "agent_bench" }
  node "emit" { type = "log" }
  connect "c1" { from = "entry.out", to = "a.in" }
  connect "c2" { from = "entry.out", to = "b.in" }
  connect "c3" { from = "a.out", to = "emit.in" }
  connect "c4" { from = "b.out", to = "emit.in" }
}
"#,
    );
    assert!(has_error(&issues, "does not allow multiple"));
}

#[test]
fn end_node_accepts_multiple_triggers() {
    let registry = builtin_registry();
    let result = load_graph(
        r#"
graph "g" {
  node "entry" { type = "start" }
  node "a" { type = "agent_bench" }
  node "b" { type = "agent_bench" }
  node "finish" { type = "end" }
  connect "c1" { from = "entry.out", to = "a.in" }
  connect "c2" { from = "entry.out", to = "b.in" }
  connect "c3" { from = "a.out", to = "finish.in" }
  connect "c4" { from = "b.out", to = "finish.in" }
}
"#,
        &registry,
    );
    assert!(result.is_ok(), "fan-in to end should validate: {result:?}");
}
