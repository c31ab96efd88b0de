// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::builtin::builtin_registry;
use crate::graph::ErrorPolicy;
use crate::port::DataType;

const FULL_DOC: &str = r#"
graph "squares" {
  version = 2

  parameter "value" {
    type    = "number"
    default = 10
  }

  variable "total" {
    type    = "number"
    default = 0
  }

  node "entry" {
    type = "start"
  }

  node "square" {
    type       = "script"
    checkpoint = true
    config {
      code = "return {out: value * value}"
    }
    output "out" {
      type = "number"
    }
    on_error {
      policy      = "retry"
      max_retries = 2
      delay_ms    = 50
    }
  }

  node "emit" {
    type = "log"
    input "in" { from = "square.done" }
    input "value" { from = "square.out" }
  }

  connect "c1" {
    from = "entry.out"
    to   = "square.in"
  }
}
"#;

#[test]
fn loads_nodes_params_and_connections() {
    let registry = builtin_registry();
    let (graph, _warnings) = load_graph(FULL_DOC, &registry).unwrap();

    assert_eq!(graph.name, "squares");
    assert_eq!(graph.version, 2);
    assert_eq!(graph.parameters.get("value").and_then(|p| p.default.clone()),
        Some(serde_json::json!(10)));
    assert_eq!(graph.nodes.len(), 3);
    // one explicit + two inline connections
    assert_eq!(graph.connections.len(), 3);

    let square = graph.node("square").unwrap();
    assert!(square.checkpoint);
    assert_eq!(square.on_error, ErrorPolicy::Retry { max_retries: 2, delay_ms: 50 });
    assert_eq!(square.config_str("code"), Some("return {out: value * value}"));
}

#[test]
fn dynamic_output_is_merged() {
    let registry = builtin_registry();
    let (graph, _) = load_graph(FULL_DOC, &registry).unwrap();
    let square = graph.node("square").unwrap();
    let port = square.output_port("out").unwrap();
    assert_eq!(port.data_type, DataType::Number);
}

#[test]
fn unknown_node_type_is_an_error() {
    let registry = builtin_registry();
    let doc = r#"
graph "bad" {
  node "entry" { type = "start" }
  node "x" { type = "teleport" }
  connect "c1" { from = "entry.out", to = "x.in" }
}
"#;
    let err = load_graph(doc, &registry).unwrap_err();
    match err {
        LoadError::Invalid { issues, .. } => {
            assert!(issues.iter().any(|i| i.message.contains("teleport")));
        }
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[test]
fn extra_port_on_sealed_type_is_an_error() {
    let registry = builtin_registry();
    let doc = r#"
graph "bad" {
  node "entry" { type = "start" }
  node "emit" {
    type = "log"
    output "extra" { type = "string" }
  }
  connect "c1" { from = "entry.out", to = "emit.in" }
}
"#;
    assert!(matches!(load_graph(doc, &registry), Err(LoadError::Invalid { .. })));
}

#[test]
fn missing_required_config_is_an_error() {
    let registry = builtin_registry();
    let doc = r#"
graph "bad" {
  node "entry" { type = "start" }
  node "check" { type = "if" }
  connect "c1" { from = "entry.out", to = "check.in" }
}
"#;
    let err = load_graph(doc, &registry).unwrap_err();
    match err {
        LoadError::Invalid { issues, .. } => {
            assert!(issues.iter().any(|i| i.code == "validation.config"));
        }
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[test]
fn config_defaults_are_folded() {
    let registry = builtin_registry();
    let doc = r#"
graph "g" {
  node "entry" { type = "start" }
  node "wait" {
    type = "wait_event"
    config { topic = "combo.ready" }
  }
  connect "c1" { from = "entry.out", to = "wait.in" }
}
"#;
    let (graph, _) = load_graph(doc, &registry).unwrap();
    let wait = graph.node("wait").unwrap();
    assert_eq!(wait.config_num("timeout_ms"), Some(30000.0));
}

#[test]
fn empty_document_is_no_graph() {
    let registry = builtin_registry();
    assert!(matches!(load_graph("", &registry), Err(LoadError::NoGraph)));
}

#[test]
fn garbage_is_a_parse_error() {
    let registry = builtin_registry();
    assert!(matches!(load_graph("graph {{{", &registry), Err(LoadError::Parse(_))));
}

#[test]
fn load_dump_load_is_structurally_identical() {
    let registry = builtin_registry();
    let (graph, _) = load_graph(FULL_DOC, &registry).unwrap();

    let dumped = dump_graph(&graph, &registry).unwrap();
    let (reloaded, _) = load_graph(&dumped, &registry).unwrap();

    assert_eq!(reloaded, graph);
}

#[test]
fn load_graph_file_reads_from_disk() {
    let registry = builtin_registry();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("g.hcl");
    std::fs::write(
        &path,
        r#"
graph "on_disk" {
  node "entry" { type = "start" }
}
"#,
    )
    .unwrap();
    let (graph, _) = load_graph_file(&path, &registry).unwrap();
    assert_eq!(graph.name, "on_disk");

    let missing = dir.path().join("missing.hcl");
    assert!(matches!(load_graph_file(&missing, &registry), Err(LoadError::Read { .. })));
}
