// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::builtin::builtin_registry;
use crate::loader::load_graph;

const DOC: &str = r#"
graph "fixture" {
  version = 1

  node "entry" {
    type = "start"
  }

  node "emit" {
    type = "log"
    config {
      message = "hello"
    }
  }

  connect "c1" {
    from = "entry.out"
    to   = "emit.in"
  }
}
"#;

fn fixture() -> Graph {
    load_graph(DOC, &builtin_registry()).unwrap().0
}

#[test]
fn endpoint_parsing() {
    assert_eq!(Connection::parse_endpoint("node.port"), Some(("node", "port")));
    assert_eq!(Connection::parse_endpoint("a.b.c"), Some(("a.b", "c")));
    assert_eq!(Connection::parse_endpoint("plain"), None);
}

#[test]
fn start_node_lookup() {
    let graph = fixture();
    assert_eq!(graph.start_node().map(|n| n.id.as_str()), Some("entry"));
}

#[test]
fn incoming_and_outgoing() {
    let graph = fixture();
    assert_eq!(graph.outgoing("entry").count(), 1);
    assert_eq!(graph.incoming("emit").count(), 1);
    assert_eq!(graph.outgoing_from_port("entry", "out").count(), 1);
    assert_eq!(graph.outgoing_from_port("entry", "missing").count(), 0);
}

#[test]
fn content_hash_is_stable_and_content_sensitive() {
    let a = fixture();
    let b = fixture();
    assert_eq!(a.content_hash(), b.content_hash());

    let mut c = fixture();
    c.version = 2;
    assert_ne!(a.content_hash(), c.content_hash());
}

#[test]
fn config_helpers() {
    let graph = fixture();
    let log = graph.node("emit").unwrap();
    assert_eq!(log.config_str("message"), Some("hello"));
    assert_eq!(log.config_num("message"), None);
    assert_eq!(log.config_bool("missing"), None);
}

#[test]
fn error_policy_default_is_abort() {
    let graph = fixture();
    assert_eq!(graph.node("emit").unwrap().on_error, ErrorPolicy::Abort);
}

#[test]
fn error_policy_serde_forms() {
    let retry: ErrorPolicy =
        serde_json::from_value(serde_json::json!({"policy": "retry", "max_retries": 2}))
            .unwrap();
    assert_eq!(retry, ErrorPolicy::Retry { max_retries: 2, delay_ms: 0 });

    let goto: ErrorPolicy =
        serde_json::from_value(serde_json::json!({"policy": "goto", "target": "cleanup"}))
            .unwrap();
    assert_eq!(goto, ErrorPolicy::Goto { target: "cleanup".into() });
}
