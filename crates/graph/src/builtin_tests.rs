// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::NodeCategory;

#[test]
fn library_is_complete() {
    let registry = builtin_registry();
    for name in [
        "start", "end", "if", "switch", "for_loop", "while_loop", "parallel", "sync",
        "subgraph", "agent_request", "agentic_work", "agent_release", "agent_bench", "script",
        "log", "variable_set", "variable_get", "event", "command", "delay", "wait_event",
    ] {
        assert!(registry.contains(name), "missing builtin '{name}'");
    }
}

#[test]
fn start_has_no_trigger_input() {
    let registry = builtin_registry();
    let start = registry.get("start").unwrap();
    assert!(!start.has_trigger_input());
    assert_eq!(start.outputs().count(), 1);
}

#[test]
fn categories_are_assigned() {
    let registry = builtin_registry();
    assert_eq!(registry.get("if").unwrap().category, NodeCategory::Flow);
    assert_eq!(registry.get("agentic_work").unwrap().category, NodeCategory::Agent);
    assert_eq!(registry.get("script").unwrap().category, NodeCategory::Data);
    assert_eq!(registry.get("command").unwrap().category, NodeCategory::Actions);
    assert_eq!(registry.get("note").unwrap().category, NodeCategory::Annotation);
}

#[test]
fn dynamic_port_flags() {
    let registry = builtin_registry();
    for dynamic in ["switch", "parallel", "sync", "script", "end"] {
        assert!(registry.get(dynamic).unwrap().dynamic_ports, "'{dynamic}' should be dynamic");
    }
    for sealed in ["if", "log", "delay", "agent_request"] {
        assert!(!registry.get(sealed).unwrap().dynamic_ports, "'{sealed}' should be sealed");
    }
}

#[test]
fn agent_ports_use_agent_type() {
    let registry = builtin_registry();
    let request = registry.get("agent_request").unwrap();
    let agent_out = request.outputs().find(|p| p.id == "agent").unwrap();
    assert_eq!(agent_out.data_type, crate::port::DataType::Agent);

    let work = registry.get("agentic_work").unwrap();
    let agent_in = work.inputs().find(|p| p.id == "agent").unwrap();
    assert_eq!(agent_in.data_type, crate::port::DataType::Agent);
}

#[test]
fn required_config_is_declared() {
    let registry = builtin_registry();
    let command = registry.get("command").unwrap();
    let field = command.config.iter().find(|f| f.name == "command").unwrap();
    assert!(field.required);

    let wait = registry.get("wait_event").unwrap();
    let timeout = wait.config.iter().find(|f| f.name == "timeout_ms").unwrap();
    assert_eq!(timeout.default, Some(serde_json::json!(30000)));
}
