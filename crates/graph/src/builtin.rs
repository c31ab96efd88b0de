// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The built-in node library.
//!
//! Port and config schemas for every node type the engine ships. Executor
//! implementations live in `gaffer-engine`; keeping the definitions here
//! lets the loader validate graphs without pulling in the runtime.

use crate::port::{DataType, PortDef};
use crate::registry::{
    ConfigField, ConfigFieldType, ConfigValidator, NodeCategory, NodeRegistry, NodeTypeDef,
};
use serde_json::json;

/// Build a registry containing the complete built-in library.
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    for def in flow_nodes() {
        registry.register(def);
    }
    for def in agent_nodes() {
        registry.register(def);
    }
    for def in data_nodes() {
        registry.register(def);
    }
    for def in action_nodes() {
        registry.register(def);
    }
    registry.register(
        NodeTypeDef::new("note", NodeCategory::Annotation)
            .with_config(ConfigField::new("text", ConfigFieldType::String)),
    );
    registry
}

fn flow_nodes() -> Vec<NodeTypeDef> {
    vec![
        NodeTypeDef::new("start", NodeCategory::Flow).with_port(PortDef::trigger_out()),
        NodeTypeDef::new("end", NodeCategory::Flow)
            .with_port(PortDef::trigger_in().multiple())
            .dynamic(),
        NodeTypeDef::new("if", NodeCategory::Flow)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::output("true", DataType::Trigger))
            .with_port(PortDef::output("false", DataType::Trigger))
            .with_config(
                ConfigField::new("condition", ConfigFieldType::Expression)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            ),
        // Case ports are declared per-instance (`output "case" { type = "trigger" }`).
        NodeTypeDef::new("switch", NodeCategory::Flow)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::output("default", DataType::Trigger))
            .with_config(
                ConfigField::new("expression", ConfigFieldType::Expression)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .dynamic(),
        NodeTypeDef::new("for_loop", NodeCategory::Flow)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::input("continue", DataType::Trigger))
            .with_port(PortDef::output("body", DataType::Trigger))
            .with_port(PortDef::output("done", DataType::Trigger))
            .with_port(PortDef::output("item", DataType::Any))
            .with_port(PortDef::output("index", DataType::Number))
            .with_port(PortDef::output("results", DataType::Array))
            .with_config(ConfigField::new("items", ConfigFieldType::Expression))
            .with_config(
                ConfigField::new("count", ConfigFieldType::Number)
                    .with_validator(ConfigValidator::Positive),
            ),
        NodeTypeDef::new("while_loop", NodeCategory::Flow)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::input("continue", DataType::Trigger))
            .with_port(PortDef::output("body", DataType::Trigger))
            .with_port(PortDef::output("done", DataType::Trigger))
            .with_port(PortDef::output("index", DataType::Number))
            .with_config(
                ConfigField::new("condition", ConfigFieldType::Expression)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .with_config(
                ConfigField::new("max_iterations", ConfigFieldType::Number)
                    .with_default(json!(1000))
                    .with_validator(ConfigValidator::Positive),
            ),
        // Branch ports are declared per-instance.
        NodeTypeDef::new("parallel", NodeCategory::Flow)
            .with_port(PortDef::trigger_in())
            .dynamic(),
        NodeTypeDef::new("sync", NodeCategory::Flow)
            .with_port(PortDef::trigger_out())
            .with_config(
                ConfigField::new("mode", ConfigFieldType::String)
                    .with_default(json!("all"))
                    .with_validator(ConfigValidator::OneOf {
                        options: vec!["all".to_string(), "any".to_string()],
                    }),
            )
            .dynamic(),
        NodeTypeDef::new("subgraph", NodeCategory::Flow)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::output("result", DataType::Object))
            .with_config(
                ConfigField::new("path", ConfigFieldType::String)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .with_config(ConfigField::new("input", ConfigFieldType::Object))
            .with_config(
                ConfigField::new("inherit_variables", ConfigFieldType::Boolean)
                    .with_default(json!(false)),
            ),
    ]
}

fn agent_nodes() -> Vec<NodeTypeDef> {
    vec![
        NodeTypeDef::new("agent_request", NodeCategory::Agent)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::output("agent", DataType::Agent))
            .with_config(
                ConfigField::new("role", ConfigFieldType::String)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .with_config(
                ConfigField::new("seat", ConfigFieldType::Number)
                    .required()
                    .with_validator(ConfigValidator::Positive),
            )
            .with_config(
                ConfigField::new("timeout_ms", ConfigFieldType::Number)
                    .with_default(json!(30000))
                    .with_validator(ConfigValidator::Positive),
            ),
        NodeTypeDef::new("agentic_work", NodeCategory::Agent)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::input("agent", DataType::Agent))
            .with_port(PortDef::output("reply", DataType::String))
            .with_port(PortDef::output("parsed", DataType::Object))
            .with_config(
                ConfigField::new("seat", ConfigFieldType::Number)
                    .with_validator(ConfigValidator::Positive),
            )
            .with_config(
                ConfigField::new("prompt", ConfigFieldType::Template)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .with_config(ConfigField::new("stage", ConfigFieldType::String))
            .with_config(
                ConfigField::new("parse_response", ConfigFieldType::Boolean)
                    .with_default(json!(false)),
            )
            .with_config(
                ConfigField::new("release", ConfigFieldType::Boolean).with_default(json!(false)),
            )
            .with_config(
                ConfigField::new("timeout_ms", ConfigFieldType::Number)
                    .with_validator(ConfigValidator::Positive),
            ),
        NodeTypeDef::new("agent_release", NodeCategory::Agent)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::input("agent", DataType::Agent))
            .with_config(
                ConfigField::new("seat", ConfigFieldType::Number)
                    .with_validator(ConfigValidator::Positive),
            ),
        // Visual passthrough; semantically a no-op.
        NodeTypeDef::new("agent_bench", NodeCategory::Agent)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out()),
    ]
}

fn data_nodes() -> Vec<NodeTypeDef> {
    vec![
        // Evaluates a restricted expression; a map result fans out to
        // same-named output ports. The trigger output is `done` so result
        // keys like `out` never collide with it.
        NodeTypeDef::new("script", NodeCategory::Data)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::output("done", DataType::Trigger))
            .with_port(PortDef::output("result", DataType::Any))
            .with_config(
                ConfigField::new("code", ConfigFieldType::Expression)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .dynamic(),
        NodeTypeDef::new("log", NodeCategory::Data)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::input("value", DataType::Any))
            .with_config(ConfigField::new("message", ConfigFieldType::Template)),
        NodeTypeDef::new("variable_set", NodeCategory::Data)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::input("value", DataType::Any))
            .with_config(
                ConfigField::new("name", ConfigFieldType::String)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .with_config(ConfigField::new("value", ConfigFieldType::Expression)),
        NodeTypeDef::new("variable_get", NodeCategory::Data)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::output("value", DataType::Any))
            .with_config(
                ConfigField::new("name", ConfigFieldType::String)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            ),
    ]
}

fn action_nodes() -> Vec<NodeTypeDef> {
    vec![
        // Emit an event or invoke a named system action.
        NodeTypeDef::new("event", NodeCategory::Actions)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::output("result", DataType::Any))
            .with_config(
                ConfigField::new("action", ConfigFieldType::String)
                    .with_default(json!("emit"))
                    .with_validator(ConfigValidator::OneOf {
                        options: vec![
                            "emit".to_string(),
                            "read_plan".to_string(),
                            "read_task_state".to_string(),
                            "read_context_brief".to_string(),
                            "request_agent".to_string(),
                            "release_agent".to_string(),
                        ],
                    }),
            )
            .with_config(ConfigField::new("topic", ConfigFieldType::Template))
            .with_config(ConfigField::new("payload", ConfigFieldType::Object))
            .with_config(ConfigField::new("role", ConfigFieldType::String))
            .with_config(ConfigField::new("agent", ConfigFieldType::Template)),
        NodeTypeDef::new("command", NodeCategory::Actions)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::output("stdout", DataType::String))
            .with_port(PortDef::output("stderr", DataType::String))
            .with_port(PortDef::output("exit_code", DataType::Number))
            .with_config(
                ConfigField::new("command", ConfigFieldType::Template)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .with_config(ConfigField::new("cwd", ConfigFieldType::Template))
            .with_config(
                ConfigField::new("timeout_ms", ConfigFieldType::Number)
                    .with_validator(ConfigValidator::Positive),
            ),
        NodeTypeDef::new("delay", NodeCategory::Actions)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_config(
                ConfigField::new("duration_ms", ConfigFieldType::Number)
                    .required()
                    .with_validator(ConfigValidator::Positive),
            ),
        NodeTypeDef::new("wait_event", NodeCategory::Actions)
            .with_port(PortDef::trigger_in())
            .with_port(PortDef::trigger_out())
            .with_port(PortDef::output("payload", DataType::Object))
            .with_config(
                ConfigField::new("topic", ConfigFieldType::String)
                    .required()
                    .with_validator(ConfigValidator::NonEmpty),
            )
            .with_config(
                ConfigField::new("timeout_ms", ConfigFieldType::Number)
                    .with_default(json!(30000))
                    .with_validator(ConfigValidator::Positive),
            ),
    ]
}

#[cfg(test)]
#[path = "builtin_tests.rs"]
mod tests;
