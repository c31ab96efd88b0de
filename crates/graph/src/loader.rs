// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph document loading and dumping.
//!
//! Documents are HCL:
//!
//! ```hcl
//! graph "planning" {
//!   version = 1
//!
//!   parameter "value" { type = "number" }
//!   variable "total"  { type = "number", default = 0 }
//!
//!   node "check" {
//!     type = "if"
//!     config { condition = "value > 10" }
//!   }
//!
//!   node "big" {
//!     type = "log"
//!     config { message = "big" }
//!     input "in" { from = "check.true" }
//!   }
//!
//!   connect "c1" { from = "start.out", to = "check.in" }
//! }
//! ```
//!
//! Connections may be written as explicit `connect` blocks or inline via
//! `input "<port>" { from = "node.port" }` on the target node; the loader
//! normalizes both to [`Connection`] entries. Instance-declared ports that
//! are not part of the registry definition are only legal on node types
//! with dynamic ports.

use crate::graph::{Connection, ErrorPolicy, Graph, NodeInstance, ParamDecl};
use crate::port::{DataType, PortDef, PortDirection};
use crate::registry::NodeRegistry;
use crate::validate::{validate_graph, Issue, Severity};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Loader failures. Validation issues ride along so callers can render
/// everything at once.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("graph document parse error: {0}")]
    Parse(#[from] hcl::Error),

    #[error("document has no graph block")]
    NoGraph,

    #[error("graph '{name}' has {errors} error(s)")]
    Invalid { name: String, errors: usize, issues: Vec<Issue> },
}

// ------------------------------------------------------------- document

#[derive(Debug, Serialize, Deserialize)]
struct GraphDoc {
    #[serde(default)]
    graph: IndexMap<String, GraphBody>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GraphBody {
    #[serde(default)]
    version: u32,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    parameter: IndexMap<String, ParamDecl>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    variable: IndexMap<String, ParamDecl>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    node: IndexMap<String, NodeDecl>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    connect: IndexMap<String, ConnectDecl>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeDecl {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<IndexMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    input: IndexMap<String, InputDecl>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    output: IndexMap<String, PortDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_error: Option<ErrorPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    checkpoint: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct InputDecl {
    /// Inline connection source, `"node.port"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<serde_json::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PortDecl {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectDecl {
    from: String,
    to: String,
}

// --------------------------------------------------------------- loader

/// Load a graph from a file. The file stem is the fallback graph name.
pub fn load_graph_file(
    path: &Path,
    registry: &NodeRegistry,
) -> Result<(Graph, Vec<Issue>), LoadError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| LoadError::Read { path: path.to_path_buf(), source })?;
    load_graph(&text, registry)
}

/// Parse, intern, and validate a graph document.
///
/// Returns the graph plus warning-level issues. Any error-level issue makes
/// the graph non-executable and yields [`LoadError::Invalid`].
pub fn load_graph(text: &str, registry: &NodeRegistry) -> Result<(Graph, Vec<Issue>), LoadError> {
    let doc: GraphDoc = hcl::from_str(text)?;
    let (name, body) = doc.graph.into_iter().next().ok_or(LoadError::NoGraph)?;

    let mut issues = Vec::new();
    let mut graph = Graph {
        name,
        version: body.version,
        parameters: body.parameter,
        variables: body.variable,
        nodes: IndexMap::new(),
        connections: Vec::new(),
    };

    // Intern nodes, merging registry ports with instance declarations.
    for (id, decl) in &body.node {
        match intern_node(id, decl, registry, &mut issues) {
            Some(node) => {
                graph.nodes.insert(id.clone(), node);
            }
            None => continue,
        }
    }

    // Explicit connections.
    for (conn_id, decl) in &body.connect {
        match (Connection::parse_endpoint(&decl.from), Connection::parse_endpoint(&decl.to)) {
            (Some((from_node, from_port)), Some((to_node, to_port))) => {
                graph.connections.push(Connection {
                    id: conn_id.clone(),
                    from_node: from_node.to_string(),
                    from_port: from_port.to_string(),
                    to_node: to_node.to_string(),
                    to_port: to_port.to_string(),
                });
            }
            _ => issues.push(Issue::error(
                "validation.graph",
                format!("connect '{}': endpoints must be 'node.port'", conn_id),
            )),
        }
    }

    // Inline connections from input declarations.
    for (node_id, decl) in &body.node {
        for (port_id, input) in &decl.input {
            let Some(from) = &input.from else { continue };
            match Connection::parse_endpoint(from) {
                Some((from_node, from_port)) => {
                    let id = format!("{from_node}.{from_port}->{node_id}.{port_id}");
                    graph.connections.push(Connection {
                        id,
                        from_node: from_node.to_string(),
                        from_port: from_port.to_string(),
                        to_node: node_id.clone(),
                        to_port: port_id.clone(),
                    });
                }
                None => issues.push(Issue::error(
                    "validation.graph",
                    format!("node '{}' input '{}': from must be 'node.port'", node_id, port_id),
                )),
            }
        }
    }

    issues.extend(validate_graph(&graph, registry));

    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    if errors > 0 {
        return Err(LoadError::Invalid { name: graph.name, errors, issues });
    }
    for issue in &issues {
        tracing::warn!(graph = %graph.name, "{}", issue);
    }
    Ok((graph, issues))
}

fn intern_node(
    id: &str,
    decl: &NodeDecl,
    registry: &NodeRegistry,
    issues: &mut Vec<Issue>,
) -> Option<NodeInstance> {
    let Some(def) = registry.get(&decl.node_type) else {
        issues.push(
            Issue::error(
                "validation.graph",
                format!("unknown node type '{}'", decl.node_type),
            )
            .at(id),
        );
        return None;
    };

    let mut ports = def.ports.clone();

    // Instance input declarations: existing ports may be refined, new ports
    // need the dynamic flag.
    for (port_id, input) in &decl.input {
        if let Some(port) = ports
            .iter_mut()
            .find(|p| p.direction == PortDirection::Input && p.id == *port_id)
        {
            if input.required {
                port.required = true;
            }
            if let Some(default) = &input.default {
                port.default = Some(default.clone());
            }
        } else if def.dynamic_ports {
            ports.push(PortDef {
                id: port_id.clone(),
                direction: PortDirection::Input,
                data_type: input.data_type.clone().unwrap_or(DataType::Any),
                required: input.required,
                default: input.default.clone(),
                allow_multiple: input.multiple,
            });
        } else if input.from.is_none() {
            // Pure port declaration on a sealed node type.
            issues.push(
                Issue::error(
                    "validation.graph",
                    format!("node type '{}' does not permit extra port '{}'", def.name, port_id),
                )
                .at(id),
            );
        } else {
            // `from`-only references to unknown ports are caught by
            // connection validation with better context.
        }
    }

    for (port_id, output) in &decl.output {
        if ports
            .iter()
            .any(|p| p.direction == PortDirection::Output && p.id == *port_id)
        {
            continue;
        }
        if def.dynamic_ports {
            ports.push(PortDef {
                id: port_id.clone(),
                direction: PortDirection::Output,
                data_type: output.data_type.clone().unwrap_or(DataType::Trigger),
                required: output.required,
                default: output.default.clone(),
                allow_multiple: output.multiple,
            });
        } else {
            issues.push(
                Issue::error(
                    "validation.graph",
                    format!("node type '{}' does not permit extra port '{}'", def.name, port_id),
                )
                .at(id),
            );
        }
    }

    // Fold config defaults from the schema.
    let mut config = decl.config.clone().unwrap_or_default();
    for field in &def.config {
        if !config.contains_key(&field.name) {
            if let Some(default) = &field.default {
                config.insert(field.name.clone(), default.clone());
            }
        }
    }

    Some(NodeInstance {
        id: id.to_string(),
        node_type: decl.node_type.clone(),
        config,
        ports,
        on_error: decl.on_error.clone().unwrap_or_default(),
        timeout_ms: decl.timeout_ms,
        checkpoint: decl.checkpoint,
    })
}

// ---------------------------------------------------------------- dumper

/// Serialize a graph back to its HCL document form.
///
/// Instance ports not present in the registry definition are emitted as
/// port declarations; all connections are emitted as explicit `connect`
/// blocks. Loading the dump yields a structurally identical graph.
pub fn dump_graph(graph: &Graph, registry: &NodeRegistry) -> Result<String, hcl::Error> {
    let mut body = GraphBody {
        version: graph.version,
        parameter: graph.parameters.clone(),
        variable: graph.variables.clone(),
        ..GraphBody::default()
    };

    for (id, node) in &graph.nodes {
        let def_ports: Vec<&PortDef> =
            registry.get(&node.node_type).map(|d| d.ports.iter().collect()).unwrap_or_default();
        let mut decl = NodeDecl {
            node_type: node.node_type.clone(),
            config: if node.config.is_empty() { None } else { Some(node.config.clone()) },
            on_error: if node.on_error == ErrorPolicy::Abort {
                None
            } else {
                Some(node.on_error.clone())
            },
            timeout_ms: node.timeout_ms,
            checkpoint: node.checkpoint,
            ..NodeDecl::default()
        };
        for port in &node.ports {
            if def_ports.iter().any(|p| **p == *port) {
                continue;
            }
            match port.direction {
                PortDirection::Input => {
                    decl.input.insert(
                        port.id.clone(),
                        InputDecl {
                            from: None,
                            data_type: Some(port.data_type.clone()),
                            required: port.required,
                            multiple: port.allow_multiple,
                            default: port.default.clone(),
                        },
                    );
                }
                PortDirection::Output => {
                    decl.output.insert(
                        port.id.clone(),
                        PortDecl {
                            data_type: Some(port.data_type.clone()),
                            required: port.required,
                            multiple: port.allow_multiple,
                            default: port.default.clone(),
                        },
                    );
                }
            }
        }
        body.node.insert(id.clone(), decl);
    }

    for conn in &graph.connections {
        body.connect.insert(
            conn.id.clone(),
            ConnectDecl {
                from: format!("{}.{}", conn.from_node, conn.from_port),
                to: format!("{}.{}", conn.to_node, conn.to_port),
            },
        );
    }

    let mut doc = GraphDoc { graph: IndexMap::new() };
    doc.graph.insert(graph.name.clone(), body);
    hcl::to_string(&doc)
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
