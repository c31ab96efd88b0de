// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph validation.
//!
//! Produces a structured issue list. Error-level issues make a graph
//! non-executable; warnings (coercible port pairs, unreachable nodes) are
//! surfaced but do not block.

use crate::graph::Graph;
use crate::port::{compatibility, Compatibility, PortDirection};
use crate::registry::{NodeCategory, NodeRegistry};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    /// Stable code, `validation.*`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl Issue {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, code: code.into(), message: message.into(), node: None }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, code: code.into(), message: message.into(), node: None }
    }

    pub fn at(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.node {
            Some(node) => write!(f, "{sev} [{}] {} (node '{}')", self.code, self.message, node),
            None => write!(f, "{sev} [{}] {}", self.code, self.message),
        }
    }
}

/// Validate a graph against a registry.
pub fn validate_graph(graph: &Graph, registry: &NodeRegistry) -> Vec<Issue> {
    let mut issues = Vec::new();

    check_start_node(graph, &mut issues);
    check_node_types(graph, registry, &mut issues);
    check_required_config(graph, registry, &mut issues);
    check_connections(graph, &mut issues);
    check_required_inputs(graph, &mut issues);
    check_cycles(graph, &mut issues);
    check_reachability(graph, registry, &mut issues);

    issues
}

fn check_start_node(graph: &Graph, issues: &mut Vec<Issue>) {
    let starts: Vec<&str> =
        graph.nodes.values().filter(|n| n.node_type == "start").map(|n| n.id.as_str()).collect();
    match starts.len() {
        1 => {}
        0 => issues.push(Issue::error("validation.graph", "graph has no start node")),
        _ => issues.push(Issue::error(
            "validation.graph",
            format!("graph has {} start nodes: {}", starts.len(), starts.join(", ")),
        )),
    }
}

fn check_node_types(graph: &Graph, registry: &NodeRegistry, issues: &mut Vec<Issue>) {
    for node in graph.nodes.values() {
        if !registry.contains(&node.node_type) {
            issues.push(
                Issue::error(
                    "validation.graph",
                    format!("unknown node type '{}'", node.node_type),
                )
                .at(&node.id),
            );
        }
    }
}

fn check_required_config(graph: &Graph, registry: &NodeRegistry, issues: &mut Vec<Issue>) {
    for node in graph.nodes.values() {
        let Some(def) = registry.get(&node.node_type) else { continue };
        for field in &def.config {
            match node.config.get(&field.name) {
                None if field.required => issues.push(
                    Issue::error(
                        "validation.config",
                        format!("missing required config field '{}'", field.name),
                    )
                    .at(&node.id),
                ),
                None => {}
                Some(value) => {
                    for validator in &field.validators {
                        if let Err(reason) = validator.check(value) {
                            issues.push(
                                Issue::error(
                                    "validation.config",
                                    format!("config field '{}': {}", field.name, reason),
                                )
                                .at(&node.id),
                            );
                        }
                    }
                }
            }
        }
    }
}

fn check_connections(graph: &Graph, issues: &mut Vec<Issue>) {
    let mut seen_ids = HashSet::new();
    // target (node, port) → source count, for allow_multiple enforcement
    let mut fan_in: HashMap<(&str, &str), usize> = HashMap::new();

    for conn in &graph.connections {
        if !seen_ids.insert(conn.id.as_str()) {
            issues.push(Issue::error(
                "validation.graph",
                format!("duplicate connection id '{}'", conn.id),
            ));
        }

        let from = match graph.nodes.get(&conn.from_node) {
            Some(node) => node,
            None => {
                issues.push(Issue::error(
                    "validation.graph",
                    format!("connection '{}': unknown source node '{}'", conn.id, conn.from_node),
                ));
                continue;
            }
        };
        let to = match graph.nodes.get(&conn.to_node) {
            Some(node) => node,
            None => {
                issues.push(Issue::error(
                    "validation.graph",
                    format!("connection '{}': unknown target node '{}'", conn.id, conn.to_node),
                ));
                continue;
            }
        };

        let Some(source_port) = from.output_port(&conn.from_port) else {
            issues.push(
                Issue::error(
                    "validation.graph",
                    format!("connection '{}': no output port '{}'", conn.id, conn.from_port),
                )
                .at(&from.id),
            );
            continue;
        };
        let Some(target_port) = to.input_port(&conn.to_port) else {
            issues.push(
                Issue::error(
                    "validation.graph",
                    format!("connection '{}': no input port '{}'", conn.id, conn.to_port),
                )
                .at(&to.id),
            );
            continue;
        };

        match compatibility(&source_port.data_type, &target_port.data_type) {
            Compatibility::Identical => {}
            Compatibility::Coercible => issues.push(
                Issue::warning(
                    "validation.graph",
                    format!(
                        "connection '{}': {} coerced to {}",
                        conn.id, source_port.data_type, target_port.data_type
                    ),
                )
                .at(&to.id),
            ),
            Compatibility::Incompatible => issues.push(
                Issue::error(
                    "validation.graph",
                    format!(
                        "connection '{}': {} is not connectable to {}",
                        conn.id, source_port.data_type, target_port.data_type
                    ),
                )
                .at(&to.id),
            ),
        }

        let count = fan_in.entry((conn.to_node.as_str(), conn.to_port.as_str())).or_insert(0);
        *count += 1;
        if *count == 2 && !target_port.allow_multiple {
            issues.push(
                Issue::error(
                    "validation.graph",
                    format!(
                        "port '{}' does not allow multiple incoming connections",
                        conn.to_port
                    ),
                )
                .at(&to.id),
            );
        }
    }
}

fn check_required_inputs(graph: &Graph, issues: &mut Vec<Issue>) {
    for node in graph.nodes.values() {
        for port in &node.ports {
            if port.direction != PortDirection::Input || !port.required {
                continue;
            }
            let connected = graph
                .incoming(&node.id)
                .any(|c| c.to_port == port.id);
            if !connected && port.default.is_none() {
                issues.push(
                    Issue::error(
                        "validation.graph",
                        format!("required input '{}' is not connected", port.id),
                    )
                    .at(&node.id),
                );
            }
        }
    }
}

/// Loop back-edges (into a loop node's `continue` port) are legal; any other
/// cycle is an authoring error.
fn check_cycles(graph: &Graph, issues: &mut Vec<Issue>) {
    let is_loop_back_edge = |conn: &crate::graph::Connection| {
        conn.to_port == "continue"
            && graph
                .nodes
                .get(&conn.to_node)
                .map(|n| matches!(n.node_type.as_str(), "for_loop" | "while_loop"))
                .unwrap_or(false)
    };

    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for conn in &graph.connections {
        if is_loop_back_edge(conn) {
            continue;
        }
        edges.entry(conn.from_node.as_str()).or_default().push(conn.to_node.as_str());
    }

    // Iterative three-color DFS.
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }
    let mut color: HashMap<&str, Color> =
        graph.nodes.keys().map(|k| (k.as_str(), Color::White)).collect();

    for root in graph.nodes.keys() {
        if color.get(root.as_str()) != Some(&Color::White) {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
        color.insert(root.as_str(), Color::Grey);
        while let Some((node, next_child)) = stack.pop() {
            let children = edges.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if next_child < children.len() {
                stack.push((node, next_child + 1));
                let child = children[next_child];
                match color.get(child) {
                    Some(Color::White) => {
                        color.insert(child, Color::Grey);
                        stack.push((child, 0));
                    }
                    Some(Color::Grey) => {
                        issues.push(
                            Issue::error(
                                "validation.graph",
                                format!("cycle detected through node '{}'", child),
                            )
                            .at(child),
                        );
                        return;
                    }
                    _ => {}
                }
            } else {
                color.insert(node, Color::Black);
            }
        }
    }
}

fn check_reachability(graph: &Graph, registry: &NodeRegistry, issues: &mut Vec<Issue>) {
    let Some(start) = graph.start_node() else { return };
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue = vec![start.id.as_str()];
    while let Some(node) = queue.pop() {
        if !reachable.insert(node) {
            continue;
        }
        for conn in graph.outgoing(node) {
            queue.push(conn.to_node.as_str());
        }
    }
    for node in graph.nodes.values() {
        let annotation = registry
            .get(&node.node_type)
            .map(|d| d.category == NodeCategory::Annotation)
            .unwrap_or(false);
        if !annotation && !reachable.contains(node.id.as_str()) {
            issues.push(
                Issue::warning("validation.graph", format!("node '{}' is unreachable", node.id))
                    .at(&node.id),
            );
        }
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
