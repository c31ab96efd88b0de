// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory graph model produced by the loader.

use crate::port::{DataType, PortDef, PortDirection};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Sentinel output keys the engine interprets for control flow. These never
/// appear in persisted port data.
pub const SENTINEL_BRANCH: &str = "__branch__";
pub const SENTINEL_PARALLEL: &str = "__parallel__";
pub const SENTINEL_SYNC: &str = "__sync__";
pub const SENTINEL_LOOP: &str = "__loop__";
pub const SENTINEL_SUBGRAPH: &str = "__subgraph__";

/// Declared parameter or variable on a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    #[serde(rename = "type", default = "any_type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
}

fn any_type() -> DataType {
    DataType::Any
}

/// Per-node error handling policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum ErrorPolicy {
    /// Propagate upward and fail the workflow.
    #[default]
    Abort,
    Retry {
        #[serde(default = "default_retries")]
        max_retries: u32,
        #[serde(default)]
        delay_ms: u64,
    },
    Skip {
        /// Recorded as the node's outputs when skipped.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<serde_json::Value>,
    },
    Goto {
        target: String,
    },
}

fn default_retries() -> u32 {
    1
}

/// One interned node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Document configuration, registry defaults already folded in.
    #[serde(default)]
    pub config: IndexMap<String, serde_json::Value>,
    /// Registry ports merged with any instance-declared ports.
    #[serde(default)]
    pub ports: Vec<PortDef>,
    #[serde(default, skip_serializing_if = "is_default_policy")]
    pub on_error: ErrorPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Persist a checkpoint after this node completes.
    #[serde(default)]
    pub checkpoint: bool,
}

fn is_default_policy(policy: &ErrorPolicy) -> bool {
    *policy == ErrorPolicy::Abort
}

impl NodeInstance {
    pub fn input_port(&self, id: &str) -> Option<&PortDef> {
        self.ports.iter().find(|p| p.direction == PortDirection::Input && p.id == id)
    }

    pub fn output_port(&self, id: &str) -> Option<&PortDef> {
        self.ports.iter().find(|p| p.direction == PortDirection::Output && p.id == id)
    }

    pub fn trigger_inputs(&self) -> impl Iterator<Item = &PortDef> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Input && p.data_type == DataType::Trigger)
    }

    pub fn trigger_outputs(&self) -> impl Iterator<Item = &PortDef> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Output && p.data_type == DataType::Trigger)
    }

    /// Config string field helper.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Config numeric field helper.
    pub fn config_num(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(|v| v.as_f64())
    }

    /// Config boolean field helper.
    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(|v| v.as_bool())
    }
}

/// A directed connection between two node ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub from_node: String,
    pub from_port: String,
    pub to_node: String,
    pub to_port: String,
}

impl Connection {
    /// Parse `"node.port"` endpoint syntax.
    pub fn parse_endpoint(s: &str) -> Option<(&str, &str)> {
        s.rsplit_once('.')
    }
}

/// A loaded, interned workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub parameters: IndexMap<String, ParamDecl>,
    #[serde(default)]
    pub variables: IndexMap<String, ParamDecl>,
    #[serde(default)]
    pub nodes: IndexMap<String, NodeInstance>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.get(id)
    }

    /// The unique `start` node, when the graph is well-formed.
    pub fn start_node(&self) -> Option<&NodeInstance> {
        self.nodes.values().find(|n| n.node_type == "start")
    }

    /// Connections arriving at `node`.
    pub fn incoming<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.to_node == node)
    }

    /// Connections leaving `node`.
    pub fn outgoing<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.from_node == node)
    }

    /// Connections leaving a specific output port of `node`.
    pub fn outgoing_from_port<'a>(
        &'a self,
        node: &'a str,
        port: &'a str,
    ) -> impl Iterator<Item = &'a Connection> {
        self.connections
            .iter()
            .filter(move |c| c.from_node == node && c.from_port == port)
    }

    /// Content hash for cache keys and change detection.
    pub fn content_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let canonical = serde_json::to_string(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
