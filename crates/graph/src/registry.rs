// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node type registry.
//!
//! The registry maps node type names to their definitions: declared ports,
//! configuration schema, and category. Executors are looked up separately in
//! the engine so this crate stays free of runtime concerns.

use crate::port::{DataType, PortDef, PortDirection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Palette grouping for node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Flow,
    Agent,
    Data,
    Actions,
    Annotation,
}

/// Type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// Expression string evaluated at run time.
    Expression,
    /// Template string rendered at run time.
    Template,
}

/// Closed set of config validators (declarative, so definitions stay data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum ConfigValidator {
    NonEmpty,
    Positive,
    OneOf { options: Vec<String> },
    MaxLength { max: usize },
}

impl ConfigValidator {
    /// Check a document value against this rule.
    pub fn check(&self, value: &serde_json::Value) -> Result<(), String> {
        match self {
            ConfigValidator::NonEmpty => match value.as_str() {
                Some(s) if s.trim().is_empty() => Err("must not be empty".to_string()),
                _ => Ok(()),
            },
            ConfigValidator::Positive => match value.as_f64() {
                Some(n) if n <= 0.0 => Err("must be positive".to_string()),
                None => Err("must be a number".to_string()),
                _ => Ok(()),
            },
            ConfigValidator::OneOf { options } => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => Ok(()),
                Some(s) => Err(format!("'{}' not one of {:?}", s, options)),
                None => Err("must be a string".to_string()),
            },
            ConfigValidator::MaxLength { max } => match value.as_str() {
                Some(s) if s.len() > *max => Err(format!("longer than {} bytes", max)),
                _ => Ok(()),
            },
        }
    }
}

/// One field in a node type's configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: ConfigFieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<ConfigValidator>,
}

impl ConfigField {
    pub fn new(name: impl Into<String>, field_type: ConfigFieldType) -> Self {
        Self { name: name.into(), field_type, required: false, default: None, validators: vec![] }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_validator(mut self, validator: ConfigValidator) -> Self {
        self.validators.push(validator);
        self
    }
}

/// Definition of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDef {
    pub name: String,
    pub category: NodeCategory,
    #[serde(default)]
    pub ports: Vec<PortDef>,
    #[serde(default)]
    pub config: Vec<ConfigField>,
    /// Whether node instances may declare additional ports in the document.
    #[serde(default)]
    pub dynamic_ports: bool,
}

impl NodeTypeDef {
    pub fn new(name: impl Into<String>, category: NodeCategory) -> Self {
        Self { name: name.into(), category, ports: vec![], config: vec![], dynamic_ports: false }
    }

    pub fn with_port(mut self, port: PortDef) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_config(mut self, field: ConfigField) -> Self {
        self.config.push(field);
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic_ports = true;
        self
    }

    pub fn inputs(&self) -> impl Iterator<Item = &PortDef> {
        self.ports.iter().filter(|p| p.direction == PortDirection::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PortDef> {
        self.ports.iter().filter(|p| p.direction == PortDirection::Output)
    }

    /// True when the node has no trigger inputs (eligible immediately,
    /// like `start`).
    pub fn has_trigger_input(&self) -> bool {
        self.inputs().any(|p| p.data_type == DataType::Trigger)
    }
}

/// Registry of node type definitions.
#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    types: HashMap<String, NodeTypeDef>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Later registrations replace earlier ones,
    /// which lets embedders override built-ins.
    pub fn register(&mut self, def: NodeTypeDef) {
        self.types.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&NodeTypeDef> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
