// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port definitions and the connection compatibility rules.

use serde::{Deserialize, Serialize};

/// Direction of a port on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// Data type carried by a port.
///
/// `trigger` ports carry no value; they sequence execution. `RoleDefined`
/// covers extension types declared by node definitions — two role-defined
/// ports are compatible only when their tags match. Serializes as the plain
/// document string (`"trigger"`, `"agent"`, or the role tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Trigger,
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
    Agent,
    RoleDefined(String),
}

impl DataType {
    /// Parse the document form (`type = "string"`).
    pub fn parse(s: &str) -> Self {
        match s {
            "trigger" => DataType::Trigger,
            "string" => DataType::String,
            "number" => DataType::Number,
            "boolean" => DataType::Boolean,
            "object" => DataType::Object,
            "array" => DataType::Array,
            "any" => DataType::Any,
            "agent" => DataType::Agent,
            other => DataType::RoleDefined(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DataType::Trigger => "trigger",
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
            DataType::Array => "array",
            DataType::Any => "any",
            DataType::Agent => "agent",
            DataType::RoleDefined(tag) => tag,
        }
    }

    fn is_primitive(&self) -> bool {
        matches!(self, DataType::String | DataType::Number | DataType::Boolean)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for DataType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(DataType::parse(&s))
    }
}

/// Outcome of checking a source port type against a target port type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Same type, or one side is `any`.
    Identical,
    /// Connectable with implicit coercion at evaluation time; the loader
    /// reports a warning.
    Coercible,
    Incompatible,
}

/// Port compatibility rule for connection validation.
///
/// - `any` is compatible with anything;
/// - `trigger` only with `trigger`;
/// - identical types are compatible;
/// - the primitives string/number/boolean are pairwise coercible;
/// - `object` and `array` are mutually coercible;
/// - everything else is incompatible.
pub fn compatibility(source: &DataType, target: &DataType) -> Compatibility {
    if source == target {
        return Compatibility::Identical;
    }
    if matches!(source, DataType::Trigger) || matches!(target, DataType::Trigger) {
        // Not equal, and trigger pairs only with trigger.
        return Compatibility::Incompatible;
    }
    if matches!(source, DataType::Any) || matches!(target, DataType::Any) {
        return Compatibility::Identical;
    }
    if source.is_primitive() && target.is_primitive() {
        return Compatibility::Coercible;
    }
    if matches!(
        (source, target),
        (DataType::Object, DataType::Array) | (DataType::Array, DataType::Object)
    ) {
        return Compatibility::Coercible;
    }
    Compatibility::Incompatible
}

/// Declared port on a node type or node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDef {
    pub id: String,
    pub direction: PortDirection,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub required: bool,
    /// Used for unconnected optional inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Whether multiple incoming connections may target this port.
    #[serde(default)]
    pub allow_multiple: bool,
}

impl PortDef {
    pub fn input(id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
            data_type,
            required: false,
            default: None,
            allow_multiple: false,
        }
    }

    pub fn output(id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Output,
            data_type,
            required: false,
            default: None,
            allow_multiple: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.allow_multiple = true;
        self
    }

    /// Trigger input named `in` (the conventional sequencing port).
    pub fn trigger_in() -> Self {
        Self::input("in", DataType::Trigger)
    }

    /// Trigger output named `out`.
    pub fn trigger_out() -> Self {
        Self::output("out", DataType::Trigger)
    }
}

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;
