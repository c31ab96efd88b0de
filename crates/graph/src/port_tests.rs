// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    identical_strings = { DataType::String, DataType::String, Compatibility::Identical },
    any_left = { DataType::Any, DataType::Agent, Compatibility::Identical },
    any_right = { DataType::Object, DataType::Any, Compatibility::Identical },
    trigger_pair = { DataType::Trigger, DataType::Trigger, Compatibility::Identical },
    trigger_vs_string = { DataType::Trigger, DataType::String, Compatibility::Incompatible },
    trigger_vs_any = { DataType::Trigger, DataType::Any, Compatibility::Incompatible },
    string_number = { DataType::String, DataType::Number, Compatibility::Coercible },
    number_boolean = { DataType::Number, DataType::Boolean, Compatibility::Coercible },
    object_array = { DataType::Object, DataType::Array, Compatibility::Coercible },
    array_object = { DataType::Array, DataType::Object, Compatibility::Coercible },
    agent_agent = { DataType::Agent, DataType::Agent, Compatibility::Identical },
    agent_string = { DataType::Agent, DataType::String, Compatibility::Incompatible },
    agent_object = { DataType::Agent, DataType::Object, Compatibility::Incompatible },
    string_object = { DataType::String, DataType::Object, Compatibility::Incompatible },
)]
fn compatibility_rules(source: DataType, target: DataType, expected: Compatibility) {
    assert_eq!(compatibility(&source, &target), expected);
}

#[test]
fn role_defined_types_match_by_tag() {
    let a = DataType::parse("combo_chain");
    let b = DataType::parse("combo_chain");
    let c = DataType::parse("other");
    assert_eq!(compatibility(&a, &b), Compatibility::Identical);
    assert_eq!(compatibility(&a, &c), Compatibility::Incompatible);
}

#[test]
fn data_type_parses_document_strings() {
    assert_eq!(DataType::parse("trigger"), DataType::Trigger);
    assert_eq!(DataType::parse("agent"), DataType::Agent);
    assert_eq!(DataType::parse("custom"), DataType::RoleDefined("custom".into()));
}

#[test]
fn data_type_serde_is_plain_string() {
    let json = serde_json::to_string(&DataType::Agent).unwrap();
    assert_eq!(json, "\"agent\"");
    let back: DataType = serde_json::from_str("\"combo\"").unwrap();
    assert_eq!(back, DataType::RoleDefined("combo".into()));
}

#[test]
fn port_builders() {
    let port = PortDef::input("items", DataType::Array).required().multiple();
    assert_eq!(port.direction, PortDirection::Input);
    assert!(port.required);
    assert!(port.allow_multiple);

    assert_eq!(PortDef::trigger_in().id, "in");
    assert_eq!(PortDef::trigger_out().data_type, DataType::Trigger);
}
