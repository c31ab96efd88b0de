// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    null = { Value::Null, false },
    false_bool = { Value::Bool(false), false },
    true_bool = { Value::Bool(true), true },
    zero = { Value::Number(0.0), false },
    nonzero = { Value::Number(3.5), true },
    empty_string = { Value::String(String::new()), false },
    string = { Value::String("x".into()), true },
    trigger = { Value::Trigger, true },
    agent = { Value::Agent("agent-1".into()), true },
)]
fn truthiness(value: Value, expected: bool) {
    assert_eq!(value.is_truthy(), expected);
}

#[test]
fn empty_collections_are_falsy() {
    assert!(!Value::List(vec![]).is_truthy());
    assert!(!Value::Map(BTreeMap::new()).is_truthy());
    assert!(Value::List(vec![Value::Null]).is_truthy());
}

#[parameterized(
    number = { Value::Number(2.0), Some(2.0) },
    numeric_string = { Value::String(" 42 ".into()), Some(42.0) },
    bad_string = { Value::String("nope".into()), None },
    bool_true = { Value::Bool(true), Some(1.0) },
    list = { Value::List(vec![]), None },
)]
fn numeric_coercion(value: Value, expected: Option<f64>) {
    assert_eq!(value.coerce_number(), expected);
}

#[test]
fn string_coercion_drops_integral_fraction() {
    assert_eq!(Value::Number(4.0).coerce_string(), "4");
    assert_eq!(Value::Number(4.5).coerce_string(), "4.5");
}

#[test]
fn member_access_on_maps_and_lists() {
    let mut entries = BTreeMap::new();
    entries.insert("name".to_string(), Value::String("combo".into()));
    let map = Value::Map(entries);
    assert_eq!(map.member("name").and_then(Value::as_str), Some("combo"));
    assert_eq!(map.member("missing"), None);

    let list = Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
    assert_eq!(list.member("1"), Some(&Value::Number(2.0)));
    assert_eq!(list.member("9"), None);
}

#[test]
fn json_round_trip_loses_only_tags() {
    let mut entries = BTreeMap::new();
    entries.insert("n".to_string(), Value::Number(1.0));
    entries.insert("items".to_string(), Value::List(vec![Value::Bool(true)]));
    let value = Value::Map(entries);

    let json = value.to_json();
    let back = Value::from_json(&json);
    assert_eq!(back, value);
}

#[test]
fn trigger_and_agent_flatten_to_json() {
    assert_eq!(Value::Trigger.to_json(), serde_json::Value::Null);
    assert_eq!(
        Value::Agent("agent-2".into()).to_json(),
        serde_json::Value::String("agent-2".into())
    );
}

#[test]
fn tagged_serde_round_trip() {
    let value = Value::Agent("agent-1".into());
    let json = serde_json::to_string(&value).unwrap();
    let back: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(back, value);
}
