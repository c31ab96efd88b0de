// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn scope() -> BTreeMap<String, Value> {
    let mut scope = BTreeMap::new();
    scope.insert("value".to_string(), Value::Number(42.0));
    scope.insert("name".to_string(), Value::String("combo".to_string()));
    scope.insert("flag".to_string(), Value::Bool(true));
    scope.insert(
        "items".to_string(),
        Value::List(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
    );
    let mut square = BTreeMap::new();
    square.insert("out".to_string(), Value::Number(9.0));
    let mut nodes = BTreeMap::new();
    nodes.insert("square".to_string(), Value::Map(square));
    scope.insert("nodes".to_string(), Value::Map(nodes));
    scope
}

fn eval_ok(source: &str) -> Value {
    evaluate(source, &scope(), &EvalBudget::standard()).unwrap()
}

#[parameterized(
    arithmetic = { "1 + 2 * 3", Value::Number(7.0) },
    parens = { "(1 + 2) * 3", Value::Number(9.0) },
    modulo = { "10 % 3", Value::Number(1.0) },
    negation = { "-value", Value::Number(-42.0) },
    comparison = { "value > 10", Value::Bool(true) },
    comparison_false = { "value <= 10", Value::Bool(false) },
    equality_coerces = { "value == '42'", Value::Bool(true) },
    inequality = { "name != 'other'", Value::Bool(true) },
    boolean_and = { "flag && value > 1", Value::Bool(true) },
    boolean_or = { "false || flag", Value::Bool(true) },
    not = { "!flag", Value::Bool(false) },
    string_concat = { "name + '-4'", Value::String("combo-4".into()) },
    member = { "nodes.square.out", Value::Number(9.0) },
    index = { "items[1]", Value::Number(2.0) },
    string_compare = { "'abc' < 'abd'", Value::Bool(true) },
)]
fn expressions(source: &str, expected: Value) {
    assert_eq!(eval_ok(source), expected);
}

#[test]
fn return_keyword_is_optional() {
    assert_eq!(eval_ok("return value + 1"), Value::Number(43.0));
}

#[test]
fn map_literal_builds_map() {
    let result = eval_ok("return {out: value * 2, label: name}");
    let map = result.as_map().unwrap();
    assert_eq!(map.get("out"), Some(&Value::Number(84.0)));
    assert_eq!(map.get("label"), Some(&Value::String("combo".into())));
}

#[test]
fn list_literal_builds_list() {
    assert_eq!(
        eval_ok("[1, 2 + 3]"),
        Value::List(vec![Value::Number(1.0), Value::Number(5.0)])
    );
}

#[parameterized(
    len_list = { "len(items)", Value::Number(3.0) },
    len_string = { "len(name)", Value::Number(5.0) },
    abs = { "abs(0 - 4)", Value::Number(4.0) },
    min = { "min(4, 2, 9)", Value::Number(2.0) },
    max = { "max(4, 2, 9)", Value::Number(9.0) },
    upper = { "upper(name)", Value::String("COMBO".into()) },
    trim = { "trim('  x ')", Value::String("x".into()) },
    contains_str = { "contains(name, 'omb')", Value::Bool(true) },
    contains_list = { "contains(items, 2)", Value::Bool(true) },
    join = { "join(items, ',')", Value::String("1,2,3".into()) },
    split_len = { "len(split('a,b,c', ','))", Value::Number(3.0) },
    str_of = { "str(value)", Value::String("42".into()) },
    num_of = { "num('7')", Value::Number(7.0) },
    range_len = { "len(range(5))", Value::Number(5.0) },
)]
fn builtins(source: &str, expected: Value) {
    assert_eq!(eval_ok(source), expected);
}

#[test]
fn json_round_trip_builtins() {
    let encoded = eval_ok("json_encode({a: 1})");
    assert_eq!(encoded, Value::String("{\"a\":1}".into()));
    let decoded = eval_ok("json_decode('{\"a\": 1}').a");
    assert_eq!(decoded, Value::Number(1.0));
}

#[test]
fn unknown_identifier_is_typed_error() {
    let err = evaluate("missing + 1", &scope(), &EvalBudget::standard()).unwrap_err();
    assert_eq!(err, ExprError::UnknownIdentifier("missing".into()));
}

#[test]
fn unknown_function_is_typed_error() {
    let err = evaluate("open_file('x')", &scope(), &EvalBudget::standard()).unwrap_err();
    assert_eq!(err, ExprError::UnknownFunction("open_file".into()));
}

#[test]
fn division_by_zero_is_type_error() {
    let err = evaluate("1 / 0", &scope(), &EvalBudget::standard()).unwrap_err();
    assert!(matches!(err, ExprError::Type(_)));
}

#[test]
fn syntax_errors_are_reported() {
    assert!(matches!(
        evaluate("1 +", &scope(), &EvalBudget::standard()),
        Err(ExprError::Syntax { .. })
    ));
    assert!(matches!(
        evaluate("value = 1", &scope(), &EvalBudget::standard()),
        Err(ExprError::Syntax { .. })
    ));
    assert!(matches!(
        evaluate("'unterminated", &scope(), &EvalBudget::standard()),
        Err(ExprError::Syntax { .. })
    ));
}

#[test]
fn budget_bounds_evaluation() {
    let budget = EvalBudget::with_ops(5);
    let err = evaluate("1 + 2 + 3 + 4 + 5 + 6", &scope(), &budget).unwrap_err();
    assert_eq!(err, ExprError::BudgetExhausted);
}

#[test]
fn short_circuit_skips_rhs_errors() {
    // The unresolved identifier on the right is never evaluated.
    assert_eq!(eval_ok("false && missing"), Value::Bool(false));
    assert_eq!(eval_ok("true || missing"), Value::Bool(true));
}
