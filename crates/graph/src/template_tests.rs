// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::Value;
use std::collections::BTreeMap;

fn scope() -> BTreeMap<String, Value> {
    let mut scope = BTreeMap::new();
    scope.insert("name".to_string(), Value::String("combo".to_string()));
    scope.insert("count".to_string(), Value::Number(4.0));
    scope
}

#[test]
fn substitutes_expressions() {
    let out =
        render_template("plan {{name}} with {{count + 1}} steps", &scope(), &EvalBudget::standard())
            .unwrap();
    assert_eq!(out, "plan combo with 5 steps");
}

#[test]
fn unknown_identifiers_are_left_in_place() {
    let out = render_template("keep {{unknown}} literal", &scope(), &EvalBudget::standard())
        .unwrap();
    assert_eq!(out, "keep {{unknown}} literal");
}

#[test]
fn plain_text_passes_through() {
    let out = render_template("no placeholders here", &scope(), &EvalBudget::standard()).unwrap();
    assert_eq!(out, "no placeholders here");
}

#[test]
fn type_errors_propagate() {
    let err =
        render_template("bad {{count / 0}}", &scope(), &EvalBudget::standard()).unwrap_err();
    assert!(matches!(err, ExprError::Type(_)));
}

#[test]
fn whitespace_inside_braces_is_tolerated() {
    let out = render_template("{{  name  }}", &scope(), &EvalBudget::standard()).unwrap();
    assert_eq!(out, "combo");
}
