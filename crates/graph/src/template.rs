// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template string rendering.
//!
//! `{{ expr }}` placeholders are evaluated with the restricted expression
//! language and substituted with the coerced string form. Placeholders whose
//! root identifier is unknown are left as-is so prompts can carry literal
//! braces for downstream tools; genuine syntax and type errors propagate.

use crate::expr::{evaluate, EvalBudget, ExprError, Resolver};
use regex::Regex;
use std::sync::LazyLock;

/// Regex pattern for {{ expression }} placeholders.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("constant regex pattern is valid"));

/// Render `template` by evaluating each `{{…}}` placeholder.
pub fn render_template(
    template: &str,
    resolver: &dyn Resolver,
    budget: &EvalBudget,
) -> Result<String, ExprError> {
    let mut error: Option<ExprError> = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
        let source = caps[1].trim();
        match evaluate(source, resolver, budget) {
            Ok(value) => value.coerce_string(),
            Err(ExprError::UnknownIdentifier(_)) => caps[0].to_string(),
            Err(e) => {
                if error.is_none() {
                    error = Some(e);
                }
                String::new()
            }
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(rendered.into_owned()),
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
