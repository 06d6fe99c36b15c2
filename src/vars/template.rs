//! Template plumbing for conditions and loop directives.
//!
//! Thin wrappers over minijinja: render a templated string against a host
//! scope, fold a list of boolean expressions, and project a raw loop
//! directive onto a finite item sequence.

use indexmap::IndexMap;
use minijinja::Environment;
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

static TEMPLATE_ENV: Lazy<Environment<'static>> = Lazy::new(Environment::new);

/// Render a templated string against a scope.
pub fn render(scope: &IndexMap<String, JsonValue>, source: &str) -> Result<String> {
    Ok(TEMPLATE_ENV.render_str(source, scope)?)
}

fn contains_template_syntax(expr: &str) -> bool {
    expr.contains("{{") || expr.contains("{%")
}

/// A string of the shape `{{ expr }}` with a single inner expression.
fn as_pure_expression(source: &str) -> Option<&str> {
    let inner = source
        .trim()
        .strip_prefix("{{")?
        .strip_suffix("}}")?;
    if contains_template_syntax(inner) {
        return None;
    }
    Some(inner.trim())
}

fn interpret_bool(expr: &str, rendered: &str) -> Result<bool> {
    match rendered.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "" | "false" | "no" | "0" | "none" => Ok(false),
        other => Err(Error::Condition(format!(
            "expression '{}' rendered to non-boolean '{}'",
            expr, other
        ))),
    }
}

/// Evaluate the conjunction of templated boolean expressions.
///
/// Bare expressions are wrapped in an `{% if %}` probe; expressions that
/// already carry template syntax are rendered as-is and must produce a
/// boolean-looking string. An empty list holds true.
pub fn parse_bool(scope: &IndexMap<String, JsonValue>, exprs: &[String]) -> Result<bool> {
    for expr in exprs {
        let source = if contains_template_syntax(expr) {
            expr.clone()
        } else {
            format!("{{% if {} %}}true{{% else %}}false{{% endif %}}", expr)
        };
        let rendered = TEMPLATE_ENV
            .render_str(&source, scope)
            .map_err(|err| Error::Condition(format!("evaluate '{}': {}", expr, err)))?;
        if !interpret_bool(expr, &rendered)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolve one templated string to a typed value.
///
/// A pure `{{ expr }}` is evaluated as an expression so lists and maps keep
/// their structure; mixed text is rendered and kept as a string unless the
/// rendering parses as JSON.
fn resolve_templated(scope: &IndexMap<String, JsonValue>, source: &str) -> Result<JsonValue> {
    if let Some(expr) = as_pure_expression(source) {
        let env = Environment::new();
        let compiled = env.compile_expression(expr)?;
        let value = compiled.eval(scope)?;
        return Ok(serde_json::to_value(value)?);
    }
    let rendered = render(scope, source)?;
    Ok(serde_json::from_str(&rendered).unwrap_or(JsonValue::String(rendered)))
}

/// Resolve a raw loop directive against a scope to an ordered item list.
///
/// Strings are resolved through the template engine first; a resolution
/// producing an array is spread into items, anything else becomes a single
/// item. Array elements carrying template syntax are resolved individually.
pub fn extension_to_slice(
    scope: &IndexMap<String, JsonValue>,
    raw: &JsonValue,
) -> Result<Vec<JsonValue>> {
    match raw {
        JsonValue::String(source) => {
            let resolved = resolve_templated(scope, source)
                .map_err(|err| Error::Loop(format!("resolve '{}': {}", source, err)))?;
            match resolved {
                JsonValue::Array(items) => Ok(items),
                value => Ok(vec![value]),
            }
        }
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::String(s) if contains_template_syntax(s) => {
                    resolve_templated(scope, s)
                        .map_err(|err| Error::Loop(format!("resolve '{}': {}", s, err)))
                }
                other => Ok(other.clone()),
            })
            .collect(),
        other => Ok(vec![other.clone()]),
    }
}
