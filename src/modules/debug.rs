//! Debug module: print a message or a variable value.
//!
//! Runs entirely on the control node. `msg` is rendered through the
//! template engine against the host's scope; `var` looks a variable up
//! and pretty-prints it.

use async_trait::async_trait;

use super::{ExecOptions, Module};
use crate::vars::template;

/// Module for printing debug messages and variable values.
pub struct DebugModule;

#[async_trait]
impl Module for DebugModule {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn description(&self) -> &'static str {
        "Print a templated message or the value of a variable"
    }

    async fn invoke(&self, opts: ExecOptions<'_>) -> (String, String) {
        let scope = match opts.variables.get_all(opts.host) {
            Ok(scope) => scope,
            Err(err) => return (String::new(), err.to_string()),
        };

        if let Some(var) = opts.args.get("var").and_then(|v| v.as_str()) {
            let rendered = match scope.get(var) {
                Some(value) => serde_json::to_string_pretty(value)
                    .unwrap_or_else(|_| value.to_string()),
                None => "(undefined)".to_string(),
            };
            return (format!("{}: {}", var, rendered), String::new());
        }

        let msg = opts
            .args
            .get("msg")
            .and_then(|v| v.as_str())
            .unwrap_or("Hello world!");
        match template::render(&scope, msg) {
            Ok(rendered) => (rendered, String::new()),
            Err(err) => (String::new(), format!("render msg: {}", err)),
        }
    }
}
