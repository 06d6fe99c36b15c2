//! Set-fact module: set host variables during execution.
//!
//! Every argument key becomes a runtime variable on the target host.
//! String values are rendered through the template engine first, so facts
//! can be derived from existing variables.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use super::{ExecOptions, Module};
use crate::vars::{template, Update};

/// Module for setting host variables dynamically.
pub struct SetFactModule;

#[async_trait]
impl Module for SetFactModule {
    fn name(&self) -> &'static str {
        "set_fact"
    }

    fn description(&self) -> &'static str {
        "Set host variables that persist for the rest of the run"
    }

    async fn invoke(&self, opts: ExecOptions<'_>) -> (String, String) {
        let JsonValue::Object(args) = opts.args else {
            return (
                String::new(),
                "set_fact requires a mapping of key/value pairs".to_string(),
            );
        };
        if args.is_empty() {
            return (
                String::new(),
                "set_fact requires at least one key/value pair".to_string(),
            );
        }

        let scope = match opts.variables.get_all(opts.host) {
            Ok(scope) => scope,
            Err(err) => return (String::new(), err.to_string()),
        };

        let mut vars = IndexMap::new();
        for (key, value) in args {
            let resolved = match value {
                JsonValue::String(s) => match template::render(&scope, s) {
                    Ok(rendered) => JsonValue::String(rendered),
                    Err(err) => {
                        return (String::new(), format!("render fact '{}': {}", key, err))
                    }
                },
                other => other.clone(),
            };
            vars.insert(key.clone(), resolved);
        }

        let summary = serde_json::to_string(&vars).unwrap_or_default();
        if let Err(err) = opts.variables.merge(Update::Runtime {
            host: opts.host.to_string(),
            vars,
        }) {
            return (String::new(), format!("merge facts: {}", err));
        }
        (summary, String::new())
    }
}
