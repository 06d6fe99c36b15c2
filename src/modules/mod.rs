//! Module system: the pluggable actions tasks dispatch to.
//!
//! A module receives its raw arguments, the target host and a handle to
//! the variable store, and reports back as a `(stdout, stderr)` pair; a
//! non-empty stderr is the host failure signal. Modules are looked up by
//! name through a synchronous [`ModuleRegistry`]. The distinguished
//! [`GATHER_FACTS`] module emits a JSON object merged as remote facts.

pub mod command;
pub mod debug;
pub mod gather_facts;
pub mod set_fact;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use crate::pipeline::Pipeline;
use crate::task::Task;
use crate::vars::VariableStore;

/// Name of the distinguished fact-gathering module.
pub const GATHER_FACTS: &str = "gather_facts";

/// Everything a module invocation gets to see.
pub struct ExecOptions<'a> {
    /// Raw arguments from the task spec, untouched.
    pub args: &'a JsonValue,
    /// Host this invocation targets.
    pub host: &'a str,
    /// Shared variable store.
    pub variables: &'a VariableStore,
    /// Snapshot of the task record being executed.
    pub task: &'a Task,
    /// Snapshot of the owning pipeline record.
    pub pipeline: &'a Pipeline,
}

/// A pluggable action implementation.
#[async_trait]
pub trait Module: Send + Sync {
    /// Registered module name.
    fn name(&self) -> &'static str;

    /// One-line description of what the module does.
    fn description(&self) -> &'static str;

    /// Execute the module for one host.
    ///
    /// Returns `(stdout, stderr)`; a non-empty stderr marks the host
    /// failed. Modules report their own errors through stderr instead of
    /// panicking or returning `Err`.
    async fn invoke(&self, opts: ExecOptions<'_>) -> (String, String);
}

/// Synchronous name-to-module function table.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<IndexMap<String, Arc<dyn Module>>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with the built-in modules.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(debug::DebugModule));
        registry.register(Arc::new(command::CommandModule));
        registry.register(Arc::new(set_fact::SetFactModule));
        registry.register(Arc::new(gather_facts::GatherFactsModule));
        registry
    }

    /// Register a module under its own name. Re-registering replaces.
    pub fn register(&self, module: Arc<dyn Module>) {
        self.modules
            .write()
            .insert(module.name().to_string(), module);
    }

    /// Look a module up by name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.read().get(name).cloned()
    }

    /// True when a module of that name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// Names of all registered modules, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.modules.read().keys().cloned().collect()
    }
}
