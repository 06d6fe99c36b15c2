//! Fact-gathering module.
//!
//! Probes the system and emits a JSON object on stdout; the fact gatherer
//! merges it into the host's remote-fact overlay. This implementation
//! collects control-node facts; transport-aware deployments register
//! their own module under the same name.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};

use super::{ExecOptions, Module};

/// Module implementing the distinguished `gather_facts` action.
pub struct GatherFactsModule;

impl GatherFactsModule {
    fn collect() -> IndexMap<String, JsonValue> {
        let mut facts = IndexMap::new();
        facts.insert("os_family".to_string(), json!(std::env::consts::OS));
        facts.insert("os_arch".to_string(), json!(std::env::consts::ARCH));
        if let Ok(name) = hostname::get() {
            facts.insert("node_name".to_string(), json!(name.to_string_lossy()));
        }
        if let Ok(user) = std::env::var("USER") {
            facts.insert("user".to_string(), json!(user));
        }
        if let Ok(cpus) = std::thread::available_parallelism() {
            facts.insert("cpus".to_string(), json!(cpus.get()));
        }
        facts
    }
}

#[async_trait]
impl Module for GatherFactsModule {
    fn name(&self) -> &'static str {
        super::GATHER_FACTS
    }

    fn description(&self) -> &'static str {
        "Probe the system and report facts as a JSON object"
    }

    async fn invoke(&self, _opts: ExecOptions<'_>) -> (String, String) {
        match serde_json::to_string(&Self::collect()) {
            Ok(stdout) => (stdout, String::new()),
            Err(err) => (String::new(), format!("serialize facts: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::task::Task;
    use crate::vars::{Inventory, VariableStore};

    #[tokio::test]
    async fn emits_json_object() {
        let variables = VariableStore::new(Inventory::new(["web1"]));
        let task = Task::default();
        let pipeline = Pipeline::default();
        let (stdout, stderr) = GatherFactsModule
            .invoke(ExecOptions {
                args: &JsonValue::Null,
                host: "web1",
                variables: &variables,
                task: &task,
                pipeline: &pipeline,
            })
            .await;
        assert!(stderr.is_empty());
        let facts: IndexMap<String, JsonValue> = serde_json::from_str(&stdout).unwrap();
        assert!(facts.contains_key("os_family"));
        assert!(facts.contains_key("os_arch"));
    }
}
