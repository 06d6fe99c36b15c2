//! Shared test utilities for the runbook integration suite.
//!
//! Provides recording test modules (echo, fail, slow), a prewired harness
//! bundling store + registry + variable store, and a one-call playbook
//! runner.
//!
//! Include this module in integration tests:
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use runbook::error::Result;
use runbook::executor::PipelineExecutor;
use runbook::modules::{ExecOptions, Module, ModuleRegistry};
use runbook::pipeline::{Pipeline, PipelineSpec};
use runbook::playbook::Playbook;
use runbook::project::StaticProject;
use runbook::store::InMemoryStore;
use runbook::task::Task;
use runbook::vars::{template, Inventory, VariableStore};

/// Shared invocation log: one `task:host` entry per module call.
pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(calls: &CallLog, opts: &ExecOptions<'_>) {
    calls
        .lock()
        .push(format!("{}:{}", opts.task.spec.name, opts.host));
}

/// Renders its `msg` argument against the host scope and echoes it.
pub struct EchoModule {
    calls: CallLog,
}

#[async_trait]
impl Module for EchoModule {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echo a templated message (test module)"
    }

    async fn invoke(&self, opts: ExecOptions<'_>) -> (String, String) {
        record(&self.calls, &opts);
        let scope = match opts.variables.get_all(opts.host) {
            Ok(scope) => scope,
            Err(err) => return (String::new(), err.to_string()),
        };
        let msg = opts.args.get("msg").and_then(|v| v.as_str()).unwrap_or("");
        match template::render(&scope, msg) {
            Ok(rendered) => (rendered, String::new()),
            Err(err) => (String::new(), err.to_string()),
        }
    }
}

/// Always fails with its `msg` argument on stderr.
pub struct FailModule {
    calls: CallLog,
}

#[async_trait]
impl Module for FailModule {
    fn name(&self) -> &'static str {
        "fail"
    }

    fn description(&self) -> &'static str {
        "Fail with a fixed message (test module)"
    }

    async fn invoke(&self, opts: ExecOptions<'_>) -> (String, String) {
        record(&self.calls, &opts);
        let msg = opts
            .args
            .get("msg")
            .and_then(|v| v.as_str())
            .unwrap_or("boom");
        (String::new(), msg.to_string())
    }
}

/// Sleeps far longer than any test timeout; only useful under cancellation.
pub struct SlowModule {
    calls: CallLog,
}

#[async_trait]
impl Module for SlowModule {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn description(&self) -> &'static str {
        "Sleep for a long time (test module)"
    }

    async fn invoke(&self, opts: ExecOptions<'_>) -> (String, String) {
        record(&self.calls, &opts);
        tokio::time::sleep(Duration::from_secs(300)).await;
        ("done".to_string(), String::new())
    }
}

/// Everything a scenario needs, prewired.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub registry: Arc<ModuleRegistry>,
    pub variables: Arc<VariableStore>,
    pub calls: CallLog,
}

impl Harness {
    /// Build a harness over a plain host inventory.
    pub fn new(hosts: &[&str]) -> Self {
        Self::with_inventory(Inventory::new(hosts.iter().copied()))
    }

    /// Build a harness over a custom inventory.
    pub fn with_inventory(inventory: Inventory) -> Self {
        // RUST_LOG controls test verbosity; first caller wins
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::with_builtins();
        registry.register(Arc::new(EchoModule {
            calls: Arc::clone(&calls),
        }));
        registry.register(Arc::new(FailModule {
            calls: Arc::clone(&calls),
        }));
        registry.register(Arc::new(SlowModule {
            calls: Arc::clone(&calls),
        }));
        Self {
            store: Arc::new(InMemoryStore::new()),
            registry: Arc::new(registry),
            variables: Arc::new(VariableStore::new(inventory)),
            calls,
        }
    }

    /// Execute a playbook from YAML and return the settled pipeline.
    pub async fn run(&self, yaml: &str) -> (Pipeline, Result<()>) {
        self.run_with_spec(yaml, PipelineSpec::default(), &CancellationToken::new())
            .await
    }

    /// Execute with a custom pipeline spec and cancellation token.
    pub async fn run_with_spec(
        &self,
        yaml: &str,
        spec: PipelineSpec,
        token: &CancellationToken,
    ) -> (Pipeline, Result<()>) {
        let playbook = Playbook::parse(yaml).expect("test playbook parses");
        let pipeline = Pipeline::new("test", "default", spec);
        let mut executor = PipelineExecutor::new(
            pipeline,
            Arc::new(StaticProject::new(playbook)),
            Arc::clone(&self.store) as Arc<dyn runbook::store::RecordStore>,
            Arc::clone(&self.registry),
            Arc::clone(&self.variables),
        );
        let result = executor.exec(token).await;
        (executor.into_pipeline(), result)
    }

    /// Snapshot of the invocation log.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// All persisted task records.
    pub fn tasks(&self) -> Vec<Task> {
        self.store.tasks()
    }
}

/// Index of the first log entry belonging to the named task.
pub fn first_call_for(calls: &[String], task: &str) -> Option<usize> {
    let prefix = format!("{}:", task);
    calls.iter().position(|entry| entry.starts_with(&prefix))
}
