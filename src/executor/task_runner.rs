//! The task runner: one materialized task across its hosts, concurrently.
//!
//! Every host gets its own spawned unit of work; results flow back over a
//! channel in arrival order and the runner only decides the task phase
//! after every host has reported — a failing host never short-circuits
//! the others. The unit protocol per host: snapshot the scope, evaluate
//! the when-conditions, expand the loop, invoke the module per item with
//! the `item` variable merged in and cleared afterwards, register the
//! result, then apply failed-when.

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument};

use super::PipelineExecutor;
use crate::error::Result;
use crate::modules::{ExecOptions, ModuleRegistry};
use crate::pipeline::Pipeline;
use crate::task::{HostResult, Task, TaskCondition, TaskFailedDetail, TaskPhase};
use crate::vars::{template, Update, VariableStore};

/// Key of the per-host loop variable. Cleared after every iteration.
const ITEM_VAR: &str = "item";

impl PipelineExecutor {
    /// Execute one task across its hosts and aggregate the results.
    #[instrument(skip_all, fields(task = %task.key()))]
    pub(crate) async fn run_task(
        &mut self,
        task: &mut Task,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut condition = TaskCondition {
            start_timestamp: Utc::now(),
            ..TaskCondition::default()
        };

        let task_snapshot = Arc::new(task.clone());
        let pipeline_snapshot = Arc::new(self.pipeline.clone());
        let (tx, mut rx) = mpsc::channel(task.spec.hosts.len().max(1));
        for host in &task.spec.hosts {
            let unit = HostUnit {
                host: host.clone(),
                variables: Arc::clone(&self.variables),
                registry: Arc::clone(&self.registry),
                task: Arc::clone(&task_snapshot),
                pipeline: Arc::clone(&pipeline_snapshot),
                token: token.clone(),
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = unit.run().await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        task.status.phase = TaskPhase::Succeeded;
        while let Some(result) = rx.recv().await {
            if !result.stderr.is_empty() {
                error!(host = %result.host, stderr = %result.stderr, "host run failed");
                if task.spec.ignore_errors {
                    if task.status.phase != TaskPhase::Failed {
                        task.status.phase = TaskPhase::Ignored;
                    }
                } else {
                    task.status.phase = TaskPhase::Failed;
                    task.status.failed_detail.push(TaskFailedDetail {
                        host: result.host.clone(),
                        stdout: result.stdout.clone(),
                        stderr: result.stderr.clone(),
                    });
                }
            }
            condition.host_results.push(result);
        }

        condition.end_timestamp = Some(Utc::now());
        task.status.conditions.push(condition);
        task.status.restart_count += 1;
        Ok(())
    }
}

/// One host's unit of work within a task.
struct HostUnit {
    host: String,
    variables: Arc<VariableStore>,
    registry: Arc<ModuleRegistry>,
    task: Arc<Task>,
    pipeline: Arc<Pipeline>,
    token: CancellationToken,
}

impl HostUnit {
    async fn run(&self) -> HostResult {
        let (mut stdout, mut stderr, skipped) = self.execute().await;

        if let Some(register) = &self.task.spec.register {
            let mut vars = IndexMap::new();
            vars.insert(
                register.clone(),
                json!({"stdout": stdout, "stderr": stderr}),
            );
            if let Err(err) = self.variables.merge(Update::Runtime {
                host: self.host.clone(),
                vars,
            }) {
                stderr = format!("register task result to variable failed: {}", err);
            }
        }

        // failed-when reads the post-execution scope, registered result
        // included; a skipped host is never failed by it
        if !skipped && !self.task.spec.failed_when.is_empty() {
            let verdict = self
                .variables
                .get_all(&self.host)
                .and_then(|scope| template::parse_bool(&scope, &self.task.spec.failed_when));
            match verdict {
                Ok(true) => stderr = "failed by failedWhen".to_string(),
                Ok(false) => {}
                Err(err) => {
                    stderr = format!("parse failedWhen condition failed: {}", err)
                }
            }
        }

        HostResult {
            host: self.host.clone(),
            stdout,
            stderr,
        }
    }

    /// Condition check, loop expansion and module dispatch.
    ///
    /// Returns `(stdout, stderr, skipped)`.
    async fn execute(&self) -> (String, String, bool) {
        let scope = match self.variables.get_all(&self.host) {
            Ok(scope) => scope,
            Err(err) => {
                return (String::new(), format!("get variable failed: {}", err), false)
            }
        };

        if !self.task.spec.when.is_empty() {
            match template::parse_bool(&scope, &self.task.spec.when) {
                Ok(true) => {}
                Ok(false) => return ("skip".to_string(), String::new(), true),
                Err(err) => {
                    return (
                        String::new(),
                        format!("parse when condition failed: {}", err),
                        false,
                    )
                }
            }
        }

        let items = match self.expand_loop(&scope) {
            Ok(items) => items,
            Err(err) => {
                return (
                    String::new(),
                    format!("parse loop variable failed: {}", err),
                    false,
                )
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        for item in items {
            if let Err(err) = self.merge_item(item) {
                return (
                    stdout,
                    format!("set loop item to variable failed: {}", err),
                    false,
                );
            }
            (stdout, stderr) = self.invoke_module().await;
            // clearing the item is mandatory, module failure or not
            if let Err(err) = self.merge_item(JsonValue::Null) {
                return (
                    stdout,
                    format!("clear loop item from variable failed: {}", err),
                    false,
                );
            }
        }
        (stdout, stderr, false)
    }

    /// Resolve the loop directive to the item sequence.
    ///
    /// No directive means the module runs exactly once.
    fn expand_loop(
        &self,
        scope: &IndexMap<String, JsonValue>,
    ) -> Result<Vec<JsonValue>> {
        match &self.task.spec.loop_directive {
            None => Ok(vec![JsonValue::Null]),
            Some(raw) => self.variables.extension_to_slice(scope, raw),
        }
    }

    fn merge_item(&self, value: JsonValue) -> Result<()> {
        let mut vars = IndexMap::new();
        vars.insert(ITEM_VAR.to_string(), value);
        self.variables.merge(Update::Runtime {
            host: self.host.clone(),
            vars,
        })
    }

    /// Dispatch to the module, observing cancellation at the boundary.
    async fn invoke_module(&self) -> (String, String) {
        let name = &self.task.spec.module.name;
        let Some(module) = self.registry.find(name) else {
            return (
                String::new(),
                format!("module '{}' not found in registry", name),
            );
        };
        let opts = ExecOptions {
            args: &self.task.spec.module.args,
            host: &self.host,
            variables: self.variables.as_ref(),
            task: self.task.as_ref(),
            pipeline: self.pipeline.as_ref(),
        };
        tokio::select! {
            _ = self.token.cancelled() => {
                (String::new(), "module execution cancelled".to_string())
            }
            output = module.invoke(opts) => output,
        }
    }
}
