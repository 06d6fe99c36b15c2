//! The execution engine.
//!
//! [`PipelineExecutor`] drives one pipeline to completion: it resolves the
//! project's playbook, iterates plays, batches hosts, walks each block
//! tree, materializes leaf blocks into persisted task records and runs
//! them across their hosts concurrently.
//!
//! Layering, top to bottom:
//!
//! - pipeline controller (this module): phase transitions and the final
//!   outcome decision
//! - play driver ([`play`]): host resolution, fact gathering, batching
//! - block walker ([`block`]): recursion with rescue/always semantics
//! - task runner ([`task_runner`]): per-host concurrent module dispatch
//!
//! Hosts run in parallel only inside one task; everything above the task
//! runner is strictly sequential, so pipeline state is mutated from a
//! single thread. The variable store is the sole shared mutable state.

pub mod batch;
mod block;
mod facts;
mod play;
mod task_runner;

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::modules::ModuleRegistry;
use crate::pipeline::{Pipeline, PipelinePhase};
use crate::project::Project;
use crate::store::RecordStore;
use crate::vars::{Update, VariableStore};

/// Drives one pipeline through a single execution.
///
/// # Example
///
/// ```rust,ignore
/// use runbook::prelude::*;
///
/// let mut executor = PipelineExecutor::new(
///     pipeline,
///     Arc::new(LocalProject::from_pipeline(&pipeline)),
///     Arc::new(InMemoryStore::new()),
///     Arc::new(ModuleRegistry::with_builtins()),
///     Arc::new(VariableStore::new(inventory)),
/// );
/// executor.exec(&CancellationToken::new()).await?;
/// assert_eq!(executor.pipeline().status.phase, PipelinePhase::Succeeded);
/// ```
pub struct PipelineExecutor {
    pipeline: Pipeline,
    project: Arc<dyn Project>,
    store: Arc<dyn RecordStore>,
    registry: Arc<ModuleRegistry>,
    variables: Arc<VariableStore>,
}

impl PipelineExecutor {
    /// Create an executor for one pipeline record.
    pub fn new(
        pipeline: Pipeline,
        project: Arc<dyn Project>,
        store: Arc<dyn RecordStore>,
        registry: Arc<ModuleRegistry>,
        variables: Arc<VariableStore>,
    ) -> Self {
        Self {
            pipeline,
            project,
            store,
            registry,
            variables,
        }
    }

    /// The pipeline record with its current status.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Consume the executor, returning the pipeline record.
    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }

    /// Execute the pipeline's playbook to a terminal phase.
    ///
    /// Sets the phase to Running, resolves and runs the playbook, then
    /// settles on Succeeded or Failed: a clean walk with no recorded
    /// failure detail succeeds, anything else fails. The terminal status
    /// update must persist; earlier ones may fail with a warning.
    #[instrument(skip_all, fields(pipeline = %self.pipeline.key()))]
    pub async fn exec(&mut self, token: &CancellationToken) -> Result<()> {
        info!("pipeline execution begins");
        self.pipeline.status.phase = PipelinePhase::Running;
        if let Err(err) = self.store.update_pipeline_status(&self.pipeline).await {
            warn!(error = %err, "update pipeline status failed");
        }

        let resolved = self.project.marshal_playbook();
        let result = match resolved {
            Ok(playbook) => {
                if self.pipeline.spec.debug {
                    debug!(playbook = ?playbook, "resolved playbook");
                }
                self.run_playbook(&playbook, token).await
            }
            Err(err) => Err(err),
        };
        self.finish(result).await
    }

    /// Settle the terminal phase and persist it.
    async fn finish(&mut self, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) => {
                self.pipeline.status.phase =
                    if self.pipeline.status.failed_detail.is_empty() {
                        PipelinePhase::Succeeded
                    } else {
                        PipelinePhase::Failed
                    };
            }
            Err(err) => {
                self.pipeline.status.phase = PipelinePhase::Failed;
                if self.pipeline.status.reason.is_empty() {
                    self.pipeline.status.reason = err.to_string();
                }
            }
        }
        info!(phase = %self.pipeline.status.phase, "pipeline execution ends");

        if let Err(persist_err) = self.store.update_pipeline_status(&self.pipeline).await {
            error!(error = %persist_err, "terminal pipeline status update failed");
            // keep the execution error when there is one
            return result.and(Err(persist_err));
        }
        result
    }

    /// Merge definition vars into each host's scope.
    pub(crate) fn merge_definition_vars(
        &self,
        vars: &IndexMap<String, JsonValue>,
        hosts: &[String],
    ) -> Result<()> {
        if vars.is_empty() {
            return Ok(());
        }
        self.variables.merge(Update::Definition {
            hosts: hosts.to_vec(),
            vars: vars.clone(),
        })
    }
}
