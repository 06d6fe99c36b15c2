//! The block walker: recursive descent over a play's block tree.
//!
//! For each block the walker applies tag filtering, run-once host
//! restriction and definition-var merging, then dispatches on shape.
//! Composites recurse into their nested list; when the nested path fails
//! the rescue list runs, and the always list runs regardless. Leaves are
//! materialized into persisted task records and driven to a terminal
//! phase.
//!
//! The walk reports its outcome through [`BlockOutcome`] instead of
//! mutating pipeline phase mid-run; a failure travels upward so enclosing
//! composites can still rescue it, and the pipeline phase is settled once
//! at the end of the execution. Fatal errors (variable store,
//! persistence, missing module) unwind immediately.

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::PipelineExecutor;
use crate::error::{Error, Result};
use crate::pipeline::{FailedDetailHost, PipelineFailedDetail};
use crate::playbook::Block;
use crate::task::{ModuleSpec, Task, TaskPhase, TaskSpec, TaskStatus};

/// Execution context a block list is walked under.
#[derive(Debug, Clone, Default)]
pub(crate) struct BlockContext {
    /// Current host batch.
    pub hosts: Vec<String>,
    /// Role name stacked by the play driver, if any.
    pub role: Option<String>,
    /// Accumulated when-conditions from enclosing blocks.
    pub when: Vec<String>,
}

/// Outcome of walking a block list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BlockOutcome {
    /// Every selected block completed.
    Completed,
    /// A task ended Failed; carries the task record name.
    Failed {
        /// Name of the failed task record.
        task: String,
    },
}

impl BlockOutcome {
    fn is_failed(&self) -> bool {
        matches!(self, BlockOutcome::Failed { .. })
    }
}

/// Pipeline failure state captured before a nested path runs, so a
/// successful rescue can roll the failure back.
struct FailureSnapshot {
    failed_detail: usize,
    reason: String,
}

impl PipelineExecutor {
    /// Walk a block list under the given context.
    pub(crate) fn exec_blocks<'a>(
        &'a mut self,
        blocks: &'a [Block],
        ctx: BlockContext,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<BlockOutcome>> {
        Box::pin(async move {
            for at in blocks {
                if !at.is_enabled(&self.pipeline.spec.tags, &self.pipeline.spec.skip_tags) {
                    debug!(block = %at.name, "block skipped by tag filter");
                    continue;
                }

                let hosts = if at.run_once {
                    let first = ctx.hosts.first().ok_or(Error::EmptyHosts)?;
                    vec![first.clone()]
                } else {
                    ctx.hosts.clone()
                };
                self.merge_definition_vars(&at.vars, &hosts)?;

                if at.is_composite() {
                    let mut when = ctx.when.clone();
                    when.extend(at.when.iter().cloned());
                    let child = BlockContext {
                        hosts,
                        role: ctx.role.clone(),
                        when,
                    };

                    let snapshot = self.failure_snapshot();
                    let mut outcome =
                        self.exec_blocks(&at.block, child.clone(), token).await?;

                    if outcome.is_failed() && !at.rescue.is_empty() {
                        debug!(block = %at.name, "nested path failed, entering rescue");
                        match self.exec_blocks(&at.rescue, child.clone(), token).await? {
                            BlockOutcome::Completed => {
                                self.restore_failure(snapshot);
                                outcome = BlockOutcome::Completed;
                            }
                            failed => outcome = failed,
                        }
                    }

                    if !at.always.is_empty() {
                        // the always outcome supersedes whatever came before
                        if let failed @ BlockOutcome::Failed { .. } =
                            self.exec_blocks(&at.always, child, token).await?
                        {
                            outcome = failed;
                        }
                    }

                    if outcome.is_failed() {
                        return Ok(outcome);
                    }
                } else if at.is_include() {
                    // include_tasks references are expanded upstream
                    debug!(block = %at.name, include = %at.include_tasks, "include reference, nothing to do");
                } else {
                    let mut task = self.materialize_task(at, &hosts, &ctx)?;
                    self.store.create_task(&mut task).await?;
                    let outcome = self.drive_task(&mut task, token).await?;
                    if outcome.is_failed() {
                        return Ok(outcome);
                    }
                }
            }
            Ok(BlockOutcome::Completed)
        })
    }

    /// Derive a task record from a leaf block.
    ///
    /// The module is the first unrecognized field, in source order, whose
    /// name matches a registered module; its value becomes the raw args.
    fn materialize_task(
        &self,
        block: &Block,
        hosts: &[String],
        ctx: &BlockContext,
    ) -> Result<Task> {
        let mut module = ModuleSpec::default();
        for (field, raw) in &block.unknown {
            if self.registry.contains(field) {
                module.name = field.clone();
                module.args = raw.clone();
                break;
            }
        }
        if module.name.is_empty() {
            error!(block = %block.name, "no module/action detected in task");
            return Err(Error::NoModule(block.name.clone()));
        }

        let mut when = ctx.when.clone();
        when.extend(block.when.iter().cloned());
        Ok(Task {
            name: String::new(),
            generate_name: format!("{}-", self.pipeline.name),
            namespace: self.pipeline.namespace.clone(),
            owner: Some(self.pipeline.name.clone()),
            spec: TaskSpec {
                name: block.name.clone(),
                hosts: hosts.to_vec(),
                when,
                failed_when: block.failed_when.clone(),
                ignore_errors: block.ignore_errors,
                register: block.register.clone(),
                loop_directive: block.loop_directive.clone(),
                role: ctx.role.clone(),
                module,
            },
            status: TaskStatus::default(),
        })
    }

    /// Drive a persisted task until it reaches a terminal phase, then fold
    /// its outcome into the pipeline counters.
    async fn drive_task(
        &mut self,
        task: &mut Task,
        token: &CancellationToken,
    ) -> Result<BlockOutcome> {
        loop {
            info!(
                task = %task.key(),
                name = %task.spec.name,
                attempt = task.status.restart_count + 1,
                "task execution begins"
            );
            task.status.phase = TaskPhase::Running;
            if let Err(err) = self.store.update_task_status(task).await {
                warn!(task = %task.key(), error = %err, "update task status failed");
            }

            self.run_task(task, token).await?;

            if let Err(err) = self.store.update_task_status(task).await {
                if task.is_complete() {
                    // losing a terminal phase would desync the controller
                    return Err(err);
                }
                warn!(task = %task.key(), error = %err, "update task status failed");
            }
            if task.is_complete() {
                break;
            }
        }
        info!(task = %task.key(), phase = %task.status.phase, "task execution ends");

        let counters = &mut self.pipeline.status.task_result;
        counters.total += 1;
        match task.status.phase {
            TaskPhase::Succeeded => counters.success += 1,
            TaskPhase::Ignored => counters.ignored += 1,
            TaskPhase::Failed => counters.failed += 1,
            TaskPhase::Pending | TaskPhase::Running => {}
        }

        if task.is_failed() {
            let hosts = task
                .status
                .failed_detail
                .iter()
                .map(|detail| FailedDetailHost {
                    host: detail.host.clone(),
                    stdout: detail.stdout.clone(),
                    stderr: detail.stderr.clone(),
                })
                .collect();
            self.pipeline.status.failed_detail.push(PipelineFailedDetail {
                task: task.spec.name.clone(),
                hosts,
            });
            self.pipeline.status.reason = format!("task {} run failed", task.name);
            error!(task = %task.key(), "task run failed");
            return Ok(BlockOutcome::Failed {
                task: task.name.clone(),
            });
        }
        Ok(BlockOutcome::Completed)
    }

    fn failure_snapshot(&self) -> FailureSnapshot {
        FailureSnapshot {
            failed_detail: self.pipeline.status.failed_detail.len(),
            reason: self.pipeline.status.reason.clone(),
        }
    }

    fn restore_failure(&mut self, snapshot: FailureSnapshot) {
        self.pipeline
            .status
            .failed_detail
            .truncate(snapshot.failed_detail);
        self.pipeline.status.reason = snapshot.reason;
    }
}
