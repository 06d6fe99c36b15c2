//! The play driver: iterate plays, resolve hosts, batch, walk.
//!
//! For each enabled play the driver resolves the host patterns, gathers
//! facts when asked, partitions hosts into serial batches, and walks the
//! four block groups in order — pre_tasks, each role, tasks, post_tasks —
//! per batch. Batches execute sequentially; hosts only run in parallel
//! inside the task runner.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::batch::group_hosts_by_serial;
use super::block::{BlockContext, BlockOutcome};
use super::PipelineExecutor;
use crate::error::{Error, Result};
use crate::playbook::Playbook;

fn ensure_completed(outcome: BlockOutcome) -> Result<()> {
    match outcome {
        BlockOutcome::Completed => Ok(()),
        BlockOutcome::Failed { task } => Err(Error::TaskRunFailed(task)),
    }
}

impl PipelineExecutor {
    /// Run every enabled play of the playbook, in order.
    pub(crate) async fn run_playbook(
        &mut self,
        playbook: &Playbook,
        token: &CancellationToken,
    ) -> Result<()> {
        for play in &playbook.plays {
            if !play.is_enabled(&self.pipeline.spec.tags, &self.pipeline.spec.skip_tags) {
                debug!(play = %play.name, "play skipped by tag filter");
                continue;
            }

            let hosts = self.variables.get_hostnames(&play.hosts)?;
            if hosts.is_empty() {
                debug!(play = %play.name, "no hosts resolved, skipping play");
                continue;
            }

            if play.gather_facts {
                for host in &hosts {
                    self.gather_host_facts(host, token).await?;
                }
            }

            let batches = if play.run_once {
                vec![vec![hosts[0].clone()]]
            } else {
                group_hosts_by_serial(&hosts, &play.serial)?
            };

            for batch_hosts in batches {
                self.merge_definition_vars(&play.vars, &batch_hosts)?;

                let ctx = BlockContext {
                    hosts: batch_hosts.clone(),
                    role: None,
                    when: Vec::new(),
                };
                ensure_completed(
                    self.exec_blocks(&play.pre_tasks, ctx.clone(), token).await?,
                )?;

                for role in &play.roles {
                    self.merge_definition_vars(&role.vars, &batch_hosts)?;
                    let role_ctx = BlockContext {
                        hosts: batch_hosts.clone(),
                        role: Some(role.role.clone()),
                        when: role.when.clone(),
                    };
                    ensure_completed(
                        self.exec_blocks(&role.block, role_ctx, token).await?,
                    )?;
                }

                ensure_completed(
                    self.exec_blocks(&play.tasks, ctx.clone(), token).await?,
                )?;
                ensure_completed(
                    self.exec_blocks(&play.post_tasks, ctx, token).await?,
                )?;
            }
        }
        Ok(())
    }
}
