//! Fact gathering: probe a host and merge what comes back.
//!
//! Runs the distinguished `gather_facts` module for one host, parses its
//! stdout as a JSON object and merges it into the host's remote-fact
//! overlay. Any failure is fatal to the pipeline.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::PipelineExecutor;
use crate::error::{Error, Result};
use crate::modules::{ExecOptions, GATHER_FACTS};
use crate::task::Task;
use crate::vars::Update;

impl PipelineExecutor {
    /// Gather facts for one host and merge them as remote facts.
    pub(crate) async fn gather_host_facts(
        &self,
        host: &str,
        token: &CancellationToken,
    ) -> Result<()> {
        let Some(module) = self.registry.find(GATHER_FACTS) else {
            return Err(Error::Gather {
                host: host.to_string(),
                message: format!("module '{}' is not registered", GATHER_FACTS),
            });
        };

        // facts run before any task record exists
        let placeholder = Task::default();
        let opts = ExecOptions {
            args: &JsonValue::Null,
            host,
            variables: self.variables.as_ref(),
            task: &placeholder,
            pipeline: &self.pipeline,
        };
        let (stdout, stderr) = tokio::select! {
            _ = token.cancelled() => {
                return Err(Error::Gather {
                    host: host.to_string(),
                    message: "cancelled".to_string(),
                })
            }
            output = module.invoke(opts) => output,
        };
        if !stderr.is_empty() {
            return Err(Error::Gather {
                host: host.to_string(),
                message: stderr,
            });
        }

        let facts: IndexMap<String, JsonValue> =
            serde_json::from_str(&stdout).map_err(|err| Error::Gather {
                host: host.to_string(),
                message: format!("parse gathered facts: {}", err),
            })?;
        debug!(host = host, count = facts.len(), "merging gathered facts");
        self.variables.merge(Update::RemoteFacts {
            host: host.to_string(),
            facts,
        })
    }
}
