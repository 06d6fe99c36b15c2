//! Error types for runbook.
//!
//! One crate-level error enum covers the executor's failure taxonomy.
//! Fatal kinds (project, variable, gather, persistence, missing module)
//! unwind the pipeline; condition, loop and module failures are normally
//! converted to per-host stderr text and never leave the task runner.

use thiserror::Error;

/// Result type alias for runbook operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for runbook.
#[derive(Error, Debug)]
pub enum Error {
    /// The project's playbook could not be resolved or parsed.
    #[error("failed to resolve project playbook: {0}")]
    Project(String),

    /// A variable store get or merge failed.
    #[error("variable operation failed: {0}")]
    Variable(String),

    /// Fact gathering failed for a host.
    #[error("gather facts failed on host '{host}': {message}")]
    Gather {
        /// Host the gather ran against
        host: String,
        /// Failure description
        message: String,
    },

    /// A templated boolean expression could not be evaluated.
    #[error("condition evaluation failed: {0}")]
    Condition(String),

    /// A loop directive could not be resolved to a sequence.
    #[error("loop resolution failed: {0}")]
    Loop(String),

    /// A leaf block carried no field naming a registered module.
    #[error("no module/action detected in task: {0}")]
    NoModule(String),

    /// A record create or status update failed.
    #[error("persistence operation failed: {0}")]
    Persistence(String),

    /// A serial batch resolved to zero hosts.
    #[error("serial batch produced no hosts")]
    EmptyHosts,

    /// A serial specification entry could not be interpreted.
    #[error("invalid serial entry: {0}")]
    Serial(String),

    /// A task ended in the Failed phase; carries the task record name.
    #[error("task {0} run failed")]
    TaskRunFailed(String),

    /// YAML parsing error from the playbook loader.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON error from args or fact handling.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Template engine error.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that unwind the whole pipeline instead of being
    /// recorded as a per-host failure.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Condition(_) | Error::Loop(_) | Error::TaskRunFailed(_)
        )
    }
}
