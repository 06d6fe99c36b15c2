//! The Task record: the persisted runtime materialization of a leaf block.
//!
//! Tasks are created by the block walker, mutated only by the task runner,
//! and persisted whenever their status changes. Every execution attempt
//! appends a [`TaskCondition`] carrying timestamps and the per-host results
//! in arrival order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle phase of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskPhase {
    /// Created but not yet run.
    #[default]
    Pending,
    /// The task runner is executing it.
    Running,
    /// Every host finished without a failure signal.
    Succeeded,
    /// At least one host failed but the task carries `ignore_errors`.
    Ignored,
    /// At least one host failed.
    Failed,
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPhase::Pending => write!(f, "Pending"),
            TaskPhase::Running => write!(f, "Running"),
            TaskPhase::Succeeded => write!(f, "Succeeded"),
            TaskPhase::Ignored => write!(f, "Ignored"),
            TaskPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// The module a task dispatches to, with its raw arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Registered module name. Must be non-empty before persistence.
    pub name: String,
    /// Opaque argument value handed to the module untouched.
    #[serde(default)]
    pub args: JsonValue,
}

/// Desired execution of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Display name inherited from the source block.
    pub name: String,
    /// Hosts the task runs on, in batch order.
    pub hosts: Vec<String>,
    /// Accumulated when-conditions; all must hold for a host to run.
    #[serde(default)]
    pub when: Vec<String>,
    /// Conditions that force a host failure after execution.
    #[serde(default)]
    pub failed_when: Vec<String>,
    /// Downgrade host failures to the Ignored phase.
    #[serde(default)]
    pub ignore_errors: bool,
    /// Variable name the per-host result is registered under.
    #[serde(default)]
    pub register: Option<String>,
    /// Raw loop directive; `None` runs the module exactly once.
    #[serde(default, rename = "loop")]
    pub loop_directive: Option<JsonValue>,
    /// Role that contributed the task, when walked through a role.
    #[serde(default)]
    pub role: Option<String>,
    /// Module dispatch target.
    pub module: ModuleSpec,
}

/// Result of one module invocation chain on one host.
///
/// A non-empty `stderr` is the host failure signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    /// Host the unit of work ran on.
    pub host: String,
    /// Module stdout, or "skip" when the when-condition held false.
    pub stdout: String,
    /// Failure text; empty on success.
    pub stderr: String,
}

/// One execution attempt of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskCondition {
    /// When the runner entered.
    pub start_timestamp: DateTime<Utc>,
    /// When the runner exited; `None` while in flight.
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Host results in arrival order, not host order.
    #[serde(default)]
    pub host_results: Vec<HostResult>,
}

/// Failure detail for one host, kept on the task status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFailedDetail {
    /// Failing host.
    pub host: String,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Observed state of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Current lifecycle phase.
    pub phase: TaskPhase,
    /// Completed runner passes.
    pub restart_count: usize,
    /// One entry per runner pass.
    #[serde(default)]
    pub conditions: Vec<TaskCondition>,
    /// Hosts that failed, with their output.
    #[serde(default)]
    pub failed_detail: Vec<TaskFailedDetail>,
}

/// A persisted task record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    /// Record name; assigned from `generate_name` at creation.
    pub name: String,
    /// Prefix the record store completes into a unique name.
    #[serde(default)]
    pub generate_name: String,
    /// Namespace, inherited from the owning pipeline.
    pub namespace: String,
    /// Name of the owning pipeline, for the persistence cascade.
    #[serde(default)]
    pub owner: Option<String>,
    /// Desired execution.
    pub spec: TaskSpec,
    /// Observed state.
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    /// True once the task reached a terminal phase.
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status.phase,
            TaskPhase::Succeeded | TaskPhase::Ignored | TaskPhase::Failed
        )
    }

    /// True when the task ended in the Failed phase.
    pub fn is_failed(&self) -> bool {
        self.status.phase == TaskPhase::Failed
    }

    /// `namespace/name` key used in logs and by record stores.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
