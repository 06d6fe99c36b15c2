//! The Pipeline record: the persisted unit of playbook execution.
//!
//! A pipeline binds a playbook reference to tag filters and carries the
//! aggregate outcome of one execution: phase, per-task counters, failure
//! details and a human-readable reason. Pipelines are created externally;
//! the executor owns the `Running -> {Succeeded, Failed}` transition.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelinePhase {
    /// Created but not yet picked up by an executor.
    #[default]
    Pending,
    /// An executor is driving the playbook.
    Running,
    /// All selected tasks reached Succeeded or Ignored.
    Succeeded,
    /// At least one task failed, or the executor hit a fatal error.
    Failed,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Pending => write!(f, "Pending"),
            PipelinePhase::Running => write!(f, "Running"),
            PipelinePhase::Succeeded => write!(f, "Succeeded"),
            PipelinePhase::Failed => write!(f, "Failed"),
        }
    }
}

/// What to run and which tags to select.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Path of the playbook inside the project.
    pub playbook: String,
    /// Only blocks matching these tags run. Empty means all.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Blocks matching these tags are skipped.
    #[serde(default)]
    pub skip_tags: Vec<String>,
    /// Operator hint: dump the resolved playbook at execution start.
    #[serde(default)]
    pub debug: bool,
}

/// Aggregate counters over all tasks materialized by one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounters {
    /// Tasks driven to a terminal phase.
    pub total: usize,
    /// Tasks that ended Succeeded.
    pub success: usize,
    /// Tasks that failed but carried `ignore_errors`.
    pub ignored: usize,
    /// Tasks that ended Failed.
    pub failed: usize,
}

/// Per-host detail of a failed task, lifted onto the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailedDetailHost {
    /// Host the failure occurred on.
    pub host: String,
    /// Captured module stdout.
    pub stdout: String,
    /// Captured module stderr (non-empty by construction).
    pub stderr: String,
}

/// One failed task with its per-host results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineFailedDetail {
    /// Name of the failed task spec.
    pub task: String,
    /// Hosts the task failed on.
    pub hosts: Vec<FailedDetailHost>,
}

/// Observed state of a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStatus {
    /// Current lifecycle phase.
    pub phase: PipelinePhase,
    /// Aggregate task counters.
    pub task_result: TaskCounters,
    /// Failure details of every failed task, in execution order.
    #[serde(default)]
    pub failed_detail: Vec<PipelineFailedDetail>,
    /// Human-readable failure reason; empty while healthy.
    #[serde(default)]
    pub reason: String,
}

/// A persisted pipeline record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    /// Record name, unique within the namespace.
    pub name: String,
    /// Namespace the record lives in.
    pub namespace: String,
    /// Desired execution.
    pub spec: PipelineSpec,
    /// Observed state.
    #[serde(default)]
    pub status: PipelineStatus,
}

impl Pipeline {
    /// Create a pipeline record in the Pending phase.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        spec: PipelineSpec,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            spec,
            status: PipelineStatus::default(),
        }
    }

    /// `namespace/name` key used in logs and by record stores.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
