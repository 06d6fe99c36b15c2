//! Persistence contract for pipeline and task records.
//!
//! The executor creates one task record per materialized leaf block and
//! pushes status updates as phases change. Status updates are allowed to
//! fail non-fatally except the one persisting a terminal task phase.
//! [`InMemoryStore`] is the default backend and doubles as the test
//! observer: it keeps every record and the full pipeline phase history.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelinePhase};
use crate::task::Task;

/// CRUD surface the executor drives records through.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new task record.
    ///
    /// When the task has no name yet, the store completes `generate_name`
    /// into a unique one and writes it back.
    async fn create_task(&self, task: &mut Task) -> Result<()>;

    /// Persist a task's current status.
    async fn update_task_status(&self, task: &Task) -> Result<()>;

    /// Persist a pipeline's current status.
    async fn update_pipeline_status(&self, pipeline: &Pipeline) -> Result<()>;
}

#[derive(Default)]
struct InMemoryState {
    counter: u64,
    tasks: IndexMap<String, Task>,
    pipelines: IndexMap<String, Pipeline>,
    pipeline_phases: Vec<PipelinePhase>,
}

/// In-process record store.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All task records, in creation order.
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.values().cloned().collect()
    }

    /// The last persisted state of one pipeline, if any.
    pub fn pipeline(&self, namespace: &str, name: &str) -> Option<Pipeline> {
        self.state
            .lock()
            .pipelines
            .get(&format!("{}/{}", namespace, name))
            .cloned()
    }

    /// Every pipeline phase persisted through this store, in order.
    pub fn pipeline_phase_history(&self) -> Vec<PipelinePhase> {
        self.state.lock().pipeline_phases.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create_task(&self, task: &mut Task) -> Result<()> {
        let mut state = self.state.lock();
        if task.name.is_empty() {
            state.counter += 1;
            task.name = format!("{}{}", task.generate_name, state.counter);
        }
        let key = task.key();
        if state.tasks.contains_key(&key) {
            return Err(Error::Persistence(format!("task {} already exists", key)));
        }
        state.tasks.insert(key, task.clone());
        Ok(())
    }

    async fn update_task_status(&self, task: &Task) -> Result<()> {
        let mut state = self.state.lock();
        let key = task.key();
        match state.tasks.get_mut(&key) {
            Some(stored) => {
                stored.status = task.status.clone();
                Ok(())
            }
            None => Err(Error::Persistence(format!("task {} not found", key))),
        }
    }

    async fn update_pipeline_status(&self, pipeline: &Pipeline) -> Result<()> {
        let mut state = self.state.lock();
        state.pipeline_phases.push(pipeline.status.phase);
        state
            .pipelines
            .insert(pipeline.key(), pipeline.clone());
        Ok(())
    }
}
