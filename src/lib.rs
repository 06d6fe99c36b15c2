//! # Runbook - A Pipeline-Driven Playbook Executor
//!
//! Runbook executes declarative automation playbooks against an inventory
//! of hosts. A persisted **Pipeline** record selects a playbook and tag
//! filters; the executor materializes every leaf of the play tree into a
//! persisted **Task** record, runs it across its hosts concurrently
//! through pluggable modules, and reports the aggregate outcome back on
//! the pipeline.
//!
//! ## Core Concepts
//!
//! - **Pipeline**: persisted record owning one execution's phase, counters
//!   and failure details
//! - **Playbook**: ordered plays, each binding host patterns to block lists
//! - **Block**: recursive node with when/tags/vars and rescue/always
//!   error-recovery clauses
//! - **Task**: persisted materialization of a leaf block, driven to a
//!   terminal phase
//! - **Modules**: named actions invoked per host with raw args
//! - **Variable store**: per-host overlay scopes shared by all units of work
//!
//! ## Architecture Overview
//!
//! ```text
//! PipelineExecutor::exec
//!         │
//!         ▼
//!    Play Driver ── resolve hosts ── gather facts ── serial batches
//!         │
//!         ▼
//!    Block Walker ── tags/vars/run_once ── composite ⇄ rescue/always
//!         │                                    │
//!         ▼                                    ▼ (leaf)
//!    Task Runner ◄───────────────── materialize + persist Task
//!         │
//!         ▼
//!    per-host units (parallel) ── when ── loop ── module dispatch
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use runbook::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pipeline = Pipeline::new("deploy", "default", PipelineSpec {
//!         playbook: "site.yml".into(),
//!         ..PipelineSpec::default()
//!     });
//!     let project = Arc::new(LocalProject::from_pipeline(&pipeline));
//!     let variables = Arc::new(VariableStore::new(Inventory::new(["web1", "web2"])));
//!
//!     let mut executor = PipelineExecutor::new(
//!         pipeline,
//!         project,
//!         Arc::new(InMemoryStore::new()),
//!         Arc::new(ModuleRegistry::with_builtins()),
//!         variables,
//!     );
//!     executor.exec(&CancellationToken::new()).await?;
//!     println!("{}", executor.pipeline().status.phase);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::error::{Error, Result};
    pub use crate::executor::PipelineExecutor;
    pub use crate::modules::{ExecOptions, Module, ModuleRegistry};
    pub use crate::pipeline::{Pipeline, PipelinePhase, PipelineSpec};
    pub use crate::playbook::{Block, Play, Playbook, Role};
    pub use crate::project::{LocalProject, Project, StaticProject};
    pub use crate::store::{InMemoryStore, RecordStore};
    pub use crate::task::{HostResult, Task, TaskPhase};
    pub use crate::vars::{Inventory, Update, VariableStore};
}

pub mod error;
pub mod pipeline;
pub mod playbook;
pub mod project;
pub mod task;
pub mod vars;

pub mod modules;
pub mod store;

pub mod executor;

/// Returns the current version of runbook.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
