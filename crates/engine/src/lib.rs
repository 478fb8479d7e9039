//! `engine` crate: domain models, the workflow store, and the event-driven
//! execution engine.

pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod loader;
pub mod models;
pub mod recorder;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use config::EngineConfig;
pub use dispatcher::{ApprovalDecision, DispatchSummary, WorkflowEngine, WorkflowRunResult};
pub use error::EngineError;
pub use loader::{validate_steps, StepLoader};
pub use models::{
    Continuation, ExecutionLog, ExecutionStatus, StepDefinition, Workflow, WorkflowDefinition,
    WorkflowExecution, WorkflowStep,
};
pub use scheduler::Scheduler;
pub use store::{MemoryStore, PgStore, StoreError, WorkflowStore};
