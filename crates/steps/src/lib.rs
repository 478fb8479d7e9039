//! `steps` crate: the `StepHandler` trait, the step registry, and the
//! built-in step types.
//!
//! Every step type, built-in or custom, implements [`StepHandler`]
//! and is registered in a [`StepRegistry`] under its `step_type` tag.
//! Handlers never talk to persistence directly: side effects go through the
//! collaborator traits in [`collaborators`].

pub mod collaborators;
pub mod context;
pub mod error;
pub mod handlers;
pub mod http;
pub mod interpolate;
pub mod mock;
pub mod registry;
pub mod traits;

pub use collaborators::Collaborators;
pub use context::{ExecutionContext, Variables};
pub use error::{CollaboratorError, StepError};
pub use registry::{PreparedStep, StepRegistry, StepSettings};
pub use traits::{StepHandler, StepOutcome, Suspend};
