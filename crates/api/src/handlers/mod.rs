pub mod events;
pub mod executions;
pub mod health;
pub mod workflows;
