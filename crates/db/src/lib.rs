//! `db` crate: Postgres persistence for workflows, executions and the
//! CRM-side tables the built-in steps touch (agents, records, notifications).
//!
//! One repository function per statement; row structs mirror the columns.
//! Decoding rows into domain types is the engine's job.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use models::ExecutionStatus;
pub use pool::{connect, DbPool};
