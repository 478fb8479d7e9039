//! Repository functions: one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types, pure SQL.
//!
//! Queries are checked at runtime (`query_as::<_, Row>`), so building the
//! workspace never needs a live `DATABASE_URL`.

pub mod agents;
pub mod executions;
pub mod notifications;
pub mod records;
pub mod steps;
pub mod workflows;
