use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::DbError;

pub type DbPool = PgPool;

/// Bound on waiting for a free connection; past it the store reports
/// itself unreachable instead of stalling the dispatch.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a pool of at most `max_connections` against `database_url`.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    debug!(max_connections, "opening Postgres pool");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    info!("connected to Postgres");
    Ok(pool)
}

/// Apply the embedded migrations from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("applying migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
