//! Agent directory queries.

use sqlx::PgPool;

use crate::DbError;

/// The active agent with the fewest open tickets assigned, ties broken by id.
///
/// A ticket counts as open unless its `status` is `resolved` or `closed`.
pub async fn least_busy_agent(pool: &PgPool) -> Result<Option<String>, DbError> {
    let id = sqlx::query_scalar::<_, String>(
        r#"
        SELECT a.id
        FROM agents a
        LEFT JOIN records r
               ON r.collection = 'tickets'
              AND r.data->>'assigned_to' = a.id
              AND COALESCE(r.data->>'status', 'open') NOT IN ('resolved', 'closed')
        WHERE a.is_active AND a.role = 'agent'
        GROUP BY a.id
        ORDER BY COUNT(r.id) ASC, a.id ASC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Ids of every active manager.
pub async fn list_manager_ids(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT id FROM agents WHERE is_active AND role = 'manager' ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
