//! Target record store (tickets, leads, ...): schemaless JSON documents keyed
//! by `(collection, id)`.

use sqlx::PgPool;

use crate::DbError;

/// Shallow-merge `fields` into the record's data.
///
/// Returns `DbError::NotFound` if the record does not exist.
pub async fn patch_record(
    pool: &PgPool,
    collection: &str,
    id: &str,
    fields: &serde_json::Value,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE records
        SET data = data || $3, updated_at = NOW()
        WHERE collection = $1 AND id = $2
        "#,
    )
    .bind(collection)
    .bind(id)
    .bind(fields)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
