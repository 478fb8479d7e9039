//! Notification outbox. A committed insert is the enqueue confirmation; a
//! separate delivery process drains the table.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::NotificationRow};

pub async fn enqueue_notification(
    pool: &PgPool,
    recipient: &str,
    subject: &str,
    message: &str,
) -> Result<NotificationRow, DbError> {
    let row = sqlx::query_as::<_, NotificationRow>(
        r#"
        INSERT INTO notifications (id, recipient, subject, message, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, recipient, subject, message, created_at, delivered_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(recipient)
    .bind(subject)
    .bind(message)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}
