//! Database operations for `notifications`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `notifications` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub issued_at: DateTime<Utc>,
    pub text: String,
    pub is_read: bool,
}

/// Issues one notification to every participant of the post's project.
///
/// Returns the number of notifications created.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn notify_project_participants(
    pool: &PgPool,
    post_id: i64,
    text: &str,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "INSERT INTO notifications (user_id, text) \
         SELECT pp.user_id, $2 \
         FROM posts p \
         JOIN project_participants pp ON pp.project_id = p.project_id \
         WHERE p.id = $1",
    )
    .bind(post_id)
    .bind(text)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Notifications of one user, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_notifications(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<NotificationRow>, DbError> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        "SELECT id, user_id, issued_at, text, is_read \
         FROM notifications \
         WHERE user_id = $1 \
         ORDER BY issued_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
