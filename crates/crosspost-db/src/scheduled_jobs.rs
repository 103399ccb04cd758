//! Persisted side of the scheduler's job table.
//!
//! Keyed by `post_id`, so the table itself cannot hold two pending
//! deliveries for one post.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `scheduled_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduledJobRow {
    pub post_id: i64,
    pub run_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inserts or replaces the pending delivery for a post.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_scheduled_job(
    pool: &PgPool,
    post_id: i64,
    run_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO scheduled_jobs (post_id, run_at) \
         VALUES ($1, $2) \
         ON CONFLICT (post_id) DO UPDATE SET \
             run_at     = EXCLUDED.run_at, \
             updated_at = NOW()",
    )
    .bind(post_id)
    .bind(run_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Removes the pending delivery for a post. Returns `false` if there was none.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_scheduled_job(pool: &PgPool, post_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM scheduled_jobs WHERE post_id = $1")
        .bind(post_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// All pending deliveries, earliest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scheduled_jobs(pool: &PgPool) -> Result<Vec<ScheduledJobRow>, DbError> {
    let rows = sqlx::query_as::<_, ScheduledJobRow>(
        "SELECT post_id, run_at, updated_at \
         FROM scheduled_jobs \
         ORDER BY run_at, post_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
