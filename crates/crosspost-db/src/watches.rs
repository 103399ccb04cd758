//! Watch Registry: which posts are currently polled for stats.
//!
//! Duplicate entries for the same post are expected (one per successful
//! send); only "has at least one entry" matters to readers.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{DbError, TargetChannelRow};

/// Marks a post as watched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_post_watch(pool: &PgPool, post_id: i64) -> Result<(), DbError> {
    sqlx::query("INSERT INTO post_watches (post_id) VALUES ($1)")
        .bind(post_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Deletes watch entries created before `cutoff`. Returns the number removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_watches_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM post_watches WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Distinct target channels of every post with a watch entry.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_watched_channels(pool: &PgPool) -> Result<Vec<TargetChannelRow>, DbError> {
    let rows = sqlx::query_as::<_, TargetChannelRow>(
        "SELECT DISTINCT ON (c.id) c.id, c.channel_id, c.name, b.session_string \
         FROM post_watches w \
         JOIN post_target_channels t ON t.post_id = w.post_id \
         JOIN channels c ON c.id = t.channel_id \
         JOIN telegram_bindings b ON b.id = c.binding_id \
         ORDER BY c.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
