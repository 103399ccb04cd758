//! Metric Store: append-only engagement samples per (post, channel).

use chrono::{DateTime, Utc};
use crosspost_core::MetricSample;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `post_measurements` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MeasurementRow {
    pub id: i64,
    pub post_id: i64,
    pub channel_id: i64,
    pub created_at: DateTime<Utc>,
    pub views: i64,
    pub engagement_rate: f64,
    pub reactions: i64,
}

/// Appends one sample. Rows are never updated or deleted by the pipeline.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_measurement(pool: &PgPool, sample: &MetricSample) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO post_measurements \
             (post_id, channel_id, created_at, views, engagement_rate, reactions) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(sample.post_id)
    .bind(sample.channel_id)
    .bind(sample.captured_at)
    .bind(sample.views)
    .bind(sample.engagement_rate)
    .bind(sample.reactions)
    .execute(pool)
    .await?;

    Ok(())
}

/// View count of the most recent sample for a (post, channel) pair, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_views(
    pool: &PgPool,
    post_id: i64,
    channel_id: i64,
) -> Result<Option<i64>, DbError> {
    let views = sqlx::query_scalar::<_, i64>(
        "SELECT views FROM post_measurements \
         WHERE post_id = $1 AND channel_id = $2 \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(post_id)
    .bind(channel_id)
    .fetch_optional(pool)
    .await?;

    Ok(views)
}

/// All samples of a post, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_measurements(
    pool: &PgPool,
    post_id: i64,
) -> Result<Vec<MeasurementRow>, DbError> {
    let rows = sqlx::query_as::<_, MeasurementRow>(
        "SELECT id, post_id, channel_id, created_at, views, engagement_rate, reactions \
         FROM post_measurements \
         WHERE post_id = $1 \
         ORDER BY created_at, id",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
