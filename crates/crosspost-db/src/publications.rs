//! Database operations for `published_posts`.

use crosspost_core::{PublicationRecord, WatchedPublication};
use sqlx::PgPool;

use crate::DbError;

/// A publication joined with its post's name, as the Watch Job consumes it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PublicationRow {
    pub post_id: i64,
    pub post_name: String,
    pub message_id: i64,
}

impl From<PublicationRow> for WatchedPublication {
    fn from(row: PublicationRow) -> Self {
        Self {
            post_id: row.post_id,
            post_name: row.post_name,
            message_id: row.message_id,
        }
    }
}

/// Records one successful channel send.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_publication(
    pool: &PgPool,
    publication: &PublicationRecord,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO published_posts (post_id, channel_id, message_id) \
         VALUES ($1, $2, $3)",
    )
    .bind(publication.post_id)
    .bind(publication.channel_id)
    .bind(publication.message_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Every publication on `channel_id`, whatever its post's watch state.
///
/// The Watch Registry decides which channels get polled; once a channel is
/// polled, all of its publications are sampled.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_channel_publications(
    pool: &PgPool,
    channel_id: i64,
) -> Result<Vec<PublicationRow>, DbError> {
    let rows = sqlx::query_as::<_, PublicationRow>(
        "SELECT pp.post_id, p.name AS post_name, pp.message_id \
         FROM published_posts pp \
         JOIN posts p ON p.id = pp.post_id \
         WHERE pp.channel_id = $1 \
         ORDER BY pp.id",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
