//! Read access to posts and their target channels, plus the `is_sent` flip.
//!
//! Posts, channels and bindings are written by the CRUD API; the pipeline
//! only reads them and marks a post sent after its delivery cycle.

use chrono::{DateTime, Utc};
use crosspost_core::{Post, SessionKey, TargetChannel};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `posts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub text: String,
    pub schedule_time: Option<DateTime<Utc>>,
    pub is_sent: bool,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            text: row.text,
            schedule_time: row.schedule_time,
            is_sent: row.is_sent,
        }
    }
}

/// A channel joined with the session string of the binding that owns it.
#[derive(Clone, sqlx::FromRow)]
pub struct TargetChannelRow {
    pub id: i64,
    pub channel_id: String,
    pub name: String,
    pub session_string: String,
}

impl std::fmt::Debug for TargetChannelRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetChannelRow")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("name", &self.name)
            .field("session_string", &"[redacted]")
            .finish()
    }
}

impl From<TargetChannelRow> for TargetChannel {
    fn from(row: TargetChannelRow) -> Self {
        Self {
            id: row.id,
            channel_id: row.channel_id,
            name: row.name,
            session: SessionKey::new(row.session_string),
        }
    }
}

/// One (post, channel) addressing pair with the post's delivery instant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelScheduleRow {
    pub post_id: i64,
    pub channel_id: i64,
    pub schedule_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Fetches a single post by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no post exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_post(pool: &PgPool, id: i64) -> Result<PostRow, DbError> {
    sqlx::query_as::<_, PostRow>(
        "SELECT id, project_id, name, text, schedule_time, is_sent \
         FROM posts \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the target channels of a post, ordered by channel id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_post_targets(
    pool: &PgPool,
    post_id: i64,
) -> Result<Vec<TargetChannelRow>, DbError> {
    let rows = sqlx::query_as::<_, TargetChannelRow>(
        "SELECT c.id, c.channel_id, c.name, b.session_string \
         FROM post_target_channels t \
         JOIN channels c ON c.id = t.channel_id \
         JOIN telegram_bindings b ON b.id = c.binding_id \
         WHERE t.post_id = $1 \
         ORDER BY c.id",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sets `is_sent = TRUE`. "Sent" means the delivery cycle ran, not that
/// every channel accepted the message.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the post no longer exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_post_sent(pool: &PgPool, post_id: i64) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE posts SET is_sent = TRUE WHERE id = $1")
        .bind(post_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Returns every (post, channel) pair on the channels targeted by `post_id`,
/// including the post's own pairs.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_channel_schedules(
    pool: &PgPool,
    post_id: i64,
) -> Result<Vec<ChannelScheduleRow>, DbError> {
    let rows = sqlx::query_as::<_, ChannelScheduleRow>(
        "SELECT t.post_id, t.channel_id, p.schedule_time \
         FROM post_target_channels t \
         JOIN posts p ON p.id = t.post_id \
         WHERE t.channel_id IN ( \
             SELECT channel_id FROM post_target_channels WHERE post_id = $1 \
         ) \
         ORDER BY t.post_id, t.channel_id",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
