//! Persistence seam between the jobs and the database.
//!
//! The jobs and the scheduler talk to [`PipelineStore`] only, so they can be
//! driven against an in-memory store in tests. [`PgStore`] is the production
//! implementation and delegates to `crosspost_db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosspost_core::{
    MetricSample, Post, PostSchedule, PublicationRecord, TargetChannel, WatchedPublication,
};
use crosspost_db::{ChannelScheduleRow, DbError};
use sqlx::PgPool;

/// Which channels a Watch Job run polls. Every publication on a polled
/// channel is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollScope {
    /// Channels targeted by any post with a watch entry.
    Watched,
    /// Channels targeted by one post, watched or not.
    Post(i64),
}

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get_post(&self, post_id: i64) -> Result<Post, DbError>;

    /// Target channels of a post, each with the session of its binding.
    async fn post_targets(&self, post_id: i64) -> Result<Vec<TargetChannel>, DbError>;

    async fn mark_sent(&self, post_id: i64) -> Result<(), DbError>;

    async fn record_publication(&self, record: &PublicationRecord) -> Result<(), DbError>;

    async fn add_watch(&self, post_id: i64) -> Result<(), DbError>;

    /// Removes watch entries created before `cutoff`; returns how many went.
    async fn purge_watches_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError>;

    /// Distinct channels the Watch Job must visit for `scope`.
    async fn poll_channels(&self, scope: PollScope) -> Result<Vec<TargetChannel>, DbError>;

    /// Every publication on `channel_id`.
    async fn channel_publications(
        &self,
        channel_id: i64,
    ) -> Result<Vec<WatchedPublication>, DbError>;

    /// Views of the most recent sample for (post, channel), if any.
    async fn latest_views(&self, post_id: i64, channel_id: i64) -> Result<Option<i64>, DbError>;

    async fn insert_measurement(&self, sample: &MetricSample) -> Result<(), DbError>;

    /// Notifies every participant of the post's project; returns the count.
    async fn notify_participants(&self, post_id: i64, text: &str) -> Result<u64, DbError>;

    /// Schedules of every post sharing a channel with `post_id`, itself included.
    async fn channel_schedules(&self, post_id: i64) -> Result<Vec<PostSchedule>, DbError>;

    async fn save_job(&self, post_id: i64, run_at: DateTime<Utc>) -> Result<(), DbError>;

    /// Returns `false` if no job was persisted for the post.
    async fn delete_job(&self, post_id: i64) -> Result<bool, DbError>;

    async fn saved_jobs(&self) -> Result<Vec<(i64, DateTime<Utc>)>, DbError>;
}

/// [`PipelineStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn get_post(&self, post_id: i64) -> Result<Post, DbError> {
        Ok(crosspost_db::get_post(&self.pool, post_id).await?.into())
    }

    async fn post_targets(&self, post_id: i64) -> Result<Vec<TargetChannel>, DbError> {
        let rows = crosspost_db::list_post_targets(&self.pool, post_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_sent(&self, post_id: i64) -> Result<(), DbError> {
        crosspost_db::mark_post_sent(&self.pool, post_id).await
    }

    async fn record_publication(&self, record: &PublicationRecord) -> Result<(), DbError> {
        crosspost_db::insert_publication(&self.pool, record).await
    }

    async fn add_watch(&self, post_id: i64) -> Result<(), DbError> {
        crosspost_db::insert_post_watch(&self.pool, post_id).await
    }

    async fn purge_watches_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        crosspost_db::purge_watches_before(&self.pool, cutoff).await
    }

    async fn poll_channels(&self, scope: PollScope) -> Result<Vec<TargetChannel>, DbError> {
        let rows = match scope {
            PollScope::Watched => crosspost_db::list_watched_channels(&self.pool).await?,
            PollScope::Post(post_id) => crosspost_db::list_post_targets(&self.pool, post_id).await?,
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn channel_publications(
        &self,
        channel_id: i64,
    ) -> Result<Vec<WatchedPublication>, DbError> {
        let rows = crosspost_db::list_channel_publications(&self.pool, channel_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest_views(&self, post_id: i64, channel_id: i64) -> Result<Option<i64>, DbError> {
        crosspost_db::latest_views(&self.pool, post_id, channel_id).await
    }

    async fn insert_measurement(&self, sample: &MetricSample) -> Result<(), DbError> {
        crosspost_db::insert_measurement(&self.pool, sample).await
    }

    async fn notify_participants(&self, post_id: i64, text: &str) -> Result<u64, DbError> {
        crosspost_db::notify_project_participants(&self.pool, post_id, text).await
    }

    async fn channel_schedules(&self, post_id: i64) -> Result<Vec<PostSchedule>, DbError> {
        let rows = crosspost_db::list_channel_schedules(&self.pool, post_id).await?;
        Ok(fold_schedules(rows))
    }

    async fn save_job(&self, post_id: i64, run_at: DateTime<Utc>) -> Result<(), DbError> {
        crosspost_db::upsert_scheduled_job(&self.pool, post_id, run_at).await
    }

    async fn delete_job(&self, post_id: i64) -> Result<bool, DbError> {
        crosspost_db::delete_scheduled_job(&self.pool, post_id).await
    }

    async fn saved_jobs(&self) -> Result<Vec<(i64, DateTime<Utc>)>, DbError> {
        let rows = crosspost_db::list_scheduled_jobs(&self.pool).await?;
        Ok(rows.into_iter().map(|row| (row.post_id, row.run_at)).collect())
    }
}

/// Collapses (post, channel) rows into one [`PostSchedule`] per post.
///
/// Rows for the same post need not be adjacent.
#[must_use]
pub fn fold_schedules(rows: Vec<ChannelScheduleRow>) -> Vec<PostSchedule> {
    let mut schedules: Vec<PostSchedule> = Vec::new();
    for row in rows {
        match schedules.iter_mut().find(|s| s.post_id == row.post_id) {
            Some(schedule) => schedule.channel_ids.push(row.channel_id),
            None => schedules.push(PostSchedule {
                post_id: row.post_id,
                schedule_time: row.schedule_time,
                channel_ids: vec![row.channel_id],
            }),
        }
    }
    schedules
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(post_id: i64, channel_id: i64) -> ChannelScheduleRow {
        ChannelScheduleRow {
            post_id,
            channel_id,
            schedule_time: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single(),
        }
    }

    #[test]
    fn fold_schedules_groups_channels_per_post() {
        let folded = fold_schedules(vec![row(1, 10), row(2, 10), row(1, 11)]);

        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].post_id, 1);
        assert_eq!(folded[0].channel_ids, vec![10, 11]);
        assert_eq!(folded[1].post_id, 2);
        assert_eq!(folded[1].channel_ids, vec![10]);
    }

    #[test]
    fn fold_schedules_of_nothing_is_empty() {
        assert!(fold_schedules(Vec::new()).is_empty());
    }
}
