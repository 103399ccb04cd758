//! Watch Job: samples view and engagement counters of published posts.

use chrono::{DateTime, Utc};
use crosspost_core::{
    crosses_threshold, group_by_session, MetricSample, TargetChannel, DEFAULT_PREVIOUS_VIEWS,
    VIEWS_UNAVAILABLE,
};
use crosspost_telegram::{ChannelMetrics, Messenger, MessengerSession};
use serde::Serialize;

use crate::error::SchedulerError;
use crate::settings::SchedulerSettings;
use crate::store::{PipelineStore, PollScope};

/// Outcome of one Watch Job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    /// Watch entries removed by the retention purge.
    pub purged: u64,
    /// Distinct channels visited.
    pub channels: usize,
    /// Metric samples appended.
    pub samples: usize,
    /// Notifications raised for threshold crossings.
    pub notifications: u64,
}

/// Runs the recurring Watch Job over every watched post.
///
/// # Errors
///
/// Returns [`SchedulerError::Db`] if the purge or the channel lookup fails.
/// Failures scoped to one session or channel are logged and skipped.
pub async fn run_watch(
    store: &dyn PipelineStore,
    messenger: &dyn Messenger,
    settings: &SchedulerSettings,
) -> Result<WatchReport, SchedulerError> {
    let purged = purge(store, settings).await?;
    let mut report = poll(store, messenger, settings, PollScope::Watched).await?;
    report.purged = purged;
    Ok(report)
}

/// Out-of-cycle Watch Job restricted to one post's channels. Every
/// publication on those channels is sampled, not only the post's own.
///
/// # Errors
///
/// Returns [`SchedulerError::Db`] if the purge or the post's channel lookup
/// fails.
pub async fn force_refresh(
    store: &dyn PipelineStore,
    messenger: &dyn Messenger,
    settings: &SchedulerSettings,
    post_id: i64,
) -> Result<WatchReport, SchedulerError> {
    let purged = purge(store, settings).await?;
    let mut report = poll(store, messenger, settings, PollScope::Post(post_id)).await?;
    report.purged = purged;
    Ok(report)
}

async fn purge(
    store: &dyn PipelineStore,
    settings: &SchedulerSettings,
) -> Result<u64, SchedulerError> {
    let cutoff = Utc::now()
        .checked_sub_signed(settings.watch_retention)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let purged = store.purge_watches_before(cutoff).await?;
    if purged > 0 {
        tracing::info!(purged, "scheduler: purged expired watch entries");
    }
    Ok(purged)
}

async fn poll(
    store: &dyn PipelineStore,
    messenger: &dyn Messenger,
    settings: &SchedulerSettings,
    scope: PollScope,
) -> Result<WatchReport, SchedulerError> {
    let channels = store.poll_channels(scope).await?;
    let mut report = WatchReport {
        channels: channels.len(),
        ..WatchReport::default()
    };

    for group in group_by_session(channels) {
        let mut session = match messenger.open(&group.session).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    channels = group.channels.len(),
                    error = %e,
                    "scheduler: could not open session for polling"
                );
                continue;
            }
        };

        for channel in &group.channels {
            if let Err(e) =
                poll_channel(store, session.as_mut(), settings, channel, &mut report).await
            {
                tracing::warn!(channel_id = channel.id, error = %e, "scheduler: channel poll failed");
            }
        }

        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "scheduler: failed to close polling session");
        }
    }

    tracing::info!(
        channels = report.channels,
        samples = report.samples,
        notifications = report.notifications,
        "scheduler: watch run finished"
    );
    Ok(report)
}

async fn poll_channel(
    store: &dyn PipelineStore,
    session: &mut dyn MessengerSession,
    settings: &SchedulerSettings,
    channel: &TargetChannel,
    report: &mut WatchReport,
) -> Result<(), SchedulerError> {
    let publications = store.channel_publications(channel.id).await?;
    if publications.is_empty() {
        return Ok(());
    }

    let message_ids: Vec<i64> = publications.iter().map(|p| p.message_id).collect();
    let ChannelMetrics { views, engagement } = session
        .get_metrics(&channel.channel_id, &message_ids)
        .await?;
    let captured_at = Utc::now();

    for publication in &publications {
        let current = views
            .get(&publication.message_id)
            .copied()
            .flatten()
            .unwrap_or(VIEWS_UNAVAILABLE);
        // Read before insert, otherwise the new sample would be its own "previous".
        let previous = store
            .latest_views(publication.post_id, channel.id)
            .await?
            .unwrap_or(DEFAULT_PREVIOUS_VIEWS);

        let sample = MetricSample {
            post_id: publication.post_id,
            channel_id: channel.id,
            captured_at,
            views: current,
            engagement_rate: engagement
                .rates
                .get(&publication.message_id)
                .copied()
                .unwrap_or(0.0),
            reactions: engagement
                .reactions
                .get(&publication.message_id)
                .copied()
                .unwrap_or(0),
        };
        store.insert_measurement(&sample).await?;
        report.samples += 1;

        if crosses_threshold(previous, current, settings.notify_threshold) {
            let text = format!(
                "Your post {} gained {current} views on channel {}",
                publication.post_name, channel.name
            );
            let notified = store.notify_participants(publication.post_id, &text).await?;
            report.notifications += notified;
            tracing::info!(
                post_id = publication.post_id,
                channel_id = channel.id,
                views = current,
                notified,
                "scheduler: view threshold crossed"
            );
        }
    }

    Ok(())
}
