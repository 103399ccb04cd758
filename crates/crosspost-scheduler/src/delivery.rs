//! Delivery Job: publishes one post to every target channel.

use std::time::Duration;

use chrono::{DateTime, Utc};
use crosspost_core::{group_by_session, Post, PublicationRecord, TargetChannel};
use crosspost_telegram::{Messenger, MessengerSession};
use serde::Serialize;

use crate::error::SchedulerError;
use crate::settings::SchedulerSettings;
use crate::store::PipelineStore;

/// Outcome of one Delivery Job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Channels that accepted the post.
    pub sent: usize,
    /// Channels whose send failed or whose session could not be opened.
    pub failed: usize,
}

/// How long to wait at fire time so the first send lands `margin` before
/// `delivery_at`. Zero once that moment has passed.
#[must_use]
pub fn residual_wait(delivery_at: DateTime<Utc>, margin: Duration, now: DateTime<Utc>) -> Duration {
    (delivery_at - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .saturating_sub(margin)
}

/// Runs the Delivery Job for `post_id`.
///
/// One session is opened per distinct session key before the residual wait,
/// sends inside a session are sequential and paced, and a failing channel
/// never stops the others. The post is marked sent once every group has been
/// attempted, and every opened session is closed afterwards.
///
/// # Errors
///
/// Returns [`SchedulerError::Db`] only if the post or its targets cannot be
/// loaded; nothing has been opened at that point.
pub async fn run_delivery(
    store: &dyn PipelineStore,
    messenger: &dyn Messenger,
    settings: &SchedulerSettings,
    post_id: i64,
) -> Result<DeliveryReport, SchedulerError> {
    let post = store.get_post(post_id).await?;
    let targets = store.post_targets(post_id).await?;
    let mut report = DeliveryReport::default();

    let mut opened: Vec<(Box<dyn MessengerSession>, Vec<TargetChannel>)> = Vec::new();
    for group in group_by_session(targets) {
        match messenger.open(&group.session).await {
            Ok(session) => opened.push((session, group.channels)),
            Err(e) => {
                report.failed += group.channels.len();
                tracing::error!(
                    post_id,
                    channels = group.channels.len(),
                    error = %e,
                    "scheduler: could not open session; skipping its channels"
                );
            }
        }
    }

    if let Some(delivery_at) = post.schedule_time {
        let wait = residual_wait(delivery_at, settings.send_margin, Utc::now());
        if !wait.is_zero() {
            tracing::debug!(post_id, ?wait, "scheduler: waiting for delivery instant");
            tokio::time::sleep(wait).await;
        }
    }

    for (session, channels) in &mut opened {
        for channel in &*channels {
            match session.send(&channel.channel_id, &post).await {
                Ok(message_id) => {
                    record_success(store, &post, channel, message_id).await;
                    report.sent += 1;
                    tokio::time::sleep(settings.send_pacing).await;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        post_id,
                        channel_id = channel.id,
                        error = %e,
                        "scheduler: send failed; continuing with next channel"
                    );
                }
            }
        }
    }

    if let Err(e) = store.mark_sent(post_id).await {
        tracing::error!(post_id, error = %e, "scheduler: failed to mark post sent");
    }

    for (session, _) in opened {
        if let Err(e) = session.close().await {
            tracing::warn!(post_id, error = %e, "scheduler: failed to close session");
        }
    }

    tracing::info!(post_id, sent = report.sent, failed = report.failed, "scheduler: delivery finished");
    Ok(report)
}

async fn record_success(
    store: &dyn PipelineStore,
    post: &Post,
    channel: &TargetChannel,
    message_id: i64,
) {
    let record = PublicationRecord {
        post_id: post.id,
        channel_id: channel.id,
        message_id,
    };
    if let Err(e) = store.record_publication(&record).await {
        tracing::error!(
            post_id = post.id,
            channel_id = channel.id,
            message_id,
            error = %e,
            "scheduler: failed to record publication"
        );
    }
    if let Err(e) = store.add_watch(post.id).await {
        tracing::error!(post_id = post.id, error = %e, "scheduler: failed to add watch entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, secs)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn residual_wait_stops_one_margin_early() {
        let wait = residual_wait(at(20), Duration::from_secs(1), at(0));
        assert_eq!(wait, Duration::from_secs(19));
    }

    #[test]
    fn residual_wait_is_zero_inside_margin() {
        assert_eq!(residual_wait(at(20), Duration::from_secs(1), at(19)), Duration::ZERO);
    }

    #[test]
    fn residual_wait_is_zero_when_instant_passed() {
        assert_eq!(residual_wait(at(5), Duration::from_secs(1), at(30)), Duration::ZERO);
    }
}
