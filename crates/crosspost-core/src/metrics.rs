//! Engagement sample type and the arithmetic the Watch Job relies on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recorded when the messaging gateway cannot report views for a message.
pub const VIEWS_UNAVAILABLE: i64 = -1;

/// Previous view count assumed for a (post, channel) pair with no samples yet.
pub const DEFAULT_PREVIOUS_VIEWS: i64 = 0;

/// One poll result for a (post, channel) pair. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub post_id: i64,
    pub channel_id: i64,
    pub captured_at: DateTime<Utc>,
    pub views: i64,
    pub engagement_rate: f64,
    pub reactions: i64,
}

/// `true` when a poll moves views from below `threshold` to at or above it.
///
/// Because the previous value of the next poll is already at or above the
/// threshold, a crossing is reported exactly once.
#[must_use]
pub fn crosses_threshold(previous: i64, current: i64, threshold: i64) -> bool {
    previous < threshold && threshold <= current
}

/// Actions (reactions + forwards + replies) per subscriber.
///
/// Channels reporting zero subscribers yield `0.0` instead of dividing by zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn engagement_rate(actions: i64, subscribers: i64) -> f64 {
    if subscribers <= 0 {
        return 0.0;
    }
    actions as f64 / subscribers as f64
}
