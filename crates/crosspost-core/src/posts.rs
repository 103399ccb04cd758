//! Post-side domain types shared by the stores, the jobs, and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sessions::SessionKey;

/// A post as the scheduling pipeline sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub text: String,
    /// `None` means the post is a draft with no delivery instant.
    pub schedule_time: Option<DateTime<Utc>>,
    pub is_sent: bool,
}

/// A channel a post is addressed to, together with the account session
/// that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetChannel {
    /// Internal channel row id.
    pub id: i64,
    /// Remote identifier understood by the messaging gateway.
    pub channel_id: String,
    pub name: String,
    pub session: SessionKey,
}

/// Produced once per successful channel send. Never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub post_id: i64,
    pub channel_id: i64,
    pub message_id: i64,
}

/// A publication that is due for metric polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedPublication {
    pub post_id: i64,
    pub post_name: String,
    pub message_id: i64,
}
