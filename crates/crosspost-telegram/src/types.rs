//! Wire types of the session gateway's JSON API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct OpenSessionRequest<'a> {
    pub session: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageResponse {
    pub message_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    /// Present when the gateway batches the channel's audience with the counters.
    #[serde(default)]
    pub subscriber_count: Option<i64>,
    pub messages: Vec<MessageStats>,
}

/// Counters the gateway reports for one published message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageStats {
    pub id: i64,
    /// `null` for chats that do not count views (groups).
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub forwards: i64,
    #[serde(default)]
    pub replies: i64,
    #[serde(default)]
    pub reactions: i64,
}

impl MessageStats {
    /// Reactions, forwards and replies combined.
    #[must_use]
    pub fn actions(&self) -> i64 {
        self.reactions + self.forwards + self.replies
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelInfoResponse {
    pub subscriber_count: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}
