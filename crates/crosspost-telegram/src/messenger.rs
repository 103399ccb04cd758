use std::collections::HashMap;

use async_trait::async_trait;
use crosspost_core::{Post, SessionKey};

use crate::error::TelegramError;

/// Engagement figures for a batch of messages on one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Engagement {
    /// Message id -> actions per subscriber.
    pub rates: HashMap<i64, f64>,
    /// Message id -> reaction count.
    pub reactions: HashMap<i64, i64>,
}

/// Views and engagement of a batch of messages, fetched together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMetrics {
    /// Message id -> views; `None` when the channel does not expose views.
    pub views: HashMap<i64, Option<i64>>,
    pub engagement: Engagement,
}

/// Opens connections for bound accounts.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Opens one connection for `session`. Callers must hand the returned
    /// session back through [`MessengerSession::close`] on every path.
    async fn open(&self, session: &SessionKey) -> Result<Box<dyn MessengerSession>, TelegramError>;
}

/// One live connection for a bound account.
#[async_trait]
pub trait MessengerSession: Send {
    /// Publishes `post` to `channel_id` and returns the remote message id.
    async fn send(&mut self, channel_id: &str, post: &Post) -> Result<i64, TelegramError>;

    /// View counts per message. `None` means the channel does not expose views.
    async fn get_views(
        &mut self,
        channel_id: &str,
        message_ids: &[i64],
    ) -> Result<HashMap<i64, Option<i64>>, TelegramError>;

    async fn get_engagement(
        &mut self,
        channel_id: &str,
        message_ids: &[i64],
    ) -> Result<Engagement, TelegramError>;

    async fn get_subscriber_count(&mut self, channel_id: &str) -> Result<i64, TelegramError>;

    /// Views and engagement for `message_ids` in one call. Implementations
    /// that can batch both should override this.
    async fn get_metrics(
        &mut self,
        channel_id: &str,
        message_ids: &[i64],
    ) -> Result<ChannelMetrics, TelegramError> {
        let engagement = self.get_engagement(channel_id, message_ids).await?;
        let views = self.get_views(channel_id, message_ids).await?;
        Ok(ChannelMetrics { views, engagement })
    }

    async fn close(self: Box<Self>) -> Result<(), TelegramError>;
}
