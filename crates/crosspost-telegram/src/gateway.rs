//! HTTP client for the Telegram session gateway.
//!
//! The gateway keeps MTProto connections alive on behalf of bound accounts
//! and exposes them as short JSON calls. Every non-2xx answer is surfaced as
//! [`TelegramError::Rpc`], the per-call failure the jobs skip over.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use crosspost_core::{engagement_rate, Post, SessionKey};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use crate::error::TelegramError;
use crate::messenger::{ChannelMetrics, Engagement, Messenger, MessengerSession};
use crate::types::{
    ChannelInfoResponse, ErrorResponse, MessageStats, MessagesResponse, OpenSessionRequest,
    OpenSessionResponse, SendMessageRequest, SendMessageResponse,
};

/// [`Messenger`] backed by the session gateway.
///
/// Cheap to clone; every clone shares the same connection pool.
#[derive(Clone)]
pub struct GatewayMessenger {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for GatewayMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMessenger")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl GatewayMessenger {
    /// Creates a client for the gateway at `base_url`.
    ///
    /// `timeout_secs` bounds every individual remote call; a timeout surfaces
    /// as [`TelegramError::Http`].
    ///
    /// # Errors
    ///
    /// Returns [`TelegramError::InvalidBaseUrl`] if `base_url` cannot serve
    /// as a base for path segments, or [`TelegramError::Http`] if the
    /// underlying `reqwest::Client` cannot be constructed.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("crosspost/0.1 (scheduler)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalised).map_err(|e| TelegramError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(TelegramError::InvalidBaseUrl {
                url: base_url.to_owned(),
                reason: "URL cannot be a base".to_owned(),
            });
        }

        Ok(Self {
            client,
            base_url: parsed,
            token: token.map(ToOwned::to_owned),
        })
    }

    /// Builds `<base>/v1/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TelegramError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TelegramError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot be a base".to_owned(),
            })?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl Messenger for GatewayMessenger {
    async fn open(&self, session: &SessionKey) -> Result<Box<dyn MessengerSession>, TelegramError> {
        let url = self.endpoint(&["sessions"])?;
        let response = self
            .authorize(self.client.post(url))
            .json(&OpenSessionRequest {
                session: session.expose(),
            })
            .send()
            .await?;
        let opened: OpenSessionResponse = read_json(response, "open session").await?;
        tracing::debug!(session_id = %opened.session_id, "gateway: session opened");

        Ok(Box::new(GatewaySession {
            gateway: self.clone(),
            session_id: opened.session_id,
        }))
    }
}

/// One open gateway session.
struct GatewaySession {
    gateway: GatewayMessenger,
    session_id: String,
}

impl GatewaySession {
    fn channel_url(&self, channel_id: &str, tail: &[&str]) -> Result<Url, TelegramError> {
        let mut segments = vec!["sessions", self.session_id.as_str(), "channels", channel_id];
        segments.extend_from_slice(tail);
        self.gateway.endpoint(&segments)
    }

    /// Fetches counters for `message_ids` in one round trip.
    async fn fetch_messages(
        &self,
        channel_id: &str,
        message_ids: &[i64],
    ) -> Result<MessagesResponse, TelegramError> {
        let mut url = self.channel_url(channel_id, &["messages"])?;
        let ids = message_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        url.query_pairs_mut().append_pair("ids", &ids);

        let response = self
            .gateway
            .authorize(self.gateway.client.get(url))
            .send()
            .await?;
        read_json(response, &format!("messages({channel_id})")).await
    }

    /// Subscriber count from `batch`, or from the channel endpoint when the
    /// gateway left it out.
    async fn subscribers(
        &mut self,
        channel_id: &str,
        batch: &MessagesResponse,
    ) -> Result<i64, TelegramError> {
        match batch.subscriber_count {
            Some(count) => Ok(count),
            None => self.get_subscriber_count(channel_id).await,
        }
    }
}

fn engagement_of(messages: &[MessageStats], subscribers: i64) -> Engagement {
    let mut engagement = Engagement::default();
    for message in messages {
        engagement
            .rates
            .insert(message.id, engagement_rate(message.actions(), subscribers));
        engagement.reactions.insert(message.id, message.reactions);
    }
    engagement
}

#[async_trait]
impl MessengerSession for GatewaySession {
    async fn send(&mut self, channel_id: &str, post: &Post) -> Result<i64, TelegramError> {
        let url = self.channel_url(channel_id, &["messages"])?;
        let response = self
            .gateway
            .authorize(self.gateway.client.post(url))
            .json(&SendMessageRequest { text: &post.text })
            .send()
            .await?;
        let sent: SendMessageResponse =
            read_json(response, &format!("send({channel_id})")).await?;
        Ok(sent.message_id)
    }

    async fn get_views(
        &mut self,
        channel_id: &str,
        message_ids: &[i64],
    ) -> Result<HashMap<i64, Option<i64>>, TelegramError> {
        let batch = self.fetch_messages(channel_id, message_ids).await?;
        Ok(batch.messages.into_iter().map(|m| (m.id, m.views)).collect())
    }

    async fn get_engagement(
        &mut self,
        channel_id: &str,
        message_ids: &[i64],
    ) -> Result<Engagement, TelegramError> {
        let batch = self.fetch_messages(channel_id, message_ids).await?;
        let subscribers = self.subscribers(channel_id, &batch).await?;
        Ok(engagement_of(&batch.messages, subscribers))
    }

    async fn get_metrics(
        &mut self,
        channel_id: &str,
        message_ids: &[i64],
    ) -> Result<ChannelMetrics, TelegramError> {
        let batch = self.fetch_messages(channel_id, message_ids).await?;
        let subscribers = self.subscribers(channel_id, &batch).await?;
        let engagement = engagement_of(&batch.messages, subscribers);
        let views = batch.messages.into_iter().map(|m| (m.id, m.views)).collect();
        Ok(ChannelMetrics { views, engagement })
    }

    async fn get_subscriber_count(&mut self, channel_id: &str) -> Result<i64, TelegramError> {
        let url = self.channel_url(channel_id, &[])?;
        let response = self
            .gateway
            .authorize(self.gateway.client.get(url))
            .send()
            .await?;
        let info: ChannelInfoResponse =
            read_json(response, &format!("channel({channel_id})")).await?;
        Ok(info.subscriber_count)
    }

    async fn close(self: Box<Self>) -> Result<(), TelegramError> {
        let url = self.gateway.endpoint(&["sessions", &self.session_id])?;
        let response = self
            .gateway
            .authorize(self.gateway.client.delete(url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelegramError::Rpc {
                status: status.as_u16(),
                message: error_message(body),
            });
        }
        tracing::debug!(session_id = %self.session_id, "gateway: session closed");
        Ok(())
    }
}

/// Checks the HTTP status and parses the body as `T`.
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
) -> Result<T, TelegramError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(TelegramError::Rpc {
            status: status.as_u16(),
            message: error_message(body),
        });
    }
    serde_json::from_str(&body).map_err(|e| TelegramError::Deserialize {
        context: context.to_owned(),
        source: e,
    })
}

/// Prefers the gateway's `{"error": "..."}` message over the raw body.
fn error_message(body: String) -> String {
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => parsed.error,
        Err(_) => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_encoded_segments() {
        let gateway = GatewayMessenger::new("http://gw.local/api", None, 5).expect("client");
        let url = gateway
            .endpoint(&["sessions", "abc", "channels", "@news room"])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://gw.local/api/v1/sessions/abc/channels/@news%20room"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        let err = GatewayMessenger::new("mailto:ops@example.com", None, 5).unwrap_err();
        assert!(matches!(err, TelegramError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        assert_eq!(
            error_message(r#"{"error": "CHAT_WRITE_FORBIDDEN"}"#.to_owned()),
            "CHAT_WRITE_FORBIDDEN"
        );
        assert_eq!(error_message("bad gateway".to_owned()), "bad gateway");
    }

    #[test]
    fn debug_hides_token() {
        let gateway = GatewayMessenger::new("http://gw.local", Some("tok"), 5).expect("client");
        let rendered = format!("{gateway:?}");
        assert!(rendered.contains("[redacted]"));
        assert!(!rendered.contains("\"tok\""));
    }
}
