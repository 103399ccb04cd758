//! Messaging collaborator for the scheduling pipeline.
//!
//! The jobs only see the [`Messenger`] / [`MessengerSession`] traits.
//! [`GatewayMessenger`] implements them against an HTTP session gateway
//! that holds the actual Telegram client connections.

mod error;
mod gateway;
mod messenger;
mod types;

pub use error::TelegramError;
pub use gateway::GatewayMessenger;
pub use messenger::{ChannelMetrics, Engagement, Messenger, MessengerSession};
pub use types::MessageStats;
