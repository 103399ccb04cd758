pub mod app_config;
pub mod collision;
pub mod config;
pub mod metrics;
pub mod posts;
pub mod sessions;

pub use app_config::{AppConfig, Environment};
pub use collision::{has_collision, PostSchedule};
pub use config::{load_app_config, load_app_config_from_env};
pub use metrics::{
    crosses_threshold, engagement_rate, MetricSample, DEFAULT_PREVIOUS_VIEWS, VIEWS_UNAVAILABLE,
};
pub use posts::{Post, PublicationRecord, TargetChannel, WatchedPublication};
pub use sessions::{group_by_session, ChannelGroup, SessionKey};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
