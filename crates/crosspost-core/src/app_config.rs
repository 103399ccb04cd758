use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Only the long-running server honours this; one-shot commands never start jobs.
    pub scheduler_autostart: bool,
    pub scheduler_workers: usize,
    pub delivery_lead_secs: u64,
    pub send_pacing_ms: u64,
    /// Six-field cron expression (seconds first), evaluated in UTC.
    pub watch_cron: String,
    pub watch_retention_days: u32,
    pub notify_threshold: i64,
    pub collision_window_mins: u32,
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    pub gateway_timeout_secs: u64,
}

impl AppConfig {
    /// Fallback tracing filter used when `RUST_LOG` is unset.
    ///
    /// Development runs also get debug output from the job scheduler.
    #[must_use]
    pub fn log_filter(&self) -> String {
        match self.env {
            Environment::Development => format!(
                "{},crosspost_scheduler=debug,tokio_cron_scheduler=debug",
                self.log_level
            ),
            Environment::Test | Environment::Production => self.log_level.clone(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("scheduler_autostart", &self.scheduler_autostart)
            .field("scheduler_workers", &self.scheduler_workers)
            .field("delivery_lead_secs", &self.delivery_lead_secs)
            .field("send_pacing_ms", &self.send_pacing_ms)
            .field("watch_cron", &self.watch_cron)
            .field("watch_retention_days", &self.watch_retention_days)
            .field("notify_threshold", &self.notify_threshold)
            .field("collision_window_mins", &self.collision_window_mins)
            .field("gateway_url", &self.gateway_url)
            .field(
                "gateway_token",
                &self.gateway_token.as_ref().map(|_| "[redacted]"),
            )
            .field("gateway_timeout_secs", &self.gateway_timeout_secs)
            .finish()
    }
}
