use std::time::Duration;

use crosspost_core::AppConfig;

/// Tunables of the scheduler and its two jobs.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Capacity of the worker pool shared by every job execution.
    pub workers: usize,
    /// How long before the delivery instant a Delivery Job fires.
    pub delivery_lead: Duration,
    /// Residual margin the Delivery Job leaves before the delivery instant.
    pub send_margin: Duration,
    /// Pause after each successful send within one session.
    pub send_pacing: Duration,
    /// Six-field cron expression (UTC) of the Watch Job.
    pub watch_cron: String,
    /// Watch entries older than this are purged.
    pub watch_retention: chrono::Duration,
    pub notify_threshold: i64,
    /// Half-width of the collision safe zone.
    pub collision_window: chrono::Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            workers: 50,
            delivery_lead: Duration::from_secs(20),
            send_margin: Duration::from_secs(1),
            send_pacing: Duration::from_millis(100),
            watch_cron: "0 */5 * * * *".to_owned(),
            watch_retention: chrono::Duration::days(4096),
            notify_threshold: 3,
            collision_window: chrono::Duration::minutes(5),
        }
    }
}

impl SchedulerSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            workers: config.scheduler_workers,
            delivery_lead: Duration::from_secs(config.delivery_lead_secs),
            send_pacing: Duration::from_millis(config.send_pacing_ms),
            watch_cron: config.watch_cron.clone(),
            watch_retention: chrono::Duration::days(i64::from(config.watch_retention_days)),
            notify_threshold: config.notify_threshold,
            collision_window: chrono::Duration::minutes(i64::from(config.collision_window_mins)),
            ..Self::default()
        }
    }
}
