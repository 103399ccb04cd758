//! Command handlers. None of them starts the background scheduler: every
//! job body runs once, inline, and the process exits.

use crosspost_core::AppConfig;
use crosspost_scheduler::{
    check_collision, force_refresh, run_watch, PgStore, SchedulerSettings, WatchReport,
};
use crosspost_telegram::GatewayMessenger;
use sqlx::PgPool;

/// Apply pending migrations.
///
/// # Errors
///
/// Returns an error if a migration fails.
pub(crate) async fn run_migrate(pool: &PgPool) -> anyhow::Result<()> {
    let applied = crosspost_db::run_migrations(pool).await?;
    println!("applied {applied} migration(s)");
    Ok(())
}

/// Print the persisted job table.
///
/// # Errors
///
/// Returns an error if the query fails.
pub(crate) async fn run_jobs(pool: &PgPool) -> anyhow::Result<()> {
    let jobs = crosspost_db::list_scheduled_jobs(pool).await?;
    if jobs.is_empty() {
        println!("no pending deliveries");
        return Ok(());
    }

    println!("{:<10}{:<28}UPDATED", "POST", "RUN AT");
    for job in &jobs {
        println!(
            "{:<10}{:<28}{}",
            job.post_id,
            job.run_at.to_rfc3339(),
            job.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

/// Report whether a post clashes with another one on a shared channel.
///
/// # Errors
///
/// Returns an error if the schedules cannot be loaded.
pub(crate) async fn run_collision(
    pool: PgPool,
    config: &AppConfig,
    post_id: i64,
) -> anyhow::Result<()> {
    let store = PgStore::new(pool);
    let settings = SchedulerSettings::from_app_config(config);
    let collision = check_collision(&store, post_id, settings.collision_window).await?;

    if collision {
        println!("post {post_id}: time clash");
    } else {
        println!("post {post_id}: no clash");
    }
    Ok(())
}

/// Run the Watch Job once, for one post when `post_id` is given, otherwise
/// for every watched post.
///
/// # Errors
///
/// Returns an error if the gateway client cannot be built or the job cannot
/// load its channels.
pub(crate) async fn run_refresh(
    pool: PgPool,
    config: &AppConfig,
    post_id: Option<i64>,
) -> anyhow::Result<()> {
    let store = PgStore::new(pool);
    let gateway = GatewayMessenger::new(
        &config.gateway_url,
        config.gateway_token.as_deref(),
        config.gateway_timeout_secs,
    )?;
    let settings = SchedulerSettings::from_app_config(config);

    let report = match post_id {
        Some(post_id) => force_refresh(&store, &gateway, &settings, post_id).await?,
        None => run_watch(&store, &gateway, &settings).await?,
    };
    print_report(&report);
    Ok(())
}

fn print_report(report: &WatchReport) {
    println!(
        "purged={} channels={} samples={} notifications={}",
        report.purged, report.channels, report.samples, report.notifications
    );
}
