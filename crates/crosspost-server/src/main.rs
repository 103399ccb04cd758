mod api;
mod middleware;

use std::sync::Arc;

use crosspost_scheduler::{PgStore, Scheduler, SchedulerSettings};
use crosspost_telegram::GatewayMessenger;
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = crosspost_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = crosspost_db::PoolConfig::from_app_config(&config);
    let pool = crosspost_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = crosspost_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let gateway = GatewayMessenger::new(
        &config.gateway_url,
        config.gateway_token.as_deref(),
        config.gateway_timeout_secs,
    )?;
    let scheduler = Scheduler::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(gateway),
        SchedulerSettings::from_app_config(&config),
    )
    .await?;

    if config.scheduler_autostart {
        scheduler.start().await?;
    } else {
        tracing::warn!("scheduler autostart disabled; deliveries will not fire");
    }

    let app = build_app(AppState {
        pool,
        scheduler: scheduler.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if scheduler.is_started() {
        scheduler.stop().await?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
