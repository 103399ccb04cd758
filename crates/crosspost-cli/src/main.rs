mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "crosspost-cli")]
#[command(about = "Crosspost scheduling management commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// List persisted pending deliveries
    Jobs,
    /// Check whether a post clashes with another post on a shared channel
    Collision {
        /// Post id to check
        post_id: i64,
    },
    /// Poll one post's publications now
    Refresh {
        /// Post id to refresh
        post_id: i64,
    },
    /// Run one Watch Job pass over every watched post
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = crosspost_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = crosspost_db::PoolConfig::from_app_config(&config);
    let pool = crosspost_db::connect_pool(&config.database_url, pool_config).await?;

    match cli.command {
        Commands::Migrate => commands::run_migrate(&pool).await,
        Commands::Jobs => commands::run_jobs(&pool).await,
        Commands::Collision { post_id } => commands::run_collision(pool, &config, post_id).await,
        Commands::Refresh { post_id } => commands::run_refresh(pool, &config, Some(post_id)).await,
        Commands::Watch => commands::run_refresh(pool, &config, None).await,
    }
}
