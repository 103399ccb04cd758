//! Offline unit tests for crosspost-db pool configuration and row types.
//! These tests do not require a live database connection.

use crosspost_core::{AppConfig, Environment, Post, TargetChannel, WatchedPublication};
use crosspost_db::{PoolConfig, PostRow, PublicationRow, TargetChannelRow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        scheduler_autostart: false,
        scheduler_workers: 50,
        delivery_lead_secs: 20,
        send_pacing_ms: 100,
        watch_cron: "0 */5 * * * *".to_string(),
        watch_retention_days: 4096,
        notify_threshold: 3,
        collision_window_mins: 5,
        gateway_url: "http://127.0.0.1:8081/".to_string(),
        gateway_token: None,
        gateway_timeout_secs: 30,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn post_row_converts_to_domain_post() {
    let row = PostRow {
        id: 5,
        project_id: 2,
        name: "Launch".to_string(),
        text: "<b>hello</b>".to_string(),
        schedule_time: None,
        is_sent: false,
    };

    let post = Post::from(row);
    assert_eq!(post.id, 5);
    assert_eq!(post.project_id, 2);
    assert_eq!(post.name, "Launch");
    assert!(post.schedule_time.is_none());
    assert!(!post.is_sent);
}

#[test]
fn target_channel_row_keeps_session_out_of_debug_output() {
    let row = TargetChannelRow {
        id: 11,
        channel_id: "-100123".to_string(),
        name: "News".to_string(),
        session_string: "BQAA-very-secret".to_string(),
    };

    let rendered = format!("{row:?}");
    assert!(!rendered.contains("very-secret"));

    let channel = TargetChannel::from(row);
    assert_eq!(channel.id, 11);
    assert_eq!(channel.session.expose(), "BQAA-very-secret");
    assert!(!format!("{channel:?}").contains("very-secret"));
}

#[test]
fn publication_row_converts_to_watched_publication() {
    let row = PublicationRow {
        post_id: 3,
        post_name: "Digest".to_string(),
        message_id: 991,
    };
    let publication = WatchedPublication::from(row);
    assert_eq!(publication.post_id, 3);
    assert_eq!(publication.message_id, 991);
}
