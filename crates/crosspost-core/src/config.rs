use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing is decoupled from the process environment so it can be tested
/// with a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_num = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let narrow = |var: &str, value: u64| -> Result<u32, ConfigError> {
        u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("CROSSPOST_ENV", "development"))?;

    let bind_addr = parse("CROSSPOST_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("CROSSPOST_LOG_LEVEL", "info");

    let db_max_connections = narrow(
        "CROSSPOST_DB_MAX_CONNECTIONS",
        parse_num("CROSSPOST_DB_MAX_CONNECTIONS", "10")?,
    )?;
    let db_min_connections = narrow(
        "CROSSPOST_DB_MIN_CONNECTIONS",
        parse_num("CROSSPOST_DB_MIN_CONNECTIONS", "1")?,
    )?;
    let db_acquire_timeout_secs = parse_num("CROSSPOST_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scheduler_autostart = parse_bool(
        "CROSSPOST_SCHEDULER_AUTOSTART",
        &or_default("CROSSPOST_SCHEDULER_AUTOSTART", "true"),
    )?;
    let scheduler_workers = usize::try_from(parse_num("CROSSPOST_SCHEDULER_WORKERS", "50")?)
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "CROSSPOST_SCHEDULER_WORKERS".to_string(),
            reason: e.to_string(),
        })?;
    if scheduler_workers == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "CROSSPOST_SCHEDULER_WORKERS".to_string(),
            reason: "worker pool needs at least one worker".to_string(),
        });
    }
    let delivery_lead_secs = parse_num("CROSSPOST_DELIVERY_LEAD_SECS", "20")?;
    let send_pacing_ms = parse_num("CROSSPOST_SEND_PACING_MS", "100")?;
    let watch_cron = or_default("CROSSPOST_WATCH_CRON", "0 */5 * * * *");
    let watch_retention_days = narrow(
        "CROSSPOST_WATCH_RETENTION_DAYS",
        parse_num("CROSSPOST_WATCH_RETENTION_DAYS", "4096")?,
    )?;
    let notify_threshold = i64::try_from(parse_num("CROSSPOST_NOTIFY_THRESHOLD", "3")?)
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "CROSSPOST_NOTIFY_THRESHOLD".to_string(),
            reason: e.to_string(),
        })?;
    let collision_window_mins = narrow(
        "CROSSPOST_COLLISION_WINDOW_MINS",
        parse_num("CROSSPOST_COLLISION_WINDOW_MINS", "5")?,
    )?;

    let gateway_url = or_default("CROSSPOST_GATEWAY_URL", "http://127.0.0.1:8081/");
    let gateway_token = lookup("CROSSPOST_GATEWAY_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());
    let gateway_timeout_secs = parse_num("CROSSPOST_GATEWAY_TIMEOUT_SECS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scheduler_autostart,
        scheduler_workers,
        delivery_lead_secs,
        send_pacing_ms,
        watch_cron,
        watch_retention_days,
        notify_threshold,
        collision_window_mins,
        gateway_url,
        gateway_token,
        gateway_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CROSSPOST_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
