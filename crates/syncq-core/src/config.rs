use crate::app_config::{AppConfig, Environment};
use crate::retention::{MAX_CLAIM_LEASE_MINUTES, MAX_RETENTION_DAYS};
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
/// Tests pass a `HashMap` lookup instead of mutating the process environment.
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

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SYNCQ_ENV", "development"))?;

    let bind_addr: SocketAddr =
        parse_as("SYNCQ_BIND_ADDR", &or_default("SYNCQ_BIND_ADDR", "0.0.0.0:3000"))?;
    let log_level = or_default("SYNCQ_LOG_LEVEL", "info");

    let db_max_connections = parse_as(
        "SYNCQ_DB_MAX_CONNECTIONS",
        &or_default("SYNCQ_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections = parse_as(
        "SYNCQ_DB_MIN_CONNECTIONS",
        &or_default("SYNCQ_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs = parse_as(
        "SYNCQ_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("SYNCQ_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let functions_url = or_default(
        "SYNCQ_FUNCTIONS_URL",
        "http://localhost:54321/functions/v1",
    );
    let functions_token = lookup("SYNCQ_FUNCTIONS_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());
    let handler_timeout_secs: u64 = parse_as(
        "SYNCQ_HANDLER_TIMEOUT_SECS",
        &or_default("SYNCQ_HANDLER_TIMEOUT_SECS", "30"),
    )?;
    if handler_timeout_secs == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "SYNCQ_HANDLER_TIMEOUT_SECS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let dispatch_batch_size: usize = parse_as(
        "SYNCQ_DISPATCH_BATCH_SIZE",
        &or_default("SYNCQ_DISPATCH_BATCH_SIZE", "50"),
    )?;
    if dispatch_batch_size == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "SYNCQ_DISPATCH_BATCH_SIZE".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let dispatch_max_concurrency: usize = parse_as(
        "SYNCQ_DISPATCH_MAX_CONCURRENCY",
        &or_default("SYNCQ_DISPATCH_MAX_CONCURRENCY", "1"),
    )?;
    if dispatch_max_concurrency == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "SYNCQ_DISPATCH_MAX_CONCURRENCY".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let dispatch_cron = or_default("SYNCQ_DISPATCH_CRON", "0 * * * * *");

    let retention_days: u32 = parse_as(
        "SYNCQ_RETENTION_DAYS",
        &or_default("SYNCQ_RETENTION_DAYS", "7"),
    )?;
    if retention_days > MAX_RETENTION_DAYS {
        return Err(ConfigError::InvalidEnvVar {
            var: "SYNCQ_RETENTION_DAYS".to_string(),
            reason: format!("must be at most {MAX_RETENTION_DAYS}"),
        });
    }
    let claim_lease_minutes: u32 = parse_as(
        "SYNCQ_CLAIM_LEASE_MINUTES",
        &or_default("SYNCQ_CLAIM_LEASE_MINUTES", "60"),
    )?;
    if !(1..=MAX_CLAIM_LEASE_MINUTES).contains(&claim_lease_minutes) {
        return Err(ConfigError::InvalidEnvVar {
            var: "SYNCQ_CLAIM_LEASE_MINUTES".to_string(),
            reason: format!("must be between 1 and {MAX_CLAIM_LEASE_MINUTES}"),
        });
    }
    let backoff_max_minutes = match lookup("SYNCQ_BACKOFF_MAX_MINUTES") {
        Ok(raw) if !raw.trim().is_empty() => Some(parse_as("SYNCQ_BACKOFF_MAX_MINUTES", &raw)?),
        _ => None,
    };

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        functions_url,
        functions_token,
        handler_timeout_secs,
        dispatch_batch_size,
        dispatch_max_concurrency,
        dispatch_cron,
        retention_days,
        claim_lease_minutes,
        backoff_max_minutes,
    })
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SYNCQ_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
