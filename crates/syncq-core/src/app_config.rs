use std::net::SocketAddr;

use crate::BackoffPolicy;

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
    pub functions_url: String,
    pub functions_token: Option<String>,
    pub handler_timeout_secs: u64,
    pub dispatch_batch_size: usize,
    pub dispatch_max_concurrency: usize,
    pub dispatch_cron: String,
    pub retention_days: u32,
    pub claim_lease_minutes: u32,
    pub backoff_max_minutes: Option<u32>,
}

impl AppConfig {
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_delay_minutes: self.backoff_max_minutes,
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
            .field("functions_url", &self.functions_url)
            .field(
                "functions_token",
                &self.functions_token.as_ref().map(|_| "[redacted]"),
            )
            .field("handler_timeout_secs", &self.handler_timeout_secs)
            .field("dispatch_batch_size", &self.dispatch_batch_size)
            .field("dispatch_max_concurrency", &self.dispatch_max_concurrency)
            .field("dispatch_cron", &self.dispatch_cron)
            .field("retention_days", &self.retention_days)
            .field("claim_lease_minutes", &self.claim_lease_minutes)
            .field("backoff_max_minutes", &self.backoff_max_minutes)
            .finish()
    }
}
