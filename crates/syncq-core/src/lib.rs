pub mod app_config;
pub mod backoff;
pub mod config;
pub mod queue;
pub mod retention;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use backoff::BackoffPolicy;
pub use config::{load_app_config, load_app_config_from_env};
pub use queue::{
    ChannelRef, NewSyncQueueItem, QueueStats, QueueStatus, StoreIntegration, SyncAction,
    SyncQueueItem, SyncType, DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY,
};
pub use retention::{
    lease_cutoff, retention_cutoff, MAX_CLAIM_LEASE_MINUTES, MAX_RETENTION_DAYS,
};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown sync type: {0}")]
    UnknownSyncType(String),
    #[error("unknown sync action: {0}")]
    UnknownSyncAction(String),
    #[error("unknown queue status: {0}")]
    UnknownQueueStatus(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
