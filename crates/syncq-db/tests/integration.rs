//! Offline unit tests for syncq-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use syncq_core::{AppConfig, Environment, StoreIntegration};
use syncq_db::{IntegrationRow, PoolConfig};

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        functions_url: "http://localhost:54321/functions/v1".to_string(),
        functions_token: None,
        handler_timeout_secs: 30,
        dispatch_batch_size: 50,
        dispatch_max_concurrency: 1,
        dispatch_cron: "0 * * * * *".to_string(),
        retention_days: 7,
        claim_lease_minutes: 60,
        backoff_max_minutes: None,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn integration_row_converts_to_store_integration() {
    use chrono::Utc;
    use uuid::Uuid;

    let id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let row = IntegrationRow {
        id,
        user_id,
        platform: "shopify".to_string(),
        store_name: "Main Street Goods".to_string(),
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let integration = StoreIntegration::from(row);
    assert_eq!(integration.id, id);
    assert_eq!(integration.user_id, user_id);
    assert_eq!(integration.platform, "shopify");
    assert_eq!(integration.store_name, "Main Street Goods");
    assert!(integration.is_active);
}
