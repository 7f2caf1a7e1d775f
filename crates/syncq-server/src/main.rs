mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use syncq_dispatch::{DispatchConfig, Dispatcher, HttpInvoker, PgSyncStore, SyncStore};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(syncq_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(config = ?config, "starting syncq-server");

    let pool_config = syncq_db::PoolConfig::from_app_config(&config);
    let pool = syncq_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = syncq_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let store: Arc<dyn SyncStore> = Arc::new(PgSyncStore::new(pool));
    let invoker = Arc::new(HttpInvoker::from_app_config(&config)?);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        invoker,
        DispatchConfig::from_app_config(&config),
    ));

    let _scheduler =
        scheduler::build_scheduler(Arc::clone(&dispatcher), &config.dispatch_cron).await?;

    let auth = AuthState::from_env(matches!(config.env, syncq_core::Environment::Development))?;
    let app = build_app(
        AppState { store, dispatcher },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
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
