mod queue;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use syncq_dispatch::{DispatchConfig, Dispatcher, HttpInvoker, PgSyncStore};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "syncq-cli")]
#[command(about = "Unified sync queue command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run one dispatcher pass over due queue rows
    Process,
    /// Queue a sync for a user's active integrations
    Enqueue {
        /// Owning user id
        #[arg(long)]
        user: Uuid,
        /// products, prices, stock, orders, customers, tracking or fulfillment
        #[arg(long)]
        sync_type: String,
        /// import, export or bidirectional (default)
        #[arg(long)]
        direction: Option<String>,
        /// Limit the sync to one integration
        #[arg(long)]
        integration: Option<Uuid>,
    },
    /// Show a user's recent queue rows and per-status counts
    Status {
        #[arg(long)]
        user: Uuid,
        /// Filter by status (pending, processing, completed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of rows to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Cancel a pending queue row
    Cancel {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        id: Uuid,
    },
    /// Re-queue a failed row for immediate pickup
    Retry {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        id: Uuid,
    },
    /// Delete terminal rows older than the retention window
    Purge {
        /// Retention in days (defaults to `SYNCQ_RETENTION_DAYS`)
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(0..=i64::from(syncq_core::MAX_RETENTION_DAYS))
        )]
        days: Option<u32>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("syncq-cli: no command given; see --help");
        return Ok(());
    };

    let config = syncq_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = syncq_db::PoolConfig::from_app_config(&config);
    let pool = syncq_db::connect_pool(&config.database_url, pool_config).await?;

    if let Commands::Db { command } = &command {
        match command {
            DbCommands::Ping => {
                syncq_db::health_check(&pool).await?;
                println!("database ok");
            }
            DbCommands::Migrate => {
                let applied = syncq_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        }
        return Ok(());
    }

    let store = Arc::new(PgSyncStore::new(pool));

    match command {
        Commands::Db { .. } => {}
        Commands::Process => {
            let invoker = Arc::new(HttpInvoker::from_app_config(&config)?);
            let dispatcher =
                Dispatcher::new(store, invoker, DispatchConfig::from_app_config(&config));
            queue::run_process(&dispatcher).await?;
        }
        Commands::Enqueue {
            user,
            sync_type,
            direction,
            integration,
        } => {
            queue::run_enqueue(store.as_ref(), user, sync_type, direction, integration).await?;
        }
        Commands::Status {
            user,
            status,
            limit,
        } => queue::run_status(store.as_ref(), user, status.as_deref(), limit).await?,
        Commands::Cancel { user, id } => queue::run_cancel(store.as_ref(), user, id).await?,
        Commands::Retry { user, id } => queue::run_retry(store.as_ref(), user, id).await?,
        Commands::Purge { days } => {
            queue::run_purge(store.as_ref(), days.unwrap_or(config.retention_days)).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
