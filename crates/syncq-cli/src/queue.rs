//! Queue command handlers for the CLI.
//!
//! Called from `main` once the pool and config are established. Each handler
//! prints a short human-readable summary.

use chrono::Utc;
use syncq_core::{retention_cutoff, QueueStatus, SyncQueueItem};
use syncq_dispatch::{enqueue_sync, Dispatcher, EnqueueRequest, SyncStore};
use uuid::Uuid;

fn print_item(item: &SyncQueueItem) {
    println!(
        "{}  {:<11} {:<10} {:<13} p{} retry {}/{}  scheduled {}{}",
        item.id,
        item.sync_type,
        item.status.as_str(),
        item.action.as_str(),
        item.priority,
        item.retry_count,
        item.max_retries,
        item.scheduled_at.format("%Y-%m-%d %H:%M:%S"),
        item.error_message
            .as_deref()
            .map(|e| format!("  error: {e}"))
            .unwrap_or_default(),
    );
}

/// Run one dispatcher pass and print each outcome.
///
/// # Errors
///
/// Returns an error if the batch cannot be claimed.
pub(crate) async fn run_process(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let report = dispatcher.process_queue().await?;

    for result in &report.results {
        match (&result.error, result.will_retry) {
            (None, _) => println!("ok      {} {}", result.id, result.sync_type),
            (Some(e), Some(true)) => println!("retry   {} {}: {e}", result.id, result.sync_type),
            (Some(e), _) => println!("failed  {} {}: {e}", result.id, result.sync_type),
        }
    }
    println!(
        "processed {} (succeeded {}, failed {}); skipped {} unroutable; purged {}",
        report.processed, report.succeeded, report.failed, report.unroutable, report.purged
    );
    Ok(())
}

/// # Errors
///
/// Returns an error for an unknown sync type or direction, or if the store
/// cannot be read or written.
pub(crate) async fn run_enqueue(
    store: &dyn SyncStore,
    user: Uuid,
    sync_type: String,
    direction: Option<String>,
    integration: Option<Uuid>,
) -> anyhow::Result<()> {
    let request = EnqueueRequest {
        sync_type,
        direction,
        integration_id: integration,
    };
    let summary = enqueue_sync(store, user, &request, Utc::now()).await?;

    println!("{}", summary.message);
    for (store_name, id) in summary.stores.iter().zip(&summary.ids) {
        println!("  {id}  {store_name}");
    }
    Ok(())
}

/// # Errors
///
/// Returns an error for an unknown status filter or if the store query fails.
pub(crate) async fn run_status(
    store: &dyn SyncStore,
    user: Uuid,
    status: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let status = status.map(str::parse::<QueueStatus>).transpose()?;
    let items = store.list_items(user, status, limit).await?;
    let stats = store.stats(user).await?;

    println!(
        "pending {}  processing {}  completed {}  failed {}  cancelled {}",
        stats.pending, stats.processing, stats.completed, stats.failed, stats.cancelled
    );
    if items.is_empty() {
        println!("no queue rows");
    }
    for item in &items {
        print_item(item);
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if no pending row with `id` belongs to `user`.
pub(crate) async fn run_cancel(store: &dyn SyncStore, user: Uuid, id: Uuid) -> anyhow::Result<()> {
    let item = store.cancel(id, user, Utc::now()).await?;
    print_item(&item);
    Ok(())
}

/// # Errors
///
/// Returns an error if no failed row with `id` belongs to `user`.
pub(crate) async fn run_retry(store: &dyn SyncStore, user: Uuid, id: Uuid) -> anyhow::Result<()> {
    let item = store.retry_now(id, user, Utc::now()).await?;
    print_item(&item);
    Ok(())
}

/// # Errors
///
/// Returns an error if `days` reaches past the representable time range or
/// if the delete fails.
pub(crate) async fn run_purge(store: &dyn SyncStore, days: u32) -> anyhow::Result<()> {
    let cutoff = retention_cutoff(Utc::now(), days)
        .ok_or_else(|| anyhow::anyhow!("retention window of {days} day(s) is out of range"))?;
    let purged = store.purge_terminal(cutoff).await?;
    tracing::info!(purged, %cutoff, "manual retention purge");
    println!("purged {purged} terminal row(s) older than {days} day(s)");
    Ok(())
}
