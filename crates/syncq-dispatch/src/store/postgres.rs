use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use syncq_core::{NewSyncQueueItem, QueueStats, QueueStatus, StoreIntegration, SyncQueueItem};
use syncq_db::{DbError, SyncQueueRow};
use uuid::Uuid;

use super::SyncStore;

/// [`SyncStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgSyncStore {
    pool: PgPool,
}

impl PgSyncStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_items(rows: Vec<SyncQueueRow>) -> Result<Vec<SyncQueueItem>, DbError> {
    rows.into_iter().map(SyncQueueItem::try_from).collect()
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl SyncStore for PgSyncStore {
    async fn ping(&self) -> Result<(), DbError> {
        syncq_db::health_check(&self.pool).await
    }

    async fn list_active_integrations(
        &self,
        user_id: Uuid,
        integration_id: Option<Uuid>,
    ) -> Result<Vec<StoreIntegration>, DbError> {
        let rows = syncq_db::list_active_integrations(&self.pool, user_id, integration_id).await?;
        Ok(rows.into_iter().map(StoreIntegration::from).collect())
    }

    async fn enqueue(
        &self,
        items: &[NewSyncQueueItem],
        now: DateTime<Utc>,
    ) -> Result<Vec<SyncQueueItem>, DbError> {
        to_items(syncq_db::insert_queue_items(&self.pool, items, now).await?)
    }

    async fn count_unroutable_due(
        &self,
        now: DateTime<Utc>,
        known_types: &[String],
    ) -> Result<i64, DbError> {
        syncq_db::count_unroutable_due(&self.pool, now, known_types).await
    }

    async fn claim_due_batch(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        known_types: &[String],
    ) -> Result<Vec<SyncQueueItem>, DbError> {
        let rows =
            syncq_db::claim_due_batch(&self.pool, now, sql_limit(limit), known_types).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match SyncQueueItem::try_from(row) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::error!(%id, error = %e, "claimed row is malformed; marking failed");
                    let message = e.to_string();
                    if let Err(e) =
                        syncq_db::mark_queue_item_failed(&self.pool, id, &message, now).await
                    {
                        tracing::error!(%id, error = %e, "failed to retire malformed row");
                    }
                }
            }
        }
        Ok(items)
    }

    async fn release_claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        syncq_db::release_queue_claim(&self.pool, id, now).await
    }

    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        syncq_db::release_stale_claims(&self.pool, claimed_before, now).await
    }

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        syncq_db::mark_queue_item_completed(&self.pool, id, now).await
    }

    async fn reschedule(
        &self,
        id: Uuid,
        retry_count: i32,
        scheduled_at: DateTime<Utc>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        syncq_db::reschedule_queue_item(&self.pool, id, retry_count, scheduled_at, error_message, now)
            .await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        syncq_db::mark_queue_item_failed(&self.pool, id, error_message, now).await
    }

    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        syncq_db::purge_terminal_queue_items(&self.pool, cutoff).await
    }

    async fn list_items(
        &self,
        user_id: Uuid,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<SyncQueueItem>, DbError> {
        let rows =
            syncq_db::list_queue_items(&self.pool, user_id, status, sql_limit(limit)).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                SyncQueueItem::try_from(row)
                    .inspect_err(|e| tracing::warn!(%id, error = %e, "skipping malformed row"))
                    .ok()
            })
            .collect())
    }

    async fn stats(&self, user_id: Uuid) -> Result<QueueStats, DbError> {
        let mut stats = QueueStats::default();
        for (status, count) in syncq_db::queue_stats(&self.pool, user_id).await? {
            // The table's CHECK constraint keeps status within the known set.
            if let Ok(status) = status.parse::<QueueStatus>() {
                stats.add(status, count);
            }
        }
        Ok(stats)
    }

    async fn cancel(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SyncQueueItem, DbError> {
        SyncQueueItem::try_from(syncq_db::cancel_queue_item(&self.pool, id, user_id, now).await?)
    }

    async fn retry_now(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SyncQueueItem, DbError> {
        SyncQueueItem::try_from(
            syncq_db::retry_queue_item_now(&self.pool, id, user_id, now).await?,
        )
    }
}
