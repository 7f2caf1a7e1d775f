//! Repository seam over the queue table.
//!
//! [`PgSyncStore`] is the production backend. [`MemorySyncStore`] keeps the
//! same transition rules in process and backs route and dispatcher tests.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use syncq_core::{NewSyncQueueItem, QueueStats, QueueStatus, StoreIntegration, SyncQueueItem};
use syncq_db::DbError;
use uuid::Uuid;

pub use memory::MemorySyncStore;
pub use postgres::PgSyncStore;

/// Storage operations used by the producer, the dispatcher and the status API.
///
/// Transition methods (`mark_completed`, `reschedule`, `mark_failed`,
/// `release_claim`) only apply to `processing` rows and return
/// [`DbError::InvalidQueueTransition`] otherwise.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn ping(&self) -> Result<(), DbError>;

    async fn list_active_integrations(
        &self,
        user_id: Uuid,
        integration_id: Option<Uuid>,
    ) -> Result<Vec<StoreIntegration>, DbError>;

    /// Inserts all items or none of them.
    async fn enqueue(
        &self,
        items: &[NewSyncQueueItem],
        now: DateTime<Utc>,
    ) -> Result<Vec<SyncQueueItem>, DbError>;

    /// Due `pending` rows whose `sync_type` is not in `known_types`.
    async fn count_unroutable_due(
        &self,
        now: DateTime<Utc>,
        known_types: &[String],
    ) -> Result<i64, DbError>;

    /// Atomically moves up to `limit` due rows of a known type to
    /// `processing`, ordered `(priority, scheduled_at)`.
    ///
    /// A claimed row that cannot be decoded is marked `failed` with the decode
    /// error and left out of the result; the rest of the batch is returned.
    async fn claim_due_batch(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        known_types: &[String],
    ) -> Result<Vec<SyncQueueItem>, DbError>;

    async fn release_claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DbError>;

    /// Returns `processing` rows claimed before `claimed_before` to `pending`
    /// with their schedule and counters untouched. Returns the count.
    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError>;

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DbError>;

    async fn reschedule(
        &self,
        id: Uuid,
        retry_count: i32,
        scheduled_at: DateTime<Utc>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbError>;

    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Deletes terminal rows last updated before `cutoff`.
    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError>;

    async fn list_items(
        &self,
        user_id: Uuid,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<SyncQueueItem>, DbError>;

    async fn stats(&self, user_id: Uuid) -> Result<QueueStats, DbError>;

    /// `pending` → `cancelled`; [`DbError::NotFound`] if no such pending row.
    async fn cancel(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SyncQueueItem, DbError>;

    /// `failed` → `pending` with a fresh retry budget, due at `now`.
    async fn retry_now(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SyncQueueItem, DbError>;
}
