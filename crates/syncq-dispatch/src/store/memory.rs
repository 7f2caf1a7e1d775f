use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use syncq_core::{NewSyncQueueItem, QueueStats, QueueStatus, StoreIntegration, SyncQueueItem};
use syncq_db::DbError;
use uuid::Uuid;

use super::SyncStore;

#[derive(Debug, Default)]
struct State {
    integrations: Vec<StoreIntegration>,
    items: Vec<SyncQueueItem>,
}

/// In-process [`SyncStore`] with the same transition rules as Postgres.
///
/// A single mutex guards all state, so every operation is atomic with
/// respect to every other.
#[derive(Debug, Default)]
pub struct MemorySyncStore {
    state: Mutex<State>,
}

impl MemorySyncStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_integration(&self, integration: StoreIntegration) {
        self.lock().integrations.push(integration);
    }

    /// Inserts a fully-formed row as is, in whatever state it carries.
    pub fn insert_item(&self, item: SyncQueueItem) {
        self.lock().items.push(item);
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<SyncQueueItem> {
        self.lock().items.iter().find(|item| item.id == id).cloned()
    }

    /// All rows in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<SyncQueueItem> {
        self.lock().items.clone()
    }

    fn transition(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut SyncQueueItem),
    ) -> Result<(), DbError> {
        let mut state = self.lock();
        let item = state
            .items
            .iter_mut()
            .find(|item| item.id == id && item.status == QueueStatus::Processing)
            .ok_or(DbError::InvalidQueueTransition {
                id,
                expected_status: "processing",
            })?;
        apply(item);
        Ok(())
    }

    fn owned_transition(
        &self,
        id: Uuid,
        user_id: Uuid,
        from: QueueStatus,
        apply: impl FnOnce(&mut SyncQueueItem),
    ) -> Result<SyncQueueItem, DbError> {
        let mut state = self.lock();
        let item = state
            .items
            .iter_mut()
            .find(|item| item.id == id && item.user_id == user_id && item.status == from)
            .ok_or(DbError::NotFound)?;
        apply(item);
        Ok(item.clone())
    }
}

fn is_routable(item: &SyncQueueItem, known_types: &[String]) -> bool {
    known_types.iter().any(|known| *known == item.sync_type)
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn list_active_integrations(
        &self,
        user_id: Uuid,
        integration_id: Option<Uuid>,
    ) -> Result<Vec<StoreIntegration>, DbError> {
        Ok(self
            .lock()
            .integrations
            .iter()
            .filter(|i| i.user_id == user_id && i.is_active)
            .filter(|i| integration_id.is_none_or(|id| i.id == id))
            .cloned()
            .collect())
    }

    async fn enqueue(
        &self,
        items: &[NewSyncQueueItem],
        now: DateTime<Utc>,
    ) -> Result<Vec<SyncQueueItem>, DbError> {
        let created: Vec<SyncQueueItem> = items
            .iter()
            .map(|new| SyncQueueItem {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                sync_type: new.sync_type.as_str().to_owned(),
                entity_type: new.entity_type.clone(),
                entity_id: new.entity_id,
                action: new.action,
                status: QueueStatus::Pending,
                priority: new.priority,
                scheduled_at: new.scheduled_at,
                retry_count: 0,
                max_retries: new.max_retries,
                channels: new.channels.clone(),
                payload: new.payload.clone(),
                error_message: None,
                started_at: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        self.lock().items.extend(created.iter().cloned());
        Ok(created)
    }

    async fn count_unroutable_due(
        &self,
        now: DateTime<Utc>,
        known_types: &[String],
    ) -> Result<i64, DbError> {
        let count = self
            .lock()
            .items
            .iter()
            .filter(|item| item.is_due(now) && !is_routable(item, known_types))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn claim_due_batch(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        known_types: &[String],
    ) -> Result<Vec<SyncQueueItem>, DbError> {
        let mut state = self.lock();
        let mut due: Vec<&mut SyncQueueItem> = state
            .items
            .iter_mut()
            .filter(|item| item.is_due(now) && is_routable(item, known_types))
            .collect();
        due.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.scheduled_at.cmp(&b.scheduled_at))
                .then(a.created_at.cmp(&b.created_at))
        });

        Ok(due
            .into_iter()
            .take(limit)
            .map(|item| {
                item.status = QueueStatus::Processing;
                item.started_at = Some(now);
                item.updated_at = now;
                item.clone()
            })
            .collect())
    }

    async fn release_claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        self.transition(id, |item| {
            item.status = QueueStatus::Pending;
            item.started_at = None;
            item.updated_at = now;
        })
    }

    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let mut released = 0;
        for item in self.lock().items.iter_mut().filter(|item| {
            item.status == QueueStatus::Processing
                && item.started_at.is_none_or(|at| at < claimed_before)
        }) {
            item.status = QueueStatus::Pending;
            item.started_at = None;
            item.updated_at = now;
            released += 1;
        }
        Ok(released)
    }

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        self.transition(id, |item| {
            item.status = QueueStatus::Completed;
            item.completed_at = Some(now);
            item.error_message = None;
            item.updated_at = now;
        })
    }

    async fn reschedule(
        &self,
        id: Uuid,
        retry_count: i32,
        scheduled_at: DateTime<Utc>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.transition(id, |item| {
            item.status = QueueStatus::Pending;
            item.retry_count = retry_count;
            item.scheduled_at = scheduled_at;
            item.error_message = Some(error_message.to_owned());
            item.updated_at = now;
        })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.transition(id, |item| {
            item.status = QueueStatus::Failed;
            item.error_message = Some(error_message.to_owned());
            item.updated_at = now;
        })
    }

    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let mut state = self.lock();
        let before = state.items.len();
        state
            .items
            .retain(|item| !(item.status.is_terminal() && item.updated_at < cutoff));
        Ok(u64::try_from(before - state.items.len()).unwrap_or(u64::MAX))
    }

    async fn list_items(
        &self,
        user_id: Uuid,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<SyncQueueItem>, DbError> {
        let mut items: Vec<SyncQueueItem> = self
            .lock()
            .items
            .iter()
            .filter(|item| item.user_id == user_id)
            .filter(|item| status.is_none_or(|s| item.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        items.truncate(limit);
        Ok(items)
    }

    async fn stats(&self, user_id: Uuid) -> Result<QueueStats, DbError> {
        let mut stats = QueueStats::default();
        for item in self.lock().items.iter().filter(|item| item.user_id == user_id) {
            stats.add(item.status, 1);
        }
        Ok(stats)
    }

    async fn cancel(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SyncQueueItem, DbError> {
        self.owned_transition(id, user_id, QueueStatus::Pending, |item| {
            item.status = QueueStatus::Cancelled;
            item.updated_at = now;
        })
    }

    async fn retry_now(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SyncQueueItem, DbError> {
        self.owned_transition(id, user_id, QueueStatus::Failed, |item| {
            item.status = QueueStatus::Pending;
            item.retry_count = 0;
            item.scheduled_at = now;
            item.started_at = None;
            item.completed_at = None;
            item.updated_at = now;
        })
    }
}
