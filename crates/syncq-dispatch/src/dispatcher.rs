//! Claims due queue rows, runs their handlers and records the outcome.
//!
//! One run:
//! 1. returns claims older than the lease to `pending`,
//! 2. logs due rows whose `sync_type` no handler serves (left untouched),
//! 3. claims a bounded batch in `(priority, scheduled_at)` order,
//! 4. runs each `sync_type` group in first-appearance order, at most
//!    `max_concurrency` items of a group in flight at once,
//! 5. purges terminal rows older than the retention window.
//!
//! A failing item never aborts the batch. Only a failed claim does.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use syncq_core::{
    lease_cutoff, retention_cutoff, AppConfig, BackoffPolicy, SyncQueueItem, SyncType,
};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::invoker::{ChannelInvoker, InvokeRequest};
use crate::store::SyncStore;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub retention_days: u32,
    /// A `processing` claim older than this is treated as abandoned.
    pub claim_lease_minutes: u32,
    pub backoff: BackoffPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrency: 1,
            retention_days: 7,
            claim_lease_minutes: 60,
            backoff: BackoffPolicy::uncapped(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.dispatch_batch_size,
            max_concurrency: config.dispatch_max_concurrency,
            retention_days: config.retention_days,
            claim_lease_minutes: config.claim_lease_minutes,
            backoff: config.backoff_policy(),
        }
    }
}

/// Result of one claimed row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub id: Uuid,
    pub sync_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_retry: Option<bool>,
}

impl ItemOutcome {
    fn succeeded(item: &SyncQueueItem, data: serde_json::Value) -> Self {
        Self {
            id: item.id,
            sync_type: item.sync_type.clone(),
            success: true,
            data: Some(data),
            error: None,
            will_retry: None,
        }
    }

    fn failed(item: &SyncQueueItem, error: String, will_retry: bool) -> Self {
        Self {
            id: item.id,
            sync_type: item.sync_type.clone(),
            success: false,
            data: None,
            error: Some(error),
            will_retry: Some(will_retry),
        }
    }
}

/// Aggregate of one dispatcher run.
///
/// `failed` counts every unsuccessful attempt, including those rescheduled
/// for retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ItemOutcome>,
    /// Due rows left pending because no handler serves their `sync_type`.
    #[serde(skip)]
    pub unroutable: i64,
    /// Abandoned claims returned to `pending` before this run's claim.
    #[serde(skip)]
    pub reclaimed: u64,
    /// Terminal rows removed by the retention sweep.
    #[serde(skip)]
    pub purged: u64,
}

impl DispatchReport {
    fn record(&mut self, outcome: ItemOutcome) {
        self.processed += 1;
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(outcome);
    }
}

pub struct Dispatcher {
    store: Arc<dyn SyncStore>,
    invoker: Arc<dyn ChannelInvoker>,
    config: DispatchConfig,
    clock: Clock,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn SyncStore>,
        invoker: Arc<dyn ChannelInvoker>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            config,
            clock: Arc::new(Utc::now),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Runs one claim-execute-retire pass over the queue.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] only if the batch cannot be claimed.
    /// Per-item failures, including store errors while recording an
    /// outcome, are logged and reflected in the report.
    pub async fn process_queue(&self) -> Result<DispatchReport, DispatchError> {
        let now = self.now();
        let known = SyncType::known_names();
        let mut report = DispatchReport {
            reclaimed: self.release_stale_claims(now).await,
            ..DispatchReport::default()
        };

        match self.store.count_unroutable_due(now, &known).await {
            Ok(0) => {}
            Ok(count) => {
                report.unroutable = count;
                tracing::warn!(count, "skipping due rows with unknown sync_type");
            }
            Err(e) => tracing::warn!(error = %e, "failed to count rows with unknown sync_type"),
        }

        let claimed = self
            .store
            .claim_due_batch(now, self.config.batch_size, &known)
            .await?;
        tracing::info!(claimed = claimed.len(), "claimed sync queue batch");

        let (groups, unroutable) = group_by_type(claimed);
        for item in unroutable {
            tracing::warn!(id = %item.id, sync_type = %item.sync_type, "releasing unroutable claimed row");
            if let Err(e) = self.store.release_claim(item.id, self.now()).await {
                tracing::error!(id = %item.id, error = %e, "failed to release claimed row");
            }
        }

        let width = self.config.max_concurrency.max(1);
        for (sync_type, items) in groups {
            let handler = sync_type.handler_name();
            tracing::info!(%sync_type, handler, count = items.len(), "processing sync group");

            let outcomes: Vec<ItemOutcome> = stream::iter(items)
                .map(|item| self.process_item(handler, item))
                .buffered(width)
                .collect()
                .await;
            for outcome in outcomes {
                report.record(outcome);
            }
        }

        report.purged = self.purge_expired().await;

        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            reclaimed = report.reclaimed,
            purged = report.purged,
            "sync queue run complete"
        );
        Ok(report)
    }

    async fn process_item(&self, handler: &'static str, item: SyncQueueItem) -> ItemOutcome {
        let request = InvokeRequest::from_item(&item);
        match self.invoker.invoke(handler, &request).await {
            Ok(data) => {
                if let Err(e) = self.store.mark_completed(item.id, self.now()).await {
                    tracing::error!(id = %item.id, error = %e, "failed to mark row completed");
                }
                tracing::debug!(id = %item.id, handler, "sync item completed");
                ItemOutcome::succeeded(&item, data)
            }
            Err(e) => self.record_failure(&item, e.to_string()).await,
        }
    }

    /// Reschedules with backoff while budget remains, otherwise retires the
    /// row as `failed` with `retry_count` left at `max_retries`.
    async fn record_failure(&self, item: &SyncQueueItem, message: String) -> ItemOutcome {
        let now = self.now();

        if item.has_retry_budget() {
            let retry_count = item.retry_count + 1;
            let next_attempt = self.config.backoff.next_attempt_at(now, retry_count);
            if let Err(e) = self
                .store
                .reschedule(item.id, retry_count, next_attempt, &message, now)
                .await
            {
                tracing::error!(id = %item.id, error = %e, "failed to reschedule row");
            }
            tracing::warn!(
                id = %item.id,
                sync_type = %item.sync_type,
                retry_count,
                max_retries = item.max_retries,
                next_attempt = %next_attempt,
                error = %message,
                "sync item failed; retry scheduled"
            );
            ItemOutcome::failed(item, message, true)
        } else {
            if let Err(e) = self.store.mark_failed(item.id, &message, now).await {
                tracing::error!(id = %item.id, error = %e, "failed to mark row failed");
            }
            tracing::error!(
                id = %item.id,
                sync_type = %item.sync_type,
                retry_count = item.retry_count,
                error = %message,
                "sync item failed permanently"
            );
            ItemOutcome::failed(item, message, false)
        }
    }

    async fn release_stale_claims(&self, now: DateTime<Utc>) -> u64 {
        let Some(claimed_before) = lease_cutoff(now, self.config.claim_lease_minutes) else {
            tracing::warn!(
                lease_minutes = self.config.claim_lease_minutes,
                "claim lease out of range; skipping stale claim release"
            );
            return 0;
        };
        match self.store.release_stale_claims(claimed_before, now).await {
            Ok(0) => 0,
            Ok(released) => {
                tracing::warn!(released, %claimed_before, "returned stale claims to pending");
                released
            }
            Err(e) => {
                tracing::warn!(error = %e, "stale claim release failed");
                0
            }
        }
    }

    async fn purge_expired(&self) -> u64 {
        let Some(cutoff) = retention_cutoff(self.now(), self.config.retention_days) else {
            tracing::warn!(
                retention_days = self.config.retention_days,
                "retention window out of range; skipping purge"
            );
            return 0;
        };
        match self.store.purge_terminal(cutoff).await {
            Ok(purged) => {
                if purged > 0 {
                    tracing::info!(purged, %cutoff, "purged expired terminal rows");
                }
                purged
            }
            Err(e) => {
                tracing::warn!(error = %e, "retention purge failed");
                0
            }
        }
    }
}

/// Splits a claimed batch by routable type, keeping batch order inside each
/// group and ordering groups by first appearance.
fn group_by_type(
    items: Vec<SyncQueueItem>,
) -> (Vec<(SyncType, Vec<SyncQueueItem>)>, Vec<SyncQueueItem>) {
    let mut groups: Vec<(SyncType, Vec<SyncQueueItem>)> = Vec::new();
    let mut unroutable = Vec::new();

    for item in items {
        let Some(kind) = item.kind() else {
            unroutable.push(item);
            continue;
        };
        match groups.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, group)) => group.push(item),
            None => groups.push((kind, vec![item])),
        }
    }

    (groups, unroutable)
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
