//! Database operations for `unified_sync_queue`.
//!
//! Every state transition is a conditional `UPDATE` on the current status, so
//! two dispatchers racing for the same row cannot both move it forward. Rows
//! are claimed with `FOR UPDATE SKIP LOCKED` inside a single statement.

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use syncq_core::{ChannelRef, CoreError, NewSyncQueueItem, QueueStatus, SyncAction, SyncQueueItem};
use uuid::Uuid;

use crate::DbError;

macro_rules! queue_columns {
    () => {
        "id, user_id, sync_type, entity_type, entity_id, action, status, priority, \
         scheduled_at, retry_count, max_retries, channels, payload, error_message, \
         started_at, completed_at, created_at, updated_at"
    };
}

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `unified_sync_queue` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncQueueRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sync_type: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub action: String,
    pub status: String,
    pub priority: i32,
    pub scheduled_at: DateTime<Utc>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub channels: serde_json::Value,
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SyncQueueRow> for SyncQueueItem {
    type Error = DbError;

    fn try_from(row: SyncQueueRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let action: SyncAction = row.action.parse().map_err(|e: CoreError| {
            DbError::InvalidRow {
                id,
                field: "action",
                reason: e.to_string(),
            }
        })?;
        let status: QueueStatus = row.status.parse().map_err(|e: CoreError| {
            DbError::InvalidRow {
                id,
                field: "status",
                reason: e.to_string(),
            }
        })?;
        let channels: Vec<ChannelRef> =
            serde_json::from_value(row.channels).map_err(|e| DbError::InvalidRow {
                id,
                field: "channels",
                reason: e.to_string(),
            })?;

        Ok(SyncQueueItem {
            id,
            user_id: row.user_id,
            sync_type: row.sync_type,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            action,
            status,
            priority: row.priority,
            scheduled_at: row.scheduled_at,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            channels,
            payload: row.payload,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Inserts one `pending` row per item inside a single transaction.
///
/// IDs are generated here. No de-duplication is attempted: inserting the
/// same logical request twice yields two independent rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; the transaction is rolled
/// back and no rows are created.
pub async fn insert_queue_items(
    pool: &PgPool,
    items: &[NewSyncQueueItem],
    now: DateTime<Utc>,
) -> Result<Vec<SyncQueueRow>, DbError> {
    let mut tx = pool.begin().await?;
    let mut rows = Vec::with_capacity(items.len());

    for item in items {
        let row = sqlx::query_as::<_, SyncQueueRow>(concat!(
            "INSERT INTO unified_sync_queue \
                 (id, user_id, sync_type, entity_type, entity_id, action, status, priority, \
                  scheduled_at, retry_count, max_retries, channels, payload, \
                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, 0, $9, $10, $11, $12, $12) \
             RETURNING ",
            queue_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(item.user_id)
        .bind(item.sync_type.as_str())
        .bind(&item.entity_type)
        .bind(item.entity_id)
        .bind(item.action.as_str())
        .bind(item.priority)
        .bind(item.scheduled_at)
        .bind(item.max_retries)
        .bind(Json(&item.channels))
        .bind(&item.payload)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        rows.push(row);
    }

    tx.commit().await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Dispatcher side
// ---------------------------------------------------------------------------

/// Counts due `pending` rows whose `sync_type` is not in `known_types`.
///
/// These rows are never claimed; the count only feeds a log line.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_unroutable_due(
    pool: &PgPool,
    now: DateTime<Utc>,
    known_types: &[String],
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM unified_sync_queue \
         WHERE status = 'pending' \
           AND scheduled_at <= $1 \
           AND NOT (sync_type = ANY($2))",
    )
    .bind(now)
    .bind(known_types)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Atomically claims up to `limit` due `pending` rows of a known sync type.
///
/// Selection and the move to `processing` happen in one statement, with
/// `SKIP LOCKED` so concurrent dispatchers partition the due rows instead of
/// double-claiming them. `started_at` is stamped with `now`. The returned
/// rows are ordered `(priority ASC, scheduled_at ASC)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_due_batch(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
    known_types: &[String],
) -> Result<Vec<SyncQueueRow>, DbError> {
    let mut rows = sqlx::query_as::<_, SyncQueueRow>(concat!(
        "UPDATE unified_sync_queue \
         SET status = 'processing', started_at = $1, updated_at = $1 \
         WHERE id IN ( \
             SELECT id FROM unified_sync_queue \
             WHERE status = 'pending' \
               AND scheduled_at <= $1 \
               AND sync_type = ANY($2) \
             ORDER BY priority ASC, scheduled_at ASC, created_at ASC \
             LIMIT $3 \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING ",
        queue_columns!()
    ))
    .bind(now)
    .bind(known_types)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    // RETURNING does not preserve the sub-select order.
    rows.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.scheduled_at.cmp(&b.scheduled_at))
            .then(a.created_at.cmp(&b.created_at))
    });
    Ok(rows)
}

/// Returns a claimed row to `pending` without touching its schedule or counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidQueueTransition`] if the row is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn release_queue_claim(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE unified_sync_queue \
         SET status = 'pending', started_at = NULL, updated_at = $2 \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;

    expect_transition(result.rows_affected(), id, "processing")
}

/// Returns `processing` rows claimed before `claimed_before` to `pending`.
///
/// Covers dispatchers that died mid-batch and claims whose outcome was never
/// recorded. Schedule and retry counters are left as they were. Returns the
/// number of rows released.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn release_stale_claims(
    pool: &PgPool,
    claimed_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE unified_sync_queue \
         SET status = 'pending', started_at = NULL, updated_at = $2 \
         WHERE status = 'processing' \
           AND (started_at IS NULL OR started_at < $1)",
    )
    .bind(claimed_before)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Marks a claimed row `completed` and stamps `completed_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidQueueTransition`] if the row is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn mark_queue_item_completed(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE unified_sync_queue \
         SET status = 'completed', completed_at = $2, updated_at = $2, error_message = NULL \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;

    expect_transition(result.rows_affected(), id, "processing")
}

/// Puts a failed, claimed row back to `pending` for a later attempt.
///
/// # Errors
///
/// Returns [`DbError::InvalidQueueTransition`] if the row is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn reschedule_queue_item(
    pool: &PgPool,
    id: Uuid,
    retry_count: i32,
    scheduled_at: DateTime<Utc>,
    error_message: &str,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE unified_sync_queue \
         SET status = 'pending', retry_count = $2, scheduled_at = $3, \
             error_message = $4, updated_at = $5 \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(retry_count)
    .bind(scheduled_at)
    .bind(error_message)
    .bind(now)
    .execute(pool)
    .await?;

    expect_transition(result.rows_affected(), id, "processing")
}

/// Marks a claimed row permanently `failed`. `scheduled_at` is left as is.
///
/// # Errors
///
/// Returns [`DbError::InvalidQueueTransition`] if the row is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn mark_queue_item_failed(
    pool: &PgPool,
    id: Uuid,
    error_message: &str,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE unified_sync_queue \
         SET status = 'failed', error_message = $2, updated_at = $3 \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(error_message)
    .bind(now)
    .execute(pool)
    .await?;

    expect_transition(result.rows_affected(), id, "processing")
}

/// Deletes terminal rows last updated before `cutoff`. Returns the row count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_terminal_queue_items(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM unified_sync_queue \
         WHERE status IN ('completed', 'failed', 'cancelled') \
           AND updated_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Status / operator actions
// ---------------------------------------------------------------------------

/// Fetches a single row by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_queue_item(pool: &PgPool, id: Uuid) -> Result<SyncQueueRow, DbError> {
    sqlx::query_as::<_, SyncQueueRow>(concat!(
        "SELECT ",
        queue_columns!(),
        " FROM unified_sync_queue WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns a user's most recent rows, newest first, optionally by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_queue_items(
    pool: &PgPool,
    user_id: Uuid,
    status: Option<QueueStatus>,
    limit: i64,
) -> Result<Vec<SyncQueueRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncQueueRow>(concat!(
        "SELECT ",
        queue_columns!(),
        " FROM unified_sync_queue \
         WHERE user_id = $1 \
           AND ($2::text IS NULL OR status = $2) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3"
    ))
    .bind(user_id)
    .bind(status.map(QueueStatus::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns `(status, count)` pairs over all of a user's rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn queue_stats(pool: &PgPool, user_id: Uuid) -> Result<Vec<(String, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM unified_sync_queue \
         WHERE user_id = $1 \
         GROUP BY status",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Cancels a `pending` row owned by `user_id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no pending row with that id belongs to
/// the user, or [`DbError::Sqlx`] if the update fails.
pub async fn cancel_queue_item(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<SyncQueueRow, DbError> {
    sqlx::query_as::<_, SyncQueueRow>(concat!(
        "UPDATE unified_sync_queue \
         SET status = 'cancelled', updated_at = $3 \
         WHERE id = $1 AND user_id = $2 AND status = 'pending' \
         RETURNING ",
        queue_columns!()
    ))
    .bind(id)
    .bind(user_id)
    .bind(now)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Re-queues a `failed` row owned by `user_id` for immediate pickup with a
/// fresh retry budget.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no failed row with that id belongs to
/// the user, or [`DbError::Sqlx`] if the update fails.
pub async fn retry_queue_item_now(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<SyncQueueRow, DbError> {
    sqlx::query_as::<_, SyncQueueRow>(concat!(
        "UPDATE unified_sync_queue \
         SET status = 'pending', retry_count = 0, scheduled_at = $3, \
             started_at = NULL, completed_at = NULL, updated_at = $3 \
         WHERE id = $1 AND user_id = $2 AND status = 'failed' \
         RETURNING ",
        queue_columns!()
    ))
    .bind(id)
    .bind(user_id)
    .bind(now)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

fn expect_transition(
    rows_affected: u64,
    id: Uuid,
    expected_status: &'static str,
) -> Result<(), DbError> {
    if rows_affected == 0 {
        return Err(DbError::InvalidQueueTransition {
            id,
            expected_status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> SyncQueueRow {
        let now = Utc::now();
        SyncQueueRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            sync_type: "stock".to_string(),
            entity_type: "integration".to_string(),
            entity_id: Some(Uuid::new_v4()),
            action: "export".to_string(),
            status: "pending".to_string(),
            priority: 5,
            scheduled_at: now,
            retry_count: 1,
            max_retries: 3,
            channels: serde_json::json!([
                { "integration_id": Uuid::nil(), "platform": "woocommerce" }
            ]),
            payload: serde_json::json!({ "store_name": "Shop" }),
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_to_domain_item() {
        let item = SyncQueueItem::try_from(row()).expect("valid row");
        assert_eq!(item.action, SyncAction::Export);
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.channels.len(), 1);
        assert_eq!(item.channels[0].platform, "woocommerce");
        assert_eq!(item.retry_count, 1);
    }

    #[test]
    fn unknown_sync_type_still_converts() {
        let mut r = row();
        r.sync_type = "legacy-inventory".to_string();
        let item = SyncQueueItem::try_from(r).expect("sync_type is not validated");
        assert!(item.kind().is_none());
    }

    #[test]
    fn unknown_status_is_reported_with_field_name() {
        let mut r = row();
        r.status = "retry".to_string();
        let err = SyncQueueItem::try_from(r).unwrap_err();
        assert!(matches!(err, DbError::InvalidRow { field: "status", .. }));
    }

    #[test]
    fn malformed_channels_are_reported() {
        let mut r = row();
        r.channels = serde_json::json!({ "not": "a list" });
        let err = SyncQueueItem::try_from(r).unwrap_err();
        assert!(matches!(err, DbError::InvalidRow { field: "channels", .. }));
    }

    #[test]
    fn expect_transition_rejects_zero_rows() {
        let id = Uuid::new_v4();
        assert!(expect_transition(1, id, "processing").is_ok());
        assert!(matches!(
            expect_transition(0, id, "processing"),
            Err(DbError::InvalidQueueTransition { expected_status: "processing", .. })
        ));
    }
}
