//! Live integration tests for syncq-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. Run with `DATABASE_URL` set and `--ignored`.

use chrono::{Duration, DurationRound, Utc};
use syncq_core::{ChannelRef, NewSyncQueueItem, QueueStatus, SyncAction, SyncQueueItem, SyncType};
use syncq_db::{
    cancel_queue_item, claim_due_batch, count_unroutable_due, get_queue_item, insert_queue_items,
    list_active_integrations, list_queue_items, mark_queue_item_completed,
    mark_queue_item_failed, purge_terminal_queue_items, queue_stats, release_stale_claims,
    reschedule_queue_item, retry_queue_item_now, DbError,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Postgres stores microseconds; truncate so round-tripped timestamps compare equal.
fn now() -> chrono::DateTime<Utc> {
    Utc::now()
        .duration_trunc(Duration::microseconds(1))
        .expect("truncate")
}

fn known() -> Vec<String> {
    SyncType::known_names()
}

fn new_item(user_id: Uuid, sync_type: SyncType, priority: i32) -> NewSyncQueueItem {
    let integration_id = Uuid::new_v4();
    NewSyncQueueItem {
        user_id,
        sync_type,
        entity_type: "integration".to_string(),
        entity_id: Some(integration_id),
        action: SyncAction::Export,
        priority,
        scheduled_at: now() - Duration::seconds(1),
        max_retries: 3,
        channels: vec![ChannelRef {
            integration_id,
            platform: "shopify".to_string(),
        }],
        payload: serde_json::json!({ "store_name": "Test Store", "platform": "shopify" }),
    }
}

async fn insert_integration(pool: &sqlx::PgPool, user_id: Uuid, name: &str, active: bool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO store_integrations (id, user_id, platform, store_name, is_active) \
         VALUES ($1, $2, 'shopify', $3, $4)",
    )
    .bind(id)
    .bind(user_id)
    .bind(name)
    .bind(active)
    .execute(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_integration failed for '{name}': {e}"));
    id
}

// ---------------------------------------------------------------------------
// Integrations
// ---------------------------------------------------------------------------

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn list_active_integrations_filters_inactive_and_by_id(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    let a = insert_integration(&pool, user, "Store A", true).await;
    insert_integration(&pool, user, "Store B", true).await;
    insert_integration(&pool, user, "Store C", false).await;
    insert_integration(&pool, Uuid::new_v4(), "Someone Else", true).await;

    let all = list_active_integrations(&pool, user, None)
        .await
        .expect("list all");
    assert_eq!(all.len(), 2);

    let one = list_active_integrations(&pool, user, Some(a))
        .await
        .expect("list one");
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].store_name, "Store A");
}

// ---------------------------------------------------------------------------
// Enqueue and claim
// ---------------------------------------------------------------------------

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn enqueue_twice_creates_two_rows(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    let item = new_item(user, SyncType::Products, 5);

    let first = insert_queue_items(&pool, std::slice::from_ref(&item), now())
        .await
        .expect("first insert");
    let second = insert_queue_items(&pool, std::slice::from_ref(&item), now())
        .await
        .expect("second insert");

    assert_ne!(first[0].id, second[0].id);
    let rows = list_queue_items(&pool, user, None, 50).await.expect("list");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == "pending" && r.priority == 5));
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn claim_orders_by_priority_and_skips_future_rows(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    let low = new_item(user, SyncType::Stock, 9);
    let high = new_item(user, SyncType::Prices, 1);
    let mut future = new_item(user, SyncType::Products, 0);
    future.scheduled_at = now() + Duration::hours(1);

    insert_queue_items(&pool, &[low, high, future], now())
        .await
        .expect("insert");

    let claimed = claim_due_batch(&pool, now(), 50, &known())
        .await
        .expect("claim");
    assert_eq!(claimed.len(), 2);
    assert_eq!(claimed[0].sync_type, "prices");
    assert_eq!(claimed[1].sync_type, "stock");
    assert!(claimed.iter().all(|r| r.status == "processing"));
    assert!(claimed.iter().all(|r| r.started_at.is_some()));

    let again = claim_due_batch(&pool, now(), 50, &known())
        .await
        .expect("second claim");
    assert!(again.is_empty(), "claimed rows must not be claimed twice");
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn claim_leaves_unknown_sync_types_pending(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    insert_queue_items(&pool, &[new_item(user, SyncType::Orders, 5)], now())
        .await
        .expect("insert");
    sqlx::query("UPDATE unified_sync_queue SET sync_type = 'inventory' WHERE user_id = $1")
        .bind(user)
        .execute(&pool)
        .await
        .expect("rewrite sync_type");

    assert_eq!(
        count_unroutable_due(&pool, now(), &known()).await.expect("count"),
        1
    );
    let claimed = claim_due_batch(&pool, now(), 50, &known())
        .await
        .expect("claim");
    assert!(claimed.is_empty());

    let rows = list_queue_items(&pool, user, Some(QueueStatus::Pending), 50)
        .await
        .expect("list");
    assert_eq!(rows.len(), 1);
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn claim_respects_limit(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    let items: Vec<_> = (0..5).map(|_| new_item(user, SyncType::Stock, 5)).collect();
    insert_queue_items(&pool, &items, now()).await.expect("insert");

    let claimed = claim_due_batch(&pool, now(), 3, &known())
        .await
        .expect("claim");
    assert_eq!(claimed.len(), 3);
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn processing_row_can_complete(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    insert_queue_items(&pool, &[new_item(user, SyncType::Products, 5)], now())
        .await
        .expect("insert");
    let claimed = claim_due_batch(&pool, now(), 50, &known())
        .await
        .expect("claim");
    let id = claimed[0].id;

    let done_at = now();
    mark_queue_item_completed(&pool, id, done_at)
        .await
        .expect("complete");

    let row = get_queue_item(&pool, id).await.expect("get");
    assert_eq!(row.status, "completed");
    assert_eq!(row.completed_at, Some(done_at));

    let err = mark_queue_item_completed(&pool, id, now())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidQueueTransition { .. }));
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn reschedule_returns_row_to_pending(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    insert_queue_items(&pool, &[new_item(user, SyncType::Products, 5)], now())
        .await
        .expect("insert");
    let id = claim_due_batch(&pool, now(), 50, &known())
        .await
        .expect("claim")[0]
        .id;

    let at = now();
    let next = at + Duration::minutes(8);
    reschedule_queue_item(&pool, id, 3, next, "timeout", at)
        .await
        .expect("reschedule");

    let item = SyncQueueItem::try_from(get_queue_item(&pool, id).await.expect("get"))
        .expect("convert");
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.retry_count, 3);
    assert_eq!(item.scheduled_at, next);
    assert_eq!(item.error_message.as_deref(), Some("timeout"));
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn failed_row_keeps_schedule_and_can_be_retried_now(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    insert_queue_items(&pool, &[new_item(user, SyncType::Tracking, 5)], now())
        .await
        .expect("insert");
    let claimed = claim_due_batch(&pool, now(), 50, &known())
        .await
        .expect("claim");
    let id = claimed[0].id;
    let scheduled_before = claimed[0].scheduled_at;

    mark_queue_item_failed(&pool, id, "carrier API down", now())
        .await
        .expect("fail");
    let failed = get_queue_item(&pool, id).await.expect("get");
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.scheduled_at, scheduled_before);
    assert_eq!(failed.error_message.as_deref(), Some("carrier API down"));

    let other_user = Uuid::new_v4();
    assert!(matches!(
        retry_queue_item_now(&pool, id, other_user, now()).await,
        Err(DbError::NotFound)
    ));

    let retried = retry_queue_item_now(&pool, id, user, now())
        .await
        .expect("retry now");
    assert_eq!(retried.status, "pending");
    assert_eq!(retried.retry_count, 0);
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn cancel_only_applies_to_pending_rows(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    let rows = insert_queue_items(
        &pool,
        &[
            new_item(user, SyncType::Customers, 5),
            new_item(user, SyncType::Customers, 5),
        ],
        now(),
    )
    .await
    .expect("insert");

    let cancelled = cancel_queue_item(&pool, rows[0].id, user, now())
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, "cancelled");

    assert!(matches!(
        cancel_queue_item(&pool, rows[0].id, user, now()).await,
        Err(DbError::NotFound)
    ));

    let stats = queue_stats(&pool, user).await.expect("stats");
    let count = |s: &str| {
        stats
            .iter()
            .find(|(status, _)| status == s)
            .map_or(0, |(_, c)| *c)
    };
    assert_eq!(count("cancelled"), 1);
    assert_eq!(count("pending"), 1);
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn purge_deletes_only_old_terminal_rows(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    let rows = insert_queue_items(
        &pool,
        &[
            new_item(user, SyncType::Products, 5),
            new_item(user, SyncType::Products, 5),
            new_item(user, SyncType::Products, 5),
            new_item(user, SyncType::Products, 5),
        ],
        now(),
    )
    .await
    .expect("insert");

    let old = now() - Duration::days(8);
    let recent = now() - Duration::days(6);
    for (row, status, updated_at) in [
        (&rows[0], "completed", old),
        (&rows[1], "failed", old),
        (&rows[2], "completed", recent),
        (&rows[3], "pending", old),
    ] {
        sqlx::query("UPDATE unified_sync_queue SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(row.id)
            .bind(status)
            .bind(updated_at)
            .execute(&pool)
            .await
            .expect("age row");
    }

    let purged = purge_terminal_queue_items(&pool, now() - Duration::days(7))
        .await
        .expect("purge");
    assert_eq!(purged, 2);

    let remaining = list_queue_items(&pool, user, None, 50).await.expect("list");
    let ids: Vec<_> = remaining.iter().map(|r| r.id).collect();
    assert!(ids.contains(&rows[2].id), "recent terminal row survives");
    assert!(ids.contains(&rows[3].id), "old pending row survives");
    assert_eq!(ids.len(), 2);
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn stale_claims_are_returned_to_pending(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    insert_queue_items(
        &pool,
        &[
            new_item(user, SyncType::Products, 5),
            new_item(user, SyncType::Stock, 5),
        ],
        now(),
    )
    .await
    .expect("insert");
    let claimed = claim_due_batch(&pool, now(), 50, &known())
        .await
        .expect("claim");
    assert_eq!(claimed.len(), 2);

    let abandoned = claimed[0].id;
    sqlx::query("UPDATE unified_sync_queue SET started_at = $2 WHERE id = $1")
        .bind(abandoned)
        .bind(now() - Duration::hours(2))
        .execute(&pool)
        .await
        .expect("backdate claim");

    let released = release_stale_claims(&pool, now() - Duration::hours(1), now())
        .await
        .expect("release");
    assert_eq!(released, 1);

    let row = get_queue_item(&pool, abandoned).await.expect("get");
    assert_eq!(row.status, "pending");
    assert!(row.started_at.is_none());
    assert_eq!(row.retry_count, 0);
    let fresh = get_queue_item(&pool, claimed[1].id).await.expect("get");
    assert_eq!(fresh.status, "processing");

    let reclaimed = claim_due_batch(&pool, now(), 50, &known())
        .await
        .expect("claim again");
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, abandoned);
}
