//! Live dispatcher runs over `PgSyncStore` using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. Run with `DATABASE_URL` set and `--ignored`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, DurationRound, Utc};
use syncq_core::{ChannelRef, NewSyncQueueItem, SyncAction, SyncType};
use syncq_db::{get_queue_item, insert_queue_items};
use syncq_dispatch::{
    ChannelInvoker, DispatchConfig, Dispatcher, InvokeError, InvokeRequest, PgSyncStore,
};
use uuid::Uuid;

struct AcceptAll;

#[async_trait]
impl ChannelInvoker for AcceptAll {
    async fn invoke(
        &self,
        _handler: &str,
        _request: &InvokeRequest,
    ) -> Result<serde_json::Value, InvokeError> {
        Ok(serde_json::json!({ "synced": 1 }))
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc::now()
        .duration_trunc(Duration::microseconds(1))
        .expect("truncate")
}

fn new_item(user_id: Uuid, sync_type: SyncType) -> NewSyncQueueItem {
    let integration_id = Uuid::new_v4();
    NewSyncQueueItem {
        user_id,
        sync_type,
        entity_type: "integration".to_string(),
        entity_id: Some(integration_id),
        action: SyncAction::Export,
        priority: 5,
        scheduled_at: now() - Duration::seconds(1),
        max_retries: 3,
        channels: vec![ChannelRef {
            integration_id,
            platform: "shopify".to_string(),
        }],
        payload: serde_json::json!({ "store_name": "Test Store", "platform": "shopify" }),
    }
}

fn dispatcher(pool: sqlx::PgPool) -> Dispatcher {
    Dispatcher::new(
        Arc::new(PgSyncStore::new(pool)),
        Arc::new(AcceptAll),
        DispatchConfig::default(),
    )
}

async fn processing_count(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM unified_sync_queue WHERE status = 'processing'")
        .fetch_one(pool)
        .await
        .expect("count processing")
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn malformed_row_is_failed_and_the_rest_of_the_batch_runs(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    let rows = insert_queue_items(
        &pool,
        &[
            new_item(user, SyncType::Products),
            new_item(user, SyncType::Stock),
        ],
        now(),
    )
    .await
    .expect("insert");
    let (good, bad) = (rows[0].id, rows[1].id);
    sqlx::query(
        "UPDATE unified_sync_queue SET channels = '[{\"platform\":\"shopify\"}]' WHERE id = $1",
    )
    .bind(bad)
    .execute(&pool)
    .await
    .expect("corrupt channels");

    let dispatcher = dispatcher(pool.clone());
    let report = dispatcher.process_queue().await.expect("first run");
    assert_eq!(report.processed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.results[0].id, good);

    let good_row = get_queue_item(&pool, good).await.expect("get good");
    assert_eq!(good_row.status, "completed");
    let bad_row = get_queue_item(&pool, bad).await.expect("get bad");
    assert_eq!(bad_row.status, "failed");
    assert!(
        bad_row
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("integration_id")),
        "decode error recorded, got {:?}",
        bad_row.error_message
    );

    let second = dispatcher.process_queue().await.expect("second run");
    assert_eq!(second.processed, 0);
    assert_eq!(processing_count(&pool).await, 0);
}

#[ignore = "requires DATABASE_URL pointing at Postgres"]
#[sqlx::test(migrations = "../../migrations")]
async fn abandoned_claim_is_picked_up_by_the_next_run(pool: sqlx::PgPool) {
    let user = Uuid::new_v4();
    let rows = insert_queue_items(&pool, &[new_item(user, SyncType::Orders)], now())
        .await
        .expect("insert");
    let id = rows[0].id;
    sqlx::query(
        "UPDATE unified_sync_queue SET status = 'processing', started_at = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(now() - Duration::hours(3))
    .execute(&pool)
    .await
    .expect("simulate crashed claim");

    let report = dispatcher(pool.clone())
        .process_queue()
        .await
        .expect("run");
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.succeeded, 1);

    let row = get_queue_item(&pool, id).await.expect("get");
    assert_eq!(row.status, "completed");
    assert_eq!(processing_count(&pool).await, 0);
}
