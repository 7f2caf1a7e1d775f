//! Queue routes: run the dispatcher, enqueue syncs, inspect and steer rows.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use syncq_core::{QueueStats, QueueStatus, SyncQueueItem};
use syncq_db::DbError;
use syncq_dispatch::{enqueue_sync, DispatchError, DispatchReport, EnqueueRequest, EnqueueSummary};
use uuid::Uuid;

use crate::middleware::{CallerId, RequestId};

use super::{map_db_error, normalize_limit, ApiError, AppState};

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct QueueQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProcessResponse {
    success: bool,
    #[serde(flatten)]
    report: DispatchReport,
}

#[derive(Debug, Serialize)]
pub(super) struct EnqueueResponse {
    success: bool,
    #[serde(flatten)]
    summary: EnqueueSummary,
}

#[derive(Debug, Serialize)]
pub(super) struct QueueStatusResponse {
    success: bool,
    items: Vec<SyncQueueItem>,
    stats: QueueStats,
}

#[derive(Debug, Serialize)]
pub(super) struct QueueItemResponse {
    success: bool,
    item: SyncQueueItem,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn map_dispatch_error(request_id: String, error: &DispatchError) -> ApiError {
    match error {
        DispatchError::InvalidRequest(e) => {
            ApiError::new(request_id, "validation_error", e.to_string())
        }
        DispatchError::Store(e) => map_db_error(request_id, e),
    }
}

fn parse_item_id(request_id: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::new(
            request_id,
            "validation_error",
            format!("invalid queue item id: {raw}"),
        )
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Runs one dispatcher pass. Per-item failures only show in `results`.
pub(super) async fn process_queue(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let report = state
        .dispatcher
        .process_queue()
        .await
        .map_err(|e| map_dispatch_error(req_id.0.clone(), &e))?;

    Ok(Json(ProcessResponse {
        success: true,
        report,
    }))
}

pub(super) async fn enqueue(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let Json(request) = body.map_err(|e| {
        ApiError::new(req_id.0.clone(), "validation_error", e.body_text())
    })?;

    let summary = enqueue_sync(state.store.as_ref(), user_id, &request, Utc::now())
        .await
        .map_err(|e| map_dispatch_error(req_id.0.clone(), &e))?;

    Ok(Json(EnqueueResponse {
        success: true,
        summary,
    }))
}

pub(super) async fn queue_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    Query(query): Query<QueueQuery>,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<QueueStatus>())
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let items = state
        .store
        .list_items(user_id, status, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let stats = state
        .store
        .stats(user_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(QueueStatusResponse {
        success: true,
        items,
        stats,
    }))
}

pub(super) async fn cancel_queue_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    Path(raw_id): Path<String>,
) -> Result<Json<QueueItemResponse>, ApiError> {
    let id = parse_item_id(&req_id.0, &raw_id)?;

    let item = match state.store.cancel(id, user_id, Utc::now()).await {
        Ok(item) => item,
        Err(DbError::NotFound) => {
            return Err(ApiError::new(
                req_id.0,
                "not_found",
                format!("no pending queue item {id}"),
            ));
        }
        Err(e) => return Err(map_db_error(req_id.0, &e)),
    };

    tracing::info!(%id, %user_id, "queue item cancelled");
    Ok(Json(QueueItemResponse {
        success: true,
        item,
    }))
}

pub(super) async fn retry_queue_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CallerId(user_id): CallerId,
    Path(raw_id): Path<String>,
) -> Result<Json<QueueItemResponse>, ApiError> {
    let id = parse_item_id(&req_id.0, &raw_id)?;

    let item = match state.store.retry_now(id, user_id, Utc::now()).await {
        Ok(item) => item,
        Err(DbError::NotFound) => {
            return Err(ApiError::new(
                req_id.0,
                "not_found",
                format!("no failed queue item {id}"),
            ));
        }
        Err(e) => return Err(map_db_error(req_id.0, &e)),
    };

    tracing::info!(%id, %user_id, "queue item re-queued");
    Ok(Json(QueueItemResponse {
        success: true,
        item,
    }))
}
