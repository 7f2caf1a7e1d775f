//! Turns a user's sync request into one queue row per active integration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syncq_core::{
    ChannelRef, NewSyncQueueItem, StoreIntegration, SyncAction, SyncType, DEFAULT_MAX_RETRIES,
    DEFAULT_PRIORITY,
};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::store::SyncStore;

/// Body of an enqueue call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnqueueRequest {
    pub sync_type: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub integration_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueSummary {
    pub message: String,
    pub queued: usize,
    pub stores: Vec<String>,
    #[serde(skip)]
    pub ids: Vec<Uuid>,
}

fn build_item(
    user_id: Uuid,
    sync_type: SyncType,
    action: SyncAction,
    integration: &StoreIntegration,
    now: DateTime<Utc>,
) -> NewSyncQueueItem {
    NewSyncQueueItem {
        user_id,
        sync_type,
        entity_type: "integration".to_owned(),
        entity_id: Some(integration.id),
        action,
        priority: DEFAULT_PRIORITY,
        scheduled_at: now,
        max_retries: DEFAULT_MAX_RETRIES,
        channels: vec![ChannelRef {
            integration_id: integration.id,
            platform: integration.platform.clone(),
        }],
        payload: serde_json::json!({
            "store_name": integration.store_name,
            "platform": integration.platform,
        }),
    }
}

/// Queues a sync of `request.sync_type` for each of the user's active
/// integrations, or only `request.integration_id` when given.
///
/// Rows are due immediately. Repeated calls are not merged: each call adds
/// its own rows. A user with no active integrations gets `queued: 0`.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidRequest`] for an unknown sync type or
/// direction, or [`DispatchError::Store`] if reading integrations or
/// inserting rows fails.
pub async fn enqueue_sync(
    store: &dyn SyncStore,
    user_id: Uuid,
    request: &EnqueueRequest,
    now: DateTime<Utc>,
) -> Result<EnqueueSummary, DispatchError> {
    let sync_type: SyncType = request.sync_type.trim().parse()?;
    let action: SyncAction = match request.direction.as_deref().map(str::trim) {
        None | Some("") => SyncAction::default(),
        Some(direction) => direction.parse()?,
    };

    let integrations = store
        .list_active_integrations(user_id, request.integration_id)
        .await?;

    if integrations.is_empty() {
        tracing::info!(%user_id, %sync_type, "no active integrations; nothing queued");
        return Ok(EnqueueSummary {
            message: "No active integrations to sync".to_owned(),
            queued: 0,
            stores: Vec::new(),
            ids: Vec::new(),
        });
    }

    let items: Vec<NewSyncQueueItem> = integrations
        .iter()
        .map(|integration| build_item(user_id, sync_type, action, integration, now))
        .collect();
    let created = store.enqueue(&items, now).await?;

    let stores: Vec<String> = integrations
        .into_iter()
        .map(|integration| integration.store_name)
        .collect();
    tracing::info!(
        %user_id,
        %sync_type,
        %action,
        queued = created.len(),
        "sync queued"
    );

    Ok(EnqueueSummary {
        message: format!(
            "{} sync queued for {} store(s)",
            sync_type,
            created.len()
        ),
        queued: created.len(),
        stores,
        ids: created.iter().map(|item| item.id).collect(),
    })
}
