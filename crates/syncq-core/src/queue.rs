//! Domain types for the unified sync queue.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Priority assigned to every producer-created row. Lower sorts first.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Retry budget assigned to producer-created rows.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Kind of synchronization a queue row asks for.
///
/// Every variant routes to exactly one per-channel handler; see
/// [`SyncType::handler_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Products,
    Prices,
    Stock,
    Orders,
    Customers,
    Tracking,
    Fulfillment,
}

impl SyncType {
    pub const ALL: [SyncType; 7] = [
        SyncType::Products,
        SyncType::Prices,
        SyncType::Stock,
        SyncType::Orders,
        SyncType::Customers,
        SyncType::Tracking,
        SyncType::Fulfillment,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncType::Products => "products",
            SyncType::Prices => "prices",
            SyncType::Stock => "stock",
            SyncType::Orders => "orders",
            SyncType::Customers => "customers",
            SyncType::Tracking => "tracking",
            SyncType::Fulfillment => "fulfillment",
        }
    }

    /// Name of the per-channel function that performs this sync.
    #[must_use]
    pub fn handler_name(self) -> &'static str {
        match self {
            SyncType::Products => "sync-products-to-channels",
            SyncType::Prices => "sync-prices-to-channels",
            SyncType::Stock => "sync-stock-to-channels",
            SyncType::Orders => "sync-orders-from-channels",
            SyncType::Customers => "sync-customers-from-channels",
            SyncType::Tracking => "sync-tracking-to-channels",
            SyncType::Fulfillment => "sync-fulfillment-to-channels",
        }
    }

    /// Wire names of every routable sync type, as stored in `sync_type`.
    #[must_use]
    pub fn known_names() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_owned()).collect()
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownSyncType(s.to_owned()))
    }
}

/// Direction of a sync between the dashboard and connected stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Import,
    Export,
    #[default]
    Bidirectional,
}

impl SyncAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncAction::Import => "import",
            SyncAction::Export => "export",
            SyncAction::Bidirectional => "bidirectional",
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "import" => Ok(SyncAction::Import),
            "export" => Ok(SyncAction::Export),
            "bidirectional" => Ok(SyncAction::Bidirectional),
            other => Err(CoreError::UnknownSyncAction(other.to_owned())),
        }
    }
}

/// Lifecycle state of a queue row.
///
/// `pending -> processing -> {completed | failed}`; a failed attempt with
/// budget left goes back to `pending`. `cancelled` is reachable only from
/// `pending` through an explicit cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub const TERMINAL: [QueueStatus; 3] = [
        QueueStatus::Completed,
        QueueStatus::Failed,
        QueueStatus::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            "cancelled" => Ok(QueueStatus::Cancelled),
            other => Err(CoreError::UnknownQueueStatus(other.to_owned())),
        }
    }
}

/// One target store of a queue row, serialized into the `channels` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub integration_id: Uuid,
    pub platform: String,
}

/// A persisted queue row.
///
/// `sync_type` stays a raw string: rows written by older producers may carry
/// values the dispatcher cannot route, and those must still be listable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sync_type: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub action: SyncAction,
    pub status: QueueStatus,
    pub priority: i32,
    pub scheduled_at: DateTime<Utc>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub channels: Vec<ChannelRef>,
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncQueueItem {
    /// Routable sync type, or `None` when the stored value is not a known variant.
    #[must_use]
    pub fn kind(&self) -> Option<SyncType> {
        self.sync_type.parse().ok()
    }

    /// Whether the dispatcher may pick this row up at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending && self.scheduled_at <= now
    }

    /// Whether another attempt may be scheduled after a failure.
    #[must_use]
    pub fn has_retry_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// A queue row as built by a producer, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSyncQueueItem {
    pub user_id: Uuid,
    pub sync_type: SyncType,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub action: SyncAction,
    pub priority: i32,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: i32,
    pub channels: Vec<ChannelRef>,
    pub payload: serde_json::Value,
}

/// A connected store a user can sync to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIntegration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    pub store_name: String,
    pub is_active: bool,
}

/// Per-status row counts for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl QueueStats {
    pub fn add(&mut self, status: QueueStatus, count: i64) {
        match status {
            QueueStatus::Pending => self.pending += count,
            QueueStatus::Processing => self.processing += count,
            QueueStatus::Completed => self.completed += count,
            QueueStatus::Failed => self.failed += count,
            QueueStatus::Cancelled => self.cancelled += count,
        }
    }
}
