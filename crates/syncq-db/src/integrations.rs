//! Read access to `store_integrations`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `store_integrations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IntegrationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    pub store_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<IntegrationRow> for syncq_core::StoreIntegration {
    fn from(row: IntegrationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            platform: row.platform,
            store_name: row.store_name,
            is_active: row.is_active,
        }
    }
}

/// Returns the user's active integrations, optionally narrowed to one id.
///
/// Ordered by `created_at` so producers enqueue in a stable order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_integrations(
    pool: &PgPool,
    user_id: Uuid,
    integration_id: Option<Uuid>,
) -> Result<Vec<IntegrationRow>, DbError> {
    let rows = sqlx::query_as::<_, IntegrationRow>(
        "SELECT id, user_id, platform, store_name, is_active, created_at, updated_at \
         FROM store_integrations \
         WHERE user_id = $1 \
           AND is_active = true \
           AND ($2::uuid IS NULL OR id = $2) \
         ORDER BY created_at, id",
    )
    .bind(user_id)
    .bind(integration_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
