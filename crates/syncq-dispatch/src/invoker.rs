//! Invocation of per-channel sync handlers.
//!
//! Handlers are addressed by name (see [`syncq_core::SyncType::handler_name`])
//! and receive an [`InvokeRequest`] as their JSON body. Any error is a
//! per-item failure for the dispatcher to retry or retire.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use syncq_core::{AppConfig, ChannelRef, SyncAction, SyncQueueItem};
use uuid::Uuid;

use crate::error::InvokeError;

/// Longest slice of an error response body kept in the error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Body sent to a per-channel handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvokeRequest {
    pub user_id: Uuid,
    pub queue_id: Uuid,
    pub entity_id: Option<Uuid>,
    pub entity_type: String,
    pub action: SyncAction,
    pub channels: Vec<ChannelRef>,
    pub payload: serde_json::Value,
}

impl InvokeRequest {
    #[must_use]
    pub fn from_item(item: &SyncQueueItem) -> Self {
        Self {
            user_id: item.user_id,
            queue_id: item.id,
            entity_id: item.entity_id,
            entity_type: item.entity_type.clone(),
            action: item.action,
            channels: item.channels.clone(),
            payload: item.payload.clone(),
        }
    }
}

#[async_trait]
pub trait ChannelInvoker: Send + Sync {
    /// Runs `handler` for one queue row. `Ok` carries the handler's response.
    async fn invoke(
        &self,
        handler: &str,
        request: &InvokeRequest,
    ) -> Result<serde_json::Value, InvokeError>;
}

/// Calls handlers as `POST {base_url}/{handler}` with a JSON body.
///
/// The client timeout bounds each attempt, so a hung handler surfaces as an
/// [`InvokeError::Http`] and is retried like any other failure.
pub struct HttpInvoker {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpInvoker {
    /// # Errors
    ///
    /// Returns [`InvokeError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`InvokeError::InvalidUrl`] if `base_url` does not parse.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, InvokeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("syncq/0.1 (sync-dispatcher)")
            .build()?;

        // A trailing slash makes `Url::join` append the handler name instead
        // of replacing the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalised).map_err(|e| InvokeError::InvalidUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url: parsed,
            token: token.map(str::to_owned),
        })
    }

    /// # Errors
    ///
    /// See [`HttpInvoker::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, InvokeError> {
        Self::new(
            &config.functions_url,
            config.functions_token.as_deref(),
            config.handler_timeout_secs,
        )
    }

    fn handler_url(&self, handler: &str) -> Result<Url, InvokeError> {
        self.base_url
            .join(handler)
            .map_err(|e| InvokeError::InvalidUrl {
                url: format!("{}{handler}", self.base_url),
                reason: e.to_string(),
            })
    }

    /// Handlers may answer 2xx with `{"success": false, "error": "..."}`.
    fn check_handler_error(handler: &str, body: &serde_json::Value) -> Result<(), InvokeError> {
        if body.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
            let message = body
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("handler reported failure without a message")
                .to_owned();
            return Err(InvokeError::Handler {
                handler: handler.to_owned(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelInvoker for HttpInvoker {
    async fn invoke(
        &self,
        handler: &str,
        request: &InvokeRequest,
    ) -> Result<serde_json::Value, InvokeError> {
        let url = self.handler_url(handler)?;
        let mut builder = self.client.post(url).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(InvokeError::Status {
                handler: handler.to_owned(),
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }

        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| InvokeError::Deserialize {
                context: handler.to_owned(),
                source: e,
            })?;
        Self::check_handler_error(handler, &body)?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_url_appends_to_base_path() {
        let invoker = HttpInvoker::new("http://localhost:54321/functions/v1/", None, 5)
            .expect("valid base url");
        let url = invoker
            .handler_url("sync-stock-to-channels")
            .expect("join");
        assert_eq!(
            url.as_str(),
            "http://localhost:54321/functions/v1/sync-stock-to-channels"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = HttpInvoker::new("not a url", None, 5);
        assert!(matches!(result, Err(InvokeError::InvalidUrl { .. })));
    }

    #[test]
    fn success_false_is_a_handler_error() {
        let body = serde_json::json!({ "success": false, "error": "token expired" });
        let err = HttpInvoker::check_handler_error("sync-orders-from-channels", &body).unwrap_err();
        assert_eq!(
            err.to_string(),
            "handler sync-orders-from-channels reported failure: token expired"
        );

        let ok = serde_json::json!({ "success": true, "synced": 4 });
        assert!(HttpInvoker::check_handler_error("h", &ok).is_ok());
    }

    #[test]
    fn request_serializes_queue_fields() {
        let request = InvokeRequest {
            user_id: Uuid::nil(),
            queue_id: Uuid::nil(),
            entity_id: None,
            entity_type: "integration".to_owned(),
            action: SyncAction::Bidirectional,
            channels: vec![],
            payload: serde_json::json!({ "store_name": "Shop" }),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["action"], "bidirectional");
        assert_eq!(json["queue_id"], Uuid::nil().to_string());
        assert_eq!(json["payload"]["store_name"], "Shop");
    }
}
