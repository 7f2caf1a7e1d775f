use syncq_core::CoreError;
use syncq_db::DbError;
use thiserror::Error;

/// Errors from invoking a per-channel sync handler.
///
/// Every variant is a per-item failure; the dispatcher turns it into a retry
/// or a terminal `failed` row and never propagates it.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Network, TLS or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The handler answered with a non-2xx status.
    #[error("handler {handler} returned HTTP {status}: {body}")]
    Status {
        handler: String,
        status: u16,
        body: String,
    },

    /// The handler answered 2xx but reported `"success": false`.
    #[error("handler {handler} reported failure: {message}")]
    Handler { handler: String, message: String },

    /// The response body was not valid JSON.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid functions URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors surfaced to the caller of the producer or the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request named an unknown sync type or direction.
    #[error(transparent)]
    InvalidRequest(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] DbError),
}
