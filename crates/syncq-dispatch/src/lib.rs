//! Producer and dispatcher for the unified sync queue.
//!
//! The queue itself lives behind [`SyncStore`]; the per-channel handlers live
//! behind [`ChannelInvoker`]. [`enqueue_sync`] writes rows, and
//! [`Dispatcher::process_queue`] claims, executes and retires them.

pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod producer;
pub mod store;

pub use dispatcher::{Clock, DispatchConfig, DispatchReport, Dispatcher, ItemOutcome};
pub use error::{DispatchError, InvokeError};
pub use invoker::{ChannelInvoker, HttpInvoker, InvokeRequest};
pub use producer::{enqueue_sync, EnqueueRequest, EnqueueSummary};
pub use store::{MemorySyncStore, PgSyncStore, SyncStore};
