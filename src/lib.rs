//! Offline-first action queue and resilient sync layer for the
//! swipe-to-apply client.
//!
//! The library accepts user actions while the device is offline, persists
//! them durably, and replays them in FIFO order once connectivity returns.
//! A token-refreshing HTTP client absorbs transient failures with bounded
//! backoff, and a local TTL cache backs read-through access to server
//! data; the server stays the source of truth.
//!
//! There is no CLI or UI here: the crate is consumed by the client's event
//! handlers. Everything is constructed explicitly and injected, so tests
//! and hosts can run isolated instances side by side.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod net;
pub mod queue;
pub mod sync;

pub use api::client::ApiClient;
pub use api::session::{AuthSession, SessionManager};
pub use api::transport::{HttpTransport, Transport};
pub use api::types::{Job, JobFeedPage, SwipeDirection, TokenPair};
pub use cache::{CacheLayer, CacheResult, CacheSource};
pub use config::Config;
pub use db::Database;
pub use error::ApiError;
pub use net::{ConnectivityEvents, ConnectivityMonitor, NetStatus};
pub use queue::{ActionKind, ActionQueue, QueuedAction};
pub use sync::undo::{UndoBuffer, UndoableAction};
pub use sync::{DrainReport, SubmitOutcome, SyncCoordinator, UndoneAction};
