// Notification Synchronization Engine
//
// This crate owns the client-side notification feed and reconciles it
// against periodic REST polls, real-time push events and local user actions.
//
// Key design decisions:
// - FeedState is a pure, synchronous state machine; every counter and
//   dedupe rule lives there and is unit/property tested without a runtime
// - NotificationStore is the single, explicitly constructed writer. One
//   mutex, never held across an await; network continuations re-check
//   presence before touching the counter
// - A server-declared unread count is adopted verbatim (0 included);
//   otherwise the counter moves only when an unread record actually moves
// - Network access goes through the NotificationApi trait so the HTTP
//   client, the in-memory API and test fakes are interchangeable
// - Push transports live in bellsync-transport and feed the store through
//   NotificationStore::apply with canonical events

pub mod config;
pub mod error;
pub mod poller;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod traits;

// In-memory implementation for examples and testing
pub mod memory;

// Re-exports for convenience
pub use config::{BroadcasterConfig, MercureConfig, PusherConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use memory::InMemoryNotificationApi;
pub use poller::{PollHandle, PollScheduler, PollerConfig, TickOutcome};
pub use session::SyncSession;
pub use state::{Applied, FeedSnapshot, FeedState, MergeSummary};
pub use store::{NotificationStore, StoreConfig, StoreEvent};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use traits::{NotificationApi, Subscription};
