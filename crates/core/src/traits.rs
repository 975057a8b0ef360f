// Core traits
//
// Seams between the store and the outside world: the REST collaborator
// behind `NotificationApi`, and long-lived background subscriptions (push
// transports) behind `Subscription`.

use async_trait::async_trait;
use bellsync_schemas::{
    DeleteAllFilter, ListPage, ListQuery, MarkAllOutcome, MarkAllReadFilter, MarkReadOutcome,
    NotificationId,
};

use crate::error::Result;

/// Network operations over the owner's notification log.
///
/// Implementations normalize every record before returning it. Write
/// operations report a non-success status as `Ok(false)`-style outcomes and
/// reserve `Err` for transport failures, so callers can degrade gracefully.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Fetch one page of notifications
    async fn list(&self, query: ListQuery) -> Result<ListPage>;

    /// Mark a single notification read
    async fn mark_read(&self, id: &NotificationId) -> Result<MarkReadOutcome>;

    /// Mark every matching unread notification read
    async fn mark_all_read(&self, filter: &MarkAllReadFilter) -> Result<MarkAllOutcome>;

    /// Delete a single notification; `false` when the server refused
    async fn delete(&self, id: &NotificationId) -> Result<bool>;

    /// Delete every matching notification, returning how many went away
    async fn delete_all(&self, filter: &DeleteAllFilter) -> Result<u64>;

    /// Human-readable name for logging/debugging.
    fn name(&self) -> &'static str {
        "NotificationApi"
    }
}

/// A background subscription owned by a [`crate::SyncSession`].
///
/// `stop` must be idempotent; implementations also stop on drop.
pub trait Subscription: Send {
    fn stop(&mut self);

    fn name(&self) -> &str {
        "subscription"
    }
}
