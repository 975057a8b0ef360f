// In-memory NotificationApi
//
// A server-side notification log held in process memory. Used by the store,
// poller and transport tests, and handy for demos without a backend. List
// semantics follow the REST collaborator: newest first, page/limit slicing,
// status and type filters, and an unread total in the response meta.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bellsync_schemas::{
    DeleteAllFilter, ListPage, ListQuery, MarkAllOutcome, MarkAllReadFilter, MarkReadOutcome,
    Notification, NotificationId, Source,
};
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{Result, SyncError};
use crate::traits::NotificationApi;

/// Scriptable in-memory implementation of [`NotificationApi`].
///
/// # Example
///
/// ```
/// use bellsync_core::InMemoryNotificationApi;
/// use bellsync_schemas::Notification;
///
/// let api = InMemoryNotificationApi::new();
/// api.insert(Notification::new("1", "info"));
/// assert_eq!(api.unread_total(), 1);
/// ```
pub struct InMemoryNotificationApi {
    records: RwLock<Vec<Notification>>,
    calls: RwLock<HashMap<&'static str, usize>>,
    latency: RwLock<Option<Duration>>,
    failing: AtomicBool,
    declare_counts: AtomicBool,
}

impl InMemoryNotificationApi {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            calls: RwLock::new(HashMap::new()),
            latency: RwLock::new(None),
            failing: AtomicBool::new(false),
            declare_counts: AtomicBool::new(true),
        }
    }

    /// Seed the log with records (any order; listing sorts newest first)
    pub fn with_records(self, records: impl IntoIterator<Item = Notification>) -> Self {
        for record in records {
            self.insert(record);
        }
        self
    }

    /// Delay every response by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.write() = Some(latency);
        self
    }

    /// Omit `unread_count` from list and mark-read responses
    pub fn without_declared_counts(self) -> Self {
        self.declare_counts.store(false, Ordering::SeqCst);
        self
    }

    /// Make every call fail with a network error until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, mut record: Notification) {
        record.source = Source::Api;
        record.is_new = false;
        let mut records = self.records.write();
        records.retain(|n| n.id != record.id);
        records.push(record);
    }

    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.records.read().iter().find(|n| &n.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn unread_total(&self) -> u32 {
        let count = self.records.read().iter().filter(|n| n.is_unread()).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// How many times an operation (`list`, `mark_read`, ...) was invoked
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.read().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.read().values().sum()
    }

    async fn enter(&self, operation: &'static str) -> Result<()> {
        *self.calls.write().entry(operation).or_insert(0) += 1;

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::network(format!("{} failed: server unavailable", operation)));
        }
        Ok(())
    }

    fn declared(&self) -> Option<u32> {
        self.declare_counts
            .load(Ordering::SeqCst)
            .then(|| self.unread_total())
    }
}

impl Default for InMemoryNotificationApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationApi for InMemoryNotificationApi {
    async fn list(&self, query: ListQuery) -> Result<ListPage> {
        self.enter("list").await?;

        let mut matching: Vec<Notification> = self
            .records
            .read()
            .iter()
            .filter(|n| query.status.matches(n.is_unread()))
            .filter(|n| query.kind.as_deref().map_or(true, |kind| n.kind == kind))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let limit = query.limit as usize;
        let offset = (query.page.saturating_sub(1) as usize).saturating_mul(limit);
        let has_more = matching.len() > offset.saturating_add(limit);
        let items: Vec<Notification> = matching.into_iter().skip(offset).take(limit).collect();

        let page = ListPage::new(items).with_has_more(has_more);
        Ok(match self.declared() {
            Some(count) => page.with_unread_count(count),
            None => page,
        })
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<MarkReadOutcome> {
        self.enter("mark_read").await?;

        let found = {
            let mut records = self.records.write();
            match records.iter_mut().find(|n| &n.id == id) {
                Some(record) => {
                    if record.read_at.is_none() {
                        record.read_at = Some(Utc::now());
                    }
                    true
                }
                None => false,
            }
        };

        if !found {
            return Ok(MarkReadOutcome::failed());
        }
        Ok(match self.declared() {
            Some(count) => MarkReadOutcome::ok().with_unread_count(count),
            None => MarkReadOutcome::ok(),
        })
    }

    async fn mark_all_read(&self, filter: &MarkAllReadFilter) -> Result<MarkAllOutcome> {
        self.enter("mark_all_read").await?;

        let now = Utc::now();
        let mut marked = 0u64;
        for record in self.records.write().iter_mut() {
            let kind_ok = filter.kind.as_deref().map_or(true, |kind| record.kind == kind);
            let before_ok = filter.before.map_or(true, |before| record.created_at < before);
            if record.read_at.is_none() && kind_ok && before_ok {
                record.read_at = Some(now);
                marked += 1;
            }
        }

        Ok(MarkAllOutcome {
            success: true,
            marked_count: marked,
        })
    }

    async fn delete(&self, id: &NotificationId) -> Result<bool> {
        self.enter("delete").await?;

        let mut records = self.records.write();
        let before = records.len();
        records.retain(|n| &n.id != id);
        Ok(records.len() != before)
    }

    async fn delete_all(&self, filter: &DeleteAllFilter) -> Result<u64> {
        self.enter("delete_all").await?;

        let mut records = self.records.write();
        let before = records.len();
        records.retain(|n| !filter.matches(n));
        Ok((before - records.len()) as u64)
    }

    fn name(&self) -> &'static str {
        "InMemoryNotificationApi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn seeded(n: usize) -> InMemoryNotificationApi {
        let now = Utc::now();
        InMemoryNotificationApi::new().with_records((0..n).map(|i| {
            Notification::new(i.to_string(), "info")
                .with_created_at(now - ChronoDuration::minutes(i as i64))
        }))
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let api = seeded(25);

        let first = api.list(ListQuery::page(1, 10)).await.unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0].id.as_str(), "0");
        assert!(first.has_more);
        assert_eq!(first.unread_count, Some(25));

        let last = api.list(ListQuery::page(3, 10)).await.unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_more);
        assert_eq!(api.calls("list"), 2);
    }

    #[tokio::test]
    async fn test_mark_read_unknown_id_is_refused() {
        let api = seeded(1);
        let outcome = api.mark_read(&NotificationId::from("nope")).await.unwrap();
        assert!(!outcome.success);

        let outcome = api.mark_read(&NotificationId::from("0")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.unread_count, Some(0));
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let api = seeded(1);
        api.set_failing(true);
        let err = api.list(ListQuery::page(1, 10)).await.unwrap_err();
        assert!(err.is_network());
        api.set_failing(false);
        assert!(api.list(ListQuery::page(1, 10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_all_respects_filter() {
        let api = seeded(3);
        api.mark_read(&NotificationId::from("1")).await.unwrap();

        let deleted = api
            .delete_all(&DeleteAllFilter {
                status: Some(bellsync_schemas::StatusFilter::Read),
                before: None,
            })
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(api.len(), 2);
    }
}
