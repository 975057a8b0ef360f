// Notification Store
//
// The single owner of feed state. Wraps the pure `FeedState` behind one
// mutex, performs network calls through `NotificationApi`, publishes a
// `FeedSnapshot` on every mutation and emits `StoreEvent`s.
//
// Locking rule: the mutex is never held across an `.await`. Network
// continuations re-lock and re-check presence before mutating, so a
// response that arrives after a push event already removed the record
// cannot move the counter a second time.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bellsync_schemas::{
    CanonicalEvent, DeleteAllFilter, ListQuery, MarkAllReadFilter, Notification, NotificationId,
    StatusFilter,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::state::{Applied, FeedSnapshot, FeedState, MergeSummary};
use crate::traits::NotificationApi;

/// Default page size for list loads
pub const DEFAULT_PER_PAGE: u32 = 10;

/// How long a freshly inserted record keeps its `is_new` highlight
pub const DEFAULT_NEW_HIGHLIGHT: Duration = Duration::from_secs(5);

const EVENT_CAPACITY: usize = 256;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub per_page: u32,
    pub new_highlight: Duration,

    /// Status requested by full loads and poll ticks. The feed only holds
    /// pending records, so anything but `Unread` is for diagnostics.
    pub feed_status: StatusFilter,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            new_highlight: DEFAULT_NEW_HIGHLIGHT,
            feed_status: StatusFilter::Unread,
        }
    }
}

impl StoreConfig {
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn with_new_highlight(mut self, highlight: Duration) -> Self {
        self.new_highlight = highlight;
        self
    }

    pub fn with_feed_status(mut self, status: StatusFilter) -> Self {
        self.feed_status = status;
        self
    }

    /// Query for one page of the feed
    pub fn feed_query(&self, page: u32, limit: u32) -> ListQuery {
        ListQuery::page(page, limit).with_status(self.feed_status)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Change notifications for observers that care about individual records
/// rather than whole snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    Added { notification: Notification },
    Removed { notification_id: NotificationId },
    Changed { unread_count: u32 },
    Loading,
    Loaded { page: u32, inserted: usize },
    Error { message: String },
    AllMarkedRead { marked_count: u64 },
}

// ============================================================================
// Store
// ============================================================================

struct StoreInner {
    state: Mutex<FeedState>,
    api: Arc<dyn NotificationApi>,
    config: StoreConfig,
    snapshots: watch::Sender<FeedSnapshot>,
    events: broadcast::Sender<StoreEvent>,
}

/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("api", &self.inner.api.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        Self::with_config(api, StoreConfig::default())
    }

    pub fn with_config(api: Arc<dyn NotificationApi>, config: StoreConfig) -> Self {
        let state = FeedState::new();
        let (snapshots, _) = watch::channel(state.snapshot());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(state),
                api,
                config,
                snapshots,
                events,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn api(&self) -> Arc<dyn NotificationApi> {
        self.inner.api.clone()
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Latest snapshot plus every subsequent one
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Run a read-only closure against the current state
    pub fn read<R>(&self, f: impl FnOnce(&FeedState) -> R) -> R {
        f(&self.inner.state.lock())
    }

    pub fn unread_count(&self) -> u32 {
        self.read(FeedState::unread_count)
    }

    pub fn items(&self) -> Vec<Notification> {
        self.read(|s| s.items().to_vec())
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.read(|s| s.contains(id))
    }

    pub fn is_loading(&self) -> bool {
        self.read(FeedState::is_loading)
    }

    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.read(FeedState::last_check_time)
    }

    // ------------------------------------------------------------------------
    // Local item operations
    // ------------------------------------------------------------------------

    /// Insert a record at the top of the feed. Returns `false` when the id
    /// is already present.
    pub fn add_notification(&self, notification: Notification) -> bool {
        let id = notification.id.clone();
        let added = self.mutate(|s| s.add(notification));
        if added {
            self.after_insert(&id);
        }
        added
    }

    /// Remove a record; idempotent
    pub fn remove_notification(&self, id: &NotificationId) -> Option<Notification> {
        let removed = self.mutate(|s| s.remove(id));
        if removed.is_some() {
            self.emit_removed(id);
        }
        removed
    }

    /// Apply a canonical push event
    pub fn apply(&self, event: CanonicalEvent) -> Applied {
        let kind = event.kind();
        let applied = self.mutate(|s| s.apply(event));

        match &applied {
            Applied::Added(id) => self.after_insert(id),
            Applied::Duplicate(id) => {
                debug!(notification_id = %id, "Duplicate push notification ignored");
            }
            Applied::Read(Some(removed)) => self.emit_removed(&removed.id),
            Applied::Read(None) => self.emit_counter(),
            Applied::Cleared(dropped) => {
                self.emit(StoreEvent::AllMarkedRead {
                    marked_count: *dropped as u64,
                });
                self.emit_counter();
            }
        }

        debug!(event = kind, unread_count = self.unread_count(), "Applied push event");
        applied
    }

    /// Merge an already fetched page
    pub fn merge(&self, page: bellsync_schemas::ListPage, page_no: u32, append: bool) -> MergeSummary {
        let summary = self.mutate(|s| s.merge(page, page_no, append, Utc::now()));
        self.emit(StoreEvent::Loaded {
            page: page_no,
            inserted: summary.inserted,
        });
        self.emit_counter();
        summary
    }

    /// Insert poll results that are newer than `cutoff` and not yet held.
    /// Returns how many were inserted.
    pub fn deliver_novel(&self, records: Vec<Notification>, cutoff: DateTime<Utc>) -> usize {
        let inserted: Vec<NotificationId> = self.mutate(|s| {
            s.novel(records, cutoff)
                .into_iter()
                .rev()
                .filter_map(|n| {
                    let id = n.id.clone();
                    s.add(n).then_some(id)
                })
                .collect()
        });

        for id in &inserted {
            self.after_insert(id);
        }
        inserted.len()
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Fresh load of the first page. A call while another load is running
    /// returns immediately.
    pub async fn load_notifications(&self) -> Result<()> {
        self.load_page(1, false).await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.load_notifications().await
    }

    /// Append the next page when the server reported more
    pub async fn load_more(&self) -> Result<()> {
        let next = self.read(|s| (s.has_more() && !s.is_loading()).then(|| s.current_page() + 1));
        match next {
            Some(page) => self.load_page(page, true).await,
            None => Ok(()),
        }
    }

    #[instrument(skip(self), fields(api = self.inner.api.name()))]
    async fn load_page(&self, page: u32, append: bool) -> Result<()> {
        if !self.mutate(FeedState::begin_loading) {
            debug!(page, "Load already in flight, skipping");
            return Ok(());
        }
        self.emit(StoreEvent::Loading);

        let query = self.inner.config.feed_query(page, self.inner.config.per_page);
        match self.inner.api.list(query).await {
            Ok(result) => {
                let summary = self.mutate(|s| {
                    let summary = s.merge(result, page, append, Utc::now());
                    s.finish_loading();
                    summary
                });
                debug!(
                    page,
                    inserted = summary.inserted,
                    preserved = summary.preserved,
                    "Merged notification page"
                );
                self.emit(StoreEvent::Loaded {
                    page,
                    inserted: summary.inserted,
                });
                self.emit_counter();
                Ok(())
            }
            Err(e) => {
                warn!(page, error = %e, "Failed to load notifications");
                let message = e.to_string();
                self.mutate(|s| {
                    s.set_error(message.clone());
                    s.finish_loading();
                });
                self.emit(StoreEvent::Error { message });
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Remote mutations
    // ------------------------------------------------------------------------

    /// Mark a held, unread record read.
    ///
    /// Returns `false` when the record is absent or already read. Local
    /// records never touch the network. A refused or failed remote call
    /// still removes the record locally.
    #[instrument(skip(self), fields(notification_id = %id))]
    pub async fn mark_as_read(&self, id: &NotificationId) -> bool {
        let eligible = self.read(|s| s.get(id).is_some_and(Notification::is_unread));
        if !eligible {
            return false;
        }

        let declared = if id.is_local() {
            None
        } else {
            match self.inner.api.mark_read(id).await {
                Ok(outcome) if outcome.success => outcome.unread_count,
                Ok(_) => {
                    warn!("Server refused mark-read, hiding locally");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Mark-read failed, hiding locally");
                    None
                }
            }
        };

        let removed = self.mutate(|s| s.complete_mark_read(id, declared));
        match removed {
            Some(_) => self.emit_removed(id),
            None => {
                debug!("Record already gone when mark-read completed");
                if declared.is_some() {
                    self.emit_counter();
                }
            }
        }
        true
    }

    /// Mark everything read. No network call when nothing held is unread.
    #[instrument(skip(self))]
    pub async fn mark_all_as_read(&self) -> Result<u64> {
        if self.read(FeedState::visible_unread) == 0 {
            return Ok(0);
        }

        let result = self
            .inner
            .api
            .mark_all_read(&MarkAllReadFilter::default())
            .await
            .and_then(|outcome| {
                if outcome.success {
                    Ok(outcome)
                } else {
                    Err(SyncError::network("mark-all-read was refused"))
                }
            });

        match result {
            Ok(outcome) => {
                let dropped = self.mutate(FeedState::complete_mark_all_read);
                info!(
                    marked_count = outcome.marked_count,
                    dropped, "Marked all notifications read"
                );
                self.emit(StoreEvent::AllMarkedRead {
                    marked_count: outcome.marked_count,
                });
                self.emit_counter();
                Ok(outcome.marked_count)
            }
            Err(e) => {
                warn!(error = %e, "Mark-all-read failed");
                let message = e.to_string();
                self.mutate(|s| s.set_error(message.clone()));
                self.emit(StoreEvent::Error { message });
                Err(e)
            }
        }
    }

    /// Delete a record. The local copy goes away even if the server call
    /// fails; the return value says whether the server confirmed.
    #[instrument(skip(self), fields(notification_id = %id))]
    pub async fn delete_notification(&self, id: &NotificationId) -> bool {
        let confirmed = if id.is_local() {
            true
        } else {
            match self.inner.api.delete(id).await {
                Ok(confirmed) => confirmed,
                Err(e) => {
                    warn!(error = %e, "Delete failed, removing locally");
                    false
                }
            }
        };

        self.remove_notification(id);
        confirmed
    }

    /// Delete every matching record on the server, drop the matching local
    /// copies and reload the first page.
    #[instrument(skip(self))]
    pub async fn delete_all(&self, filter: DeleteAllFilter) -> Result<u64> {
        let deleted = match self.inner.api.delete_all(&filter).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "Delete-all failed");
                let message = e.to_string();
                self.mutate(|s| s.set_error(message.clone()));
                self.emit(StoreEvent::Error { message });
                return Err(e);
            }
        };

        let removed = self.mutate(|s| s.remove_matching(&filter));
        for id in &removed {
            self.emit(StoreEvent::Removed {
                notification_id: id.clone(),
            });
        }
        self.emit_counter();
        info!(deleted, removed_locally = removed.len(), "Deleted notifications");

        self.load_notifications().await?;
        Ok(deleted)
    }

    // ------------------------------------------------------------------------
    // Panel state
    // ------------------------------------------------------------------------

    /// Open the feed; an empty feed triggers a load
    pub async fn open(&self) -> Result<()> {
        let empty = self.mutate(|s| {
            s.set_open(true);
            s.items().is_empty()
        });
        if empty {
            self.load_notifications().await?;
        }
        Ok(())
    }

    pub fn close(&self) {
        self.mutate(|s| s.set_open(false));
    }

    /// Flip the open flag; returns the new value
    pub async fn toggle(&self) -> Result<bool> {
        if self.read(FeedState::is_open) {
            self.close();
            Ok(false)
        } else {
            self.open().await?;
            Ok(true)
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn mutate<R>(&self, f: impl FnOnce(&mut FeedState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.inner.state.lock();
            let result = f(&mut state);
            (result, state.snapshot())
        };
        self.inner.snapshots.send_replace(snapshot);
        result
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    fn emit_counter(&self) {
        self.emit(StoreEvent::Changed {
            unread_count: self.unread_count(),
        });
    }

    fn emit_removed(&self, id: &NotificationId) {
        self.emit(StoreEvent::Removed {
            notification_id: id.clone(),
        });
        self.emit_counter();
    }

    fn after_insert(&self, id: &NotificationId) {
        if let Some(notification) = self.read(|s| s.get(id).cloned()) {
            self.emit(StoreEvent::Added { notification });
        }
        self.emit_counter();
        self.schedule_highlight_clear(id.clone());
    }

    fn schedule_highlight_clear(&self, id: NotificationId) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(notification_id = %id, "No runtime, highlight will not expire");
            return;
        };

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.config.new_highlight;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                NotificationStore { inner }.mutate(|s| s.clear_new_flag(&id));
            }
        });
    }
}
