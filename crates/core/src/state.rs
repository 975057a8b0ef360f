// Feed State
//
// The pure reconciliation core. Every rule about how the item list and the
// unread counter move lives here; `NotificationStore` only adds locking,
// networking and change notification on top.
//
// Counter policy: an explicit server-declared count always wins and is
// adopted verbatim (zero included). Without one, the counter moves by one
// only when an unread item was actually removed from or added to the list.
// The two are never combined for the same unit.

use std::collections::HashSet;

use bellsync_schemas::{
    CanonicalEvent, DeleteAllFilter, ListPage, Notification, NotificationId, Source,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of applying a canonical push event
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// A new record was inserted
    Added(NotificationId),
    /// The record was already present
    Duplicate(NotificationId),
    /// A read event was processed; carries the record if it was held locally
    Read(Option<Notification>),
    /// The feed was cleared; carries how many records were dropped
    Cleared(usize),
}

/// What a page merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub preserved: usize,
    pub evicted: usize,
}

/// Read-only view handed to presentation layers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub items: Vec<Notification>,
    pub unread_count: u32,
    pub is_loading: bool,
    pub current_page: u32,
    pub has_more: bool,
    pub is_open: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedState {
    items: Vec<Notification>,
    unread_count: u32,
    is_loading: bool,
    current_page: u32,
    has_more: bool,
    is_open: bool,
    last_check_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl FeedState {
    pub fn new() -> Self {
        Self {
            current_page: 1,
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Newest first
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Baseline for the poll scheduler's novelty cutoff
    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.last_check_time
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.get(id).is_some()
    }

    /// Unread records currently held; the counter's fallback truth
    pub fn visible_unread(&self) -> u32 {
        let count = self.items.iter().filter(|n| n.is_unread()).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            items: self.items.clone(),
            unread_count: self.unread_count,
            is_loading: self.is_loading,
            current_page: self.current_page,
            has_more: self.has_more,
            is_open: self.is_open,
            error: self.last_error.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Item operations
    // ------------------------------------------------------------------------

    /// Insert at the top. Returns `false` (and changes nothing) when the id
    /// is already present.
    pub fn add(&mut self, mut notification: Notification) -> bool {
        if self.contains(&notification.id) {
            return false;
        }

        notification.is_new = true;
        if notification.is_unread() {
            self.unread_count = self.unread_count.saturating_add(1);
        }
        self.items.insert(0, notification);
        true
    }

    /// Remove a record, decrementing the counter if it was unread.
    /// Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &NotificationId) -> Option<Notification> {
        let removed = self.take(id)?;
        if removed.is_unread() {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        Some(removed)
    }

    /// Finish a mark-read (remote confirmation, refusal or local fallback).
    ///
    /// The record is dropped if still present. `declared` is the server's
    /// count when the response carried one.
    pub fn complete_mark_read(
        &mut self,
        id: &NotificationId,
        declared: Option<u32>,
    ) -> Option<Notification> {
        let removed = self.take(id);
        self.settle_counter(removed.as_ref(), declared);
        removed
    }

    /// Finish a successful mark-all-read: keep only read records.
    pub fn complete_mark_all_read(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|n| !n.is_unread());
        self.unread_count = 0;
        before - self.items.len()
    }

    /// Drop everything; adopt the declared count or zero.
    pub fn clear(&mut self, declared: Option<u32>) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        self.unread_count = declared.unwrap_or(0);
        dropped
    }

    /// Remove every record a delete-all filter would hit
    pub fn remove_matching(&mut self, filter: &DeleteAllFilter) -> Vec<NotificationId> {
        let ids: Vec<NotificationId> = self
            .items
            .iter()
            .filter(|n| filter.matches(n))
            .map(|n| n.id.clone())
            .collect();
        for id in &ids {
            self.remove(id);
        }
        ids
    }

    /// Clear the highlight flag; `false` if the record is gone
    pub fn clear_new_flag(&mut self, id: &NotificationId) -> bool {
        match self.items.iter_mut().find(|n| &n.id == id) {
            Some(n) => {
                n.is_new = false;
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Page merge
    // ------------------------------------------------------------------------

    /// Merge a fetched page.
    ///
    /// `append` (load more) concatenates after the held records. A fresh load
    /// keeps every non-API record, replaces API records with the page, and
    /// lets preserved records win id collisions: a stale page must not
    /// resurrect what a push event or local action already changed.
    pub fn merge(
        &mut self,
        page: ListPage,
        page_no: u32,
        append: bool,
        now: DateTime<Utc>,
    ) -> MergeSummary {
        let ListPage {
            items,
            has_more,
            unread_count,
            ..
        } = page;

        let mut summary = MergeSummary::default();

        if append {
            let mut seen: HashSet<NotificationId> =
                self.items.iter().map(|n| n.id.clone()).collect();
            for mut incoming in items {
                if seen.insert(incoming.id.clone()) {
                    incoming.source = Source::Api;
                    self.items.push(incoming);
                    summary.inserted += 1;
                }
            }
            if let Some(count) = unread_count {
                self.unread_count = count;
            }
        } else {
            let before = self.items.len();
            let mut kept: Vec<Notification> = std::mem::take(&mut self.items)
                .into_iter()
                .filter(|n| n.source != Source::Api)
                .collect();
            summary.preserved = kept.len();
            summary.evicted = before - kept.len();

            let mut seen: HashSet<NotificationId> = kept.iter().map(|n| n.id.clone()).collect();
            for mut incoming in items {
                if seen.insert(incoming.id.clone()) {
                    incoming.source = Source::Api;
                    kept.push(incoming);
                    summary.inserted += 1;
                }
            }

            self.items = kept;
            self.last_check_time = Some(now);
            self.unread_count = unread_count.unwrap_or_else(|| self.visible_unread());
        }

        self.current_page = page_no.max(1);
        self.has_more = has_more;
        self.last_error = None;
        summary
    }

    /// Records from a poll window that are genuinely new: created strictly
    /// after the cutoff and not already held.
    pub fn novel(&self, records: Vec<Notification>, cutoff: DateTime<Utc>) -> Vec<Notification> {
        let mut seen: HashSet<NotificationId> = self.items.iter().map(|n| n.id.clone()).collect();
        records
            .into_iter()
            .filter(|n| n.created_at > cutoff)
            .filter(|n| seen.insert(n.id.clone()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Push events
    // ------------------------------------------------------------------------

    pub fn apply(&mut self, event: CanonicalEvent) -> Applied {
        match event {
            CanonicalEvent::ItemCreated { notification } => {
                let id = notification.id.clone();
                if self.add(notification.with_source(Source::Broadcast)) {
                    Applied::Added(id)
                } else {
                    Applied::Duplicate(id)
                }
            }
            CanonicalEvent::ItemRead {
                notification_id,
                unread_count,
            } => Applied::Read(self.complete_mark_read(&notification_id, unread_count)),
            CanonicalEvent::AllRead { unread_count } => Applied::Cleared(self.clear(unread_count)),
        }
    }

    // ------------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------------

    /// Claim the loading flag; `false` if a load is already running
    pub fn begin_loading(&mut self) -> bool {
        if self.is_loading {
            return false;
        }
        self.is_loading = true;
        true
    }

    pub fn finish_loading(&mut self) {
        self.is_loading = false;
    }

    pub fn set_open(&mut self, open: bool) {
        self.is_open = open;
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn take(&mut self, id: &NotificationId) -> Option<Notification> {
        let index = self.items.iter().position(|n| &n.id == id)?;
        Some(self.items.remove(index))
    }

    fn settle_counter(&mut self, removed: Option<&Notification>, declared: Option<u32>) {
        match declared {
            Some(count) => self.unread_count = count,
            None => {
                if removed.is_some_and(Notification::is_unread) {
                    self.unread_count = self.unread_count.saturating_sub(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn unread(id: &str) -> Notification {
        Notification::new(id, "info")
    }

    fn read(id: &str) -> Notification {
        Notification::new(id, "info").with_read_at(Some(Utc::now()))
    }

    fn id(s: &str) -> NotificationId {
        NotificationId::from(s)
    }

    fn two_unread() -> FeedState {
        let mut state = FeedState::new();
        state.add(unread("2"));
        state.add(unread("1"));
        assert_eq!(state.unread_count(), 2);
        state
    }

    #[test]
    fn test_add_prepends_and_counts() {
        let mut state = FeedState::new();
        assert!(state.add(unread("a")));
        assert!(state.add(unread("b")));
        assert!(state.add(read("c")));

        let ids: Vec<&str> = state.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(state.unread_count(), 2);
        assert!(state.items().iter().all(|n| n.is_new));
    }

    #[test]
    fn test_add_duplicate_is_noop() {
        let mut state = FeedState::new();
        state.add(unread("a"));
        assert!(!state.add(unread("a")));
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.unread_count(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut state = two_unread();
        assert!(state.remove(&id("1")).is_some());
        assert_eq!(state.unread_count(), 1);
        assert!(state.remove(&id("1")).is_none());
        assert_eq!(state.unread_count(), 1);
        assert_eq!(state.items().len(), 1);
    }

    #[test]
    fn test_remove_read_item_keeps_counter() {
        let mut state = FeedState::new();
        state.add(read("r"));
        state.add(unread("u"));
        state.remove(&id("r"));
        assert_eq!(state.unread_count(), 1);
    }

    #[test]
    fn test_item_read_with_declared_count() {
        let mut state = two_unread();
        state.apply(CanonicalEvent::ItemRead {
            notification_id: id("1"),
            unread_count: Some(1),
        });
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.items()[0].id.as_str(), "2");
        assert_eq!(state.unread_count(), 1);
    }

    #[test]
    fn test_item_read_without_count_falls_back() {
        let mut state = two_unread();
        state.apply(CanonicalEvent::ItemRead {
            notification_id: id("1"),
            unread_count: None,
        });
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.unread_count(), 1);
    }

    #[test]
    fn test_item_read_zero_is_adopted() {
        let mut state = FeedState::new();
        state.add(unread("1"));
        state.add(unread("2"));
        state.add(unread("3"));
        state.apply(CanonicalEvent::ItemRead {
            notification_id: id("1"),
            unread_count: Some(0),
        });
        assert_eq!(state.unread_count(), 0);
        assert_eq!(state.items().len(), 2);
    }

    #[test]
    fn test_item_read_for_unknown_id_without_count_keeps_counter() {
        let mut state = two_unread();
        let applied = state.apply(CanonicalEvent::ItemRead {
            notification_id: id("404"),
            unread_count: None,
        });
        assert_eq!(applied, Applied::Read(None));
        assert_eq!(state.unread_count(), 2);
    }

    #[test]
    fn test_item_read_for_unknown_id_adopts_count() {
        let mut state = two_unread();
        state.apply(CanonicalEvent::ItemRead {
            notification_id: id("not-paged-in"),
            unread_count: Some(7),
        });
        assert_eq!(state.unread_count(), 7);
        assert_eq!(state.items().len(), 2);
    }

    #[test]
    fn test_all_read_clears() {
        let mut state = two_unread();
        state.apply(CanonicalEvent::AllRead { unread_count: None });
        assert!(state.items().is_empty());
        assert_eq!(state.unread_count(), 0);

        let mut state = two_unread();
        state.apply(CanonicalEvent::AllRead {
            unread_count: Some(3),
        });
        assert_eq!(state.unread_count(), 3);
    }

    #[test]
    fn test_created_event_is_broadcast_sourced() {
        let mut state = FeedState::new();
        let applied = state.apply(CanonicalEvent::ItemCreated {
            notification: unread("x"),
        });
        assert_eq!(applied, Applied::Added(id("x")));
        assert_eq!(state.items()[0].source, Source::Broadcast);

        let again = state.apply(CanonicalEvent::ItemCreated {
            notification: unread("x"),
        });
        assert_eq!(again, Applied::Duplicate(id("x")));
        assert_eq!(state.unread_count(), 1);
    }

    #[test]
    fn test_late_mark_read_after_push_does_not_double_decrement() {
        let mut state = two_unread();
        // another client read it; the push arrived first
        state.apply(CanonicalEvent::ItemRead {
            notification_id: id("1"),
            unread_count: None,
        });
        assert_eq!(state.unread_count(), 1);

        // our own request completes afterwards
        let removed = state.complete_mark_read(&id("1"), None);
        assert!(removed.is_none());
        assert_eq!(state.unread_count(), 1);
    }

    #[test]
    fn test_complete_mark_all_read_keeps_read_items() {
        let mut state = FeedState::new();
        state.add(read("r"));
        state.add(unread("u1"));
        state.add(unread("u2"));
        assert_eq!(state.complete_mark_all_read(), 2);
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.unread_count(), 0);
    }

    #[test]
    fn test_fresh_merge_preserves_non_api_items() {
        let mut state = FeedState::new();
        state.merge(
            ListPage::new(vec![unread("a1"), unread("a2")]).with_unread_count(2),
            1,
            false,
            Utc::now(),
        );
        state.add(unread("pushed").with_source(Source::Broadcast));
        state.add(unread("mine").with_source(Source::Local));

        let summary = state.merge(
            ListPage::new(vec![unread("a3"), unread("pushed")]).with_unread_count(5),
            1,
            false,
            Utc::now(),
        );

        let ids: Vec<&str> = state.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["mine", "pushed", "a3"]);
        assert_eq!(
            state.get(&id("pushed")).map(|n| n.source),
            Some(Source::Broadcast)
        );
        assert_eq!(summary.evicted, 2);
        assert_eq!(summary.preserved, 2);
        assert_eq!(summary.inserted, 1);
        assert_eq!(state.unread_count(), 5);
        assert!(state.last_check_time().is_some());
    }

    #[test]
    fn test_fresh_merge_without_count_recomputes() {
        let mut state = FeedState::new();
        state.add(unread("local").with_source(Source::Local));
        state.merge(
            ListPage::new(vec![unread("a"), read("b")]),
            1,
            false,
            Utc::now(),
        );
        assert_eq!(state.unread_count(), 2);
    }

    #[test]
    fn test_append_merge_concatenates() {
        let mut state = FeedState::new();
        state.merge(
            ListPage::new(vec![unread("1"), unread("2")])
                .with_unread_count(4)
                .with_has_more(true),
            1,
            false,
            Utc::now(),
        );
        state.merge(
            ListPage::new(vec![unread("3"), unread("4")]).with_unread_count(4),
            2,
            true,
            Utc::now(),
        );

        let ids: Vec<&str> = state.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(state.current_page(), 2);
        assert!(!state.has_more());
        assert_eq!(state.unread_count(), 4);
    }

    #[test]
    fn test_novel_filters_by_cutoff_and_id() {
        let cutoff = Utc::now();
        let mut state = FeedState::new();
        state.add(unread("known").with_created_at(cutoff + Duration::seconds(5)));

        let records = vec![
            unread("old").with_created_at(cutoff - Duration::seconds(10)),
            unread("at-cutoff").with_created_at(cutoff),
            unread("known").with_created_at(cutoff + Duration::seconds(5)),
            unread("fresh").with_created_at(cutoff + Duration::seconds(1)),
            unread("fresh").with_created_at(cutoff + Duration::seconds(1)),
        ];

        let novel = state.novel(records, cutoff);
        let ids: Vec<&str> = novel.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh"]);
    }

    #[test]
    fn test_remove_matching() {
        let mut state = FeedState::new();
        state.add(read("r"));
        state.add(unread("u"));
        let removed = state.remove_matching(&DeleteAllFilter {
            status: Some(bellsync_schemas::StatusFilter::Unread),
            before: None,
        });
        assert_eq!(removed, vec![id("u")]);
        assert_eq!(state.unread_count(), 0);
        assert_eq!(state.items().len(), 1);
    }

    #[test]
    fn test_loading_flag_is_exclusive() {
        let mut state = FeedState::new();
        assert!(state.begin_loading());
        assert!(!state.begin_loading());
        state.finish_loading();
        assert!(state.begin_loading());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add { id: u8, unread: bool },
            Remove { id: u8 },
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..8, any::<bool>()).prop_map(|(id, unread)| Op::Add { id, unread }),
                (0u8..8).prop_map(|id| Op::Remove { id }),
            ]
        }

        fn record(id: u8, unread: bool) -> Notification {
            let n = Notification::new(NotificationId::from(u64::from(id)), "info");
            if unread {
                n
            } else {
                n.with_read_at(Some(Utc::now()))
            }
        }

        proptest! {
            #[test]
            fn counter_matches_unread_items(ops in proptest::collection::vec(op(), 0..64)) {
                let mut state = FeedState::new();
                for op in ops {
                    match op {
                        Op::Add { id, unread } => { state.add(record(id, unread)); }
                        Op::Remove { id } => { state.remove(&NotificationId::from(u64::from(id))); }
                    }
                    prop_assert_eq!(state.unread_count(), state.visible_unread());
                }
            }

            #[test]
            fn remove_twice_changes_once(ids in proptest::collection::vec(0u8..8, 1..8), target in 0u8..8) {
                let mut state = FeedState::new();
                for id in ids {
                    state.add(record(id, true));
                }
                let target = NotificationId::from(u64::from(target));
                state.remove(&target);
                let (len, count) = (state.items().len(), state.unread_count());
                state.remove(&target);
                prop_assert_eq!(state.items().len(), len);
                prop_assert_eq!(state.unread_count(), count);
            }

            #[test]
            fn duplicate_add_is_noop(id in 0u8..8, unread in any::<bool>()) {
                let mut state = FeedState::new();
                state.add(record(id, unread));
                let (len, count) = (state.items().len(), state.unread_count());
                state.add(record(id, true));
                prop_assert_eq!(state.items().len(), len);
                prop_assert_eq!(state.unread_count(), count);
            }

            #[test]
            fn fresh_merge_never_evicts_pushed_items(
                pushed in proptest::collection::hash_set(0u8..16, 0..6),
                page in proptest::collection::hash_set(16u8..32, 0..6),
            ) {
                let mut state = FeedState::new();
                for id in &pushed {
                    state.add(record(*id, true).with_source(Source::Broadcast));
                }
                let incoming = page.iter().map(|id| record(*id, true)).collect();
                state.merge(ListPage::new(incoming), 1, false, Utc::now());
                for id in &pushed {
                    prop_assert!(state.contains(&NotificationId::from(u64::from(*id))));
                }
            }
        }
    }
}
