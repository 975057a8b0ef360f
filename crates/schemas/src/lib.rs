// Bellsync Schemas
//
// Decision: This crate is the source of truth for all shared data structures
// Decision: Minimal dependencies - only serde, uuid, chrono, thiserror
// Decision: Normalization and display mapping live here as pure functions so
//           the HTTP client and every push backend share one implementation

pub mod action;
pub mod api;
pub mod display;
pub mod events;
pub mod normalize;
pub mod notification;

// Re-exports for convenience
pub use action::NotificationAction;

pub use api::{
    ApiErrorBody, DeleteAllFilter, DeleteAllResponse, ListMeta, ListPage, ListQuery, ListResponse,
    MarkAllOutcome, MarkAllReadFilter, MarkAllReadResponse, MarkReadOutcome, MarkReadResponse,
    Pagination, RawNotification, StatusFilter,
};

pub use events::{
    CanonicalEvent, DecodeError, RawPayload, NOTIFICATION_CREATED, NOTIFICATION_MARKED_ALL_READ,
    NOTIFICATION_MARKED_READ,
};

pub use notification::{
    LocalNotificationBuilder, Notification, NotificationId, Source, BROADCAST_ID_PREFIX,
    LOCAL_ID_PREFIX,
};
