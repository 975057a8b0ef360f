// Notification Record
//
// The record shared by every source: REST pages, poll ticks, push events and
// locally created entries. `is_new` and `source` are client-only and never
// cross the wire.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::action::NotificationAction;

/// Id prefix for notifications created locally (never persisted).
pub const LOCAL_ID_PREFIX: &str = "notif";

/// Id prefix for push events that arrived without an id.
pub const BROADCAST_ID_PREFIX: &str = "broadcast";

// ============================================================================
// NotificationId
// ============================================================================

/// Opaque notification identifier.
///
/// Server ids arrive as strings (UUIDs) or integers depending on the table
/// schema; both are normalized to their string form so that the same record
/// compares equal regardless of which source delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a client-side id in the given namespace, e.g. `notif-<uuid>`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, Uuid::new_v4().simple()))
    }

    /// Generate an id for a local, never-persisted notification
    pub fn local() -> Self {
        Self::generate(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for ids minted by [`NotificationId::local`].
    pub fn is_local(&self) -> bool {
        self.0
            .strip_prefix(LOCAL_ID_PREFIX)
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Read an id out of a JSON value (string or integer).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for NotificationId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            Int(i64),
            UInt(u64),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Str(s) => Self(s),
            Repr::Int(n) => Self(n.to_string()),
            Repr::UInt(n) => Self(n.to_string()),
        })
    }
}

// ============================================================================
// Source
// ============================================================================

/// Which source last produced or confirmed a record.
///
/// Only used to arbitrate a fresh page load: `Api` entries are replaced by
/// the new page, everything else is preserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Api,
    Broadcast,
    Local,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Api => write!(f, "api"),
            Source::Broadcast => write!(f, "broadcast"),
            Source::Local => write!(f, "local"),
        }
    }
}

// ============================================================================
// Notification
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub is_new: bool,
    #[serde(skip)]
    pub source: Source,
}

impl Notification {
    /// Minimal unread record; mostly useful for tests and fixtures.
    pub fn new(id: impl Into<NotificationId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            title: None,
            message: None,
            data: Map::new(),
            actions: Vec::new(),
            created_at: Utc::now(),
            read_at: None,
            is_new: false,
            source: Source::Api,
        }
    }

    /// Start building a local notification
    pub fn local() -> LocalNotificationBuilder {
        LocalNotificationBuilder::new()
    }

    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    pub fn is_local(&self) -> bool {
        self.source == Source::Local || self.id.is_local()
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_read_at(mut self, read_at: Option<DateTime<Utc>>) -> Self {
        self.read_at = read_at;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// String value of a `data` key, if present and non-empty
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// LocalNotificationBuilder
// ============================================================================

/// Fluent builder for client-made notifications.
///
/// ```
/// use bellsync_schemas::Notification;
///
/// let n = Notification::local()
///     .title("Post saved")
///     .message("Your post has been saved successfully")
///     .success()
///     .action_url("/posts/view/123")
///     .build();
///
/// assert!(n.id.is_local());
/// assert_eq!(n.kind, "success");
/// ```
#[derive(Debug, Clone)]
pub struct LocalNotificationBuilder {
    inner: Notification,
}

impl LocalNotificationBuilder {
    fn new() -> Self {
        let mut inner = Notification::new(NotificationId::local(), "");
        inner.source = Source::Local;
        Self { inner }
    }

    pub fn id(mut self, id: impl Into<NotificationId>) -> Self {
        self.inner.id = id.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.inner.title = Some(title.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.inner.message = Some(message.into());
        self
    }

    pub fn body(self, body: impl Into<String>) -> Self {
        self.message(body)
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.inner.kind = kind.into();
        self
    }

    pub fn icon(self, icon: impl Into<String>) -> Self {
        self.data("icon", Value::String(icon.into()))
    }

    pub fn icon_class(self, class: impl Into<String>) -> Self {
        self.data("icon_class", Value::String(class.into()))
    }

    pub fn action_url(self, url: impl Into<String>) -> Self {
        self.data("action_url", Value::String(url.into()))
    }

    pub fn actions(mut self, actions: Vec<NotificationAction>) -> Self {
        self.inner.actions = actions;
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inner.data.insert(key.into(), value);
        self
    }

    pub fn success(self) -> Self {
        self.kind("success").icon("check")
    }

    pub fn warning(self) -> Self {
        self.kind("warning").icon("alert")
    }

    pub fn danger(self) -> Self {
        self.kind("danger").icon("alert")
    }

    pub fn error(self) -> Self {
        self.danger()
    }

    pub fn info(self) -> Self {
        self.kind("info").icon("info")
    }

    pub fn build(self) -> Notification {
        self.inner
    }
}
