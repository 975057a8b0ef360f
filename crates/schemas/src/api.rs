// REST wire types
//
// Request/response shapes of the notification CRUD endpoints, plus the
// normalized results the Fetch Client hands to the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notification::{Notification, NotificationId};

// ============================================================================
// Filters & queries
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Unread,
    Read,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Unread => "unread",
            StatusFilter::Read => "read",
        }
    }

    /// Whether a record with the given read state falls under this filter
    pub fn matches(&self, unread: bool) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Unread => unread,
            StatusFilter::Read => !unread,
        }
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(StatusFilter::All),
            "unread" => Ok(StatusFilter::Unread),
            "read" => Ok(StatusFilter::Read),
            other => Err(format!("unknown status filter '{}'", other)),
        }
    }
}

/// Query for one page of the notification list
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub status: StatusFilter,
    pub kind: Option<String>,
}

impl ListQuery {
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
            status: StatusFilter::All,
            kind: None,
        }
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Query-string pairs for the list endpoint
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if self.status != StatusFilter::All {
            pairs.push(("status", self.status.as_str().to_string()));
        }
        if let Some(kind) = &self.kind {
            pairs.push(("type", kind.clone()));
        }
        pairs
    }
}

/// Body of `PATCH mark-all-read`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkAllReadFilter {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
}

/// Body of `DELETE all`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteAllFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
}

impl DeleteAllFilter {
    /// Whether a locally held record would be deleted by this filter
    pub fn matches(&self, notification: &Notification) -> bool {
        let status_ok = self
            .status
            .unwrap_or_default()
            .matches(notification.is_unread());
        let before_ok = self
            .before
            .map_or(true, |before| notification.created_at < before);
        status_ok && before_ok
    }
}

// ============================================================================
// Responses
// ============================================================================

/// A list item as the server sends it. Everything is optional; see
/// `normalize::from_api`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawNotification {
    #[serde(default)]
    pub id: Option<NotificationId>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub actions: Option<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub read_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub has_prev_page: bool,
}

/// `meta` block of list responses. The full index reports `unread_count`,
/// the unread-only endpoint reports `count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub showing: Option<u32>,
}

impl ListMeta {
    pub fn declared_unread(&self) -> Option<u32> {
        self.unread_count.or(self.count)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<RawNotification>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub meta: Option<ListMeta>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkReadData {
    #[serde(default)]
    pub id: Option<NotificationId>,
    #[serde(default)]
    pub read_at: Option<String>,
    #[serde(default)]
    pub unread_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkReadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<MarkReadData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkAllReadData {
    #[serde(default)]
    pub marked_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<MarkAllReadData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteAllData {
    #[serde(default)]
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteAllResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<DeleteAllData>,
}

/// Error body: `{success: false, message, code}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

// ============================================================================
// Normalized results
// ============================================================================

/// One normalized page of the notification list
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListPage {
    pub items: Vec<Notification>,
    pub has_more: bool,
    /// Server-declared unread total, when the response carried one
    pub unread_count: Option<u32>,
    pub pagination: Option<Pagination>,
}

impl ListPage {
    pub fn new(items: Vec<Notification>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn with_unread_count(mut self, count: u32) -> Self {
        self.unread_count = Some(count);
        self
    }

    pub fn with_has_more(mut self, has_more: bool) -> Self {
        self.has_more = has_more;
        self
    }
}

/// Result of a mark-read call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkReadOutcome {
    pub success: bool,
    /// Server-declared unread total after the update, if reported
    pub unread_count: Option<u32>,
}

impl MarkReadOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            unread_count: None,
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn with_unread_count(mut self, count: u32) -> Self {
        self.unread_count = Some(count);
        self
    }
}

/// Result of a mark-all-read call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkAllOutcome {
    pub success: bool,
    pub marked_count: u64,
}
