// Notification endpoints
//
// Typed calls against the notification routes. Every record is normalized
// with `normalize::from_api` before it leaves this module.

use async_trait::async_trait;
use bellsync_core::{NotificationApi, Result as SyncResult, SyncConfig};
use bellsync_schemas::{
    normalize, DeleteAllFilter, DeleteAllResponse, ListPage, ListQuery, ListResponse,
    MarkAllOutcome, MarkAllReadFilter, MarkAllReadResponse, MarkReadOutcome, MarkReadResponse,
    NotificationId, StatusFilter,
};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::client::{ClientError, HttpClient};

/// Bare `{success}` acknowledgement
#[derive(Debug, Default, Deserialize)]
struct Ack {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotificationsClient {
    http: HttpClient,
}

impl NotificationsClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ClientError> {
        Ok(Self::new(HttpClient::from_config(config)?))
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// One page of notifications. The unread filter uses the dedicated
    /// unread endpoint, which reports its total as `meta.count`.
    #[instrument(skip(self), fields(page = query.page, limit = query.limit))]
    pub async fn fetch_page(&self, query: &ListQuery) -> Result<ListPage, ClientError> {
        let path = match query.status {
            StatusFilter::Unread => "/notifications/unread.json",
            _ => "/notifications.json",
        };
        let mut pairs = query.to_query_pairs();
        if query.status == StatusFilter::Unread {
            pairs.retain(|(key, _)| *key != "status");
        }

        let response: ListResponse = self.http.get(path, &pairs).await?;
        if !response.success {
            return Err(ClientError::Api {
                status: 200,
                message: response
                    .message
                    .unwrap_or_else(|| "Failed to load notifications".to_string()),
            });
        }

        let received = response.data.len();
        let items: Vec<_> = response
            .data
            .into_iter()
            .filter_map(normalize::from_api)
            .collect();
        if items.len() != received {
            warn!(
                dropped = received - items.len(),
                "Dropped notifications without an id"
            );
        }

        let has_more = response
            .pagination
            .as_ref()
            .map(|p| p.has_next_page || p.current_page < p.total_pages)
            .unwrap_or(false);

        Ok(ListPage {
            items,
            has_more,
            unread_count: response.meta.as_ref().and_then(|m| m.declared_unread()),
            pagination: response.pagination,
        })
    }

    /// Mark one notification read, distinguishing refusal reasons.
    ///
    /// Returns `ClientError::NotFound` for unknown or foreign ids and
    /// `ClientError::Api` for other non-2xx answers.
    #[instrument(skip(self), fields(notification_id = %id))]
    pub async fn mark_read_strict(&self, id: &NotificationId) -> Result<MarkReadOutcome, ClientError> {
        let path = format!("/notifications/{}/read.json", encode_segment(id.as_str()));
        let response: MarkReadResponse = self.http.patch::<_, ()>(&path, None).await?;

        let unread_count = response.data.and_then(|d| d.unread_count);
        Ok(MarkReadOutcome {
            success: response.success,
            unread_count,
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_all_read_filtered(
        &self,
        filter: &MarkAllReadFilter,
    ) -> Result<MarkAllOutcome, ClientError> {
        let response: MarkAllReadResponse = self
            .http
            .patch("/notifications/mark-all-read.json", Some(filter))
            .await?;

        Ok(MarkAllOutcome {
            success: response.success,
            marked_count: response.data.map(|d| d.marked_count).unwrap_or(0),
        })
    }

    #[instrument(skip(self), fields(notification_id = %id))]
    pub async fn delete_one(&self, id: &NotificationId) -> Result<bool, ClientError> {
        let path = format!("/notifications/{}.json", encode_segment(id.as_str()));
        let ack: Ack = self.http.delete::<_, ()>(&path, None).await?;
        if !ack.success {
            debug!(message = ?ack.message, "Delete refused");
        }
        Ok(ack.success)
    }

    #[instrument(skip(self))]
    pub async fn delete_matching(&self, filter: &DeleteAllFilter) -> Result<u64, ClientError> {
        let response: DeleteAllResponse =
            self.http.delete("/notifications.json", Some(filter)).await?;

        if !response.success {
            return Err(ClientError::Api {
                status: 200,
                message: response
                    .message
                    .unwrap_or_else(|| "Failed to delete notifications".to_string()),
            });
        }
        Ok(response.data.map(|d| d.deleted_count).unwrap_or(0))
    }
}

#[async_trait]
impl NotificationApi for NotificationsClient {
    async fn list(&self, query: ListQuery) -> SyncResult<ListPage> {
        Ok(self.fetch_page(&query).await?)
    }

    async fn mark_read(&self, id: &NotificationId) -> SyncResult<MarkReadOutcome> {
        match self.mark_read_strict(id).await {
            Ok(outcome) => Ok(outcome),
            Err(ClientError::NotFound) => {
                debug!(notification_id = %id, "Mark-read target not found");
                Ok(MarkReadOutcome::failed())
            }
            Err(ClientError::Api { status, message }) => {
                debug!(notification_id = %id, status, %message, "Mark-read refused");
                Ok(MarkReadOutcome::failed())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_all_read(&self, filter: &MarkAllReadFilter) -> SyncResult<MarkAllOutcome> {
        Ok(self.mark_all_read_filtered(filter).await?)
    }

    async fn delete(&self, id: &NotificationId) -> SyncResult<bool> {
        match self.delete_one(id).await {
            Ok(confirmed) => Ok(confirmed),
            Err(ClientError::NotFound) | Err(ClientError::Api { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self, filter: &DeleteAllFilter) -> SyncResult<u64> {
        Ok(self.delete_matching(filter).await?)
    }

    fn name(&self) -> &'static str {
        "NotificationsClient"
    }
}

/// Percent-encode an id for use as a single path segment
fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
