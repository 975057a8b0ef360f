// Canonical push events
//
// Every push backend (WebSocket pub/sub, SSE hub, ...) delivers events as a
// name plus a payload that may or may not already be decoded. This module
// turns that pair into one transport-agnostic `CanonicalEvent`.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::normalize;
use crate::notification::{Notification, NotificationId};

// ============================================================================
// Event Name Constants
// ============================================================================

pub const NOTIFICATION_CREATED: &str = "notification.created";
pub const NOTIFICATION_MARKED_READ: &str = "notification.marked-read";
pub const NOTIFICATION_MARKED_ALL_READ: &str = "notification.marked-all-read";

// ============================================================================
// Raw payload
// ============================================================================

/// Event body as received from a backend
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Serialized JSON (most pub/sub protocols double-encode `data`)
    Text(String),
    /// Already-decoded JSON
    Json(Value),
}

impl From<&str> for RawPayload {
    fn from(s: &str) -> Self {
        RawPayload::Text(s.to_string())
    }
}

impl From<String> for RawPayload {
    fn from(s: String) -> Self {
        RawPayload::Text(s)
    }
}

impl From<Value> for RawPayload {
    fn from(v: Value) -> Self {
        RawPayload::Json(v)
    }
}

impl RawPayload {
    /// Decode into a JSON value. A string that itself holds JSON is unwrapped
    /// once more, since some brokers wrap the payload twice.
    pub fn into_value(self) -> Result<Value, DecodeError> {
        let value = match self {
            RawPayload::Text(text) => serde_json::from_str::<Value>(&text)?,
            RawPayload::Json(value) => value,
        };

        match value {
            Value::String(inner) => Ok(serde_json::from_str::<Value>(&inner)?),
            other => Ok(other),
        }
    }
}

/// Malformed push payload. Never fatal: the caller logs and drops it.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload for '{event}' is not a JSON object")]
    NotAnObject { event: String },

    #[error("payload for '{event}' is missing '{field}'")]
    MissingField { event: String, field: &'static str },
}

// ============================================================================
// CanonicalEvent
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CanonicalEvent {
    /// A new notification for this owner
    ItemCreated { notification: Notification },

    /// One notification was read somewhere (possibly another client)
    ItemRead {
        notification_id: NotificationId,
        unread_count: Option<u32>,
    },

    /// Everything was marked read
    AllRead { unread_count: Option<u32> },
}

impl CanonicalEvent {
    /// Build a canonical event from a backend event name and payload.
    ///
    /// ```
    /// use bellsync_schemas::{CanonicalEvent, RawPayload};
    ///
    /// let event = CanonicalEvent::decode(
    ///     "notification.marked-read",
    ///     RawPayload::from(r#"{"notification_id": 1, "unread_count": 0}"#),
    /// )
    /// .unwrap();
    ///
    /// assert!(matches!(event, CanonicalEvent::ItemRead { unread_count: Some(0), .. }));
    /// ```
    pub fn decode(name: &str, payload: RawPayload) -> Result<Self, DecodeError> {
        let value = payload.into_value()?;
        let Value::Object(body) = value else {
            return Err(DecodeError::NotAnObject {
                event: name.to_string(),
            });
        };

        match name {
            NOTIFICATION_MARKED_READ => {
                let notification_id = body
                    .get("notification_id")
                    .and_then(NotificationId::from_value)
                    .ok_or_else(|| DecodeError::MissingField {
                        event: name.to_string(),
                        field: "notification_id",
                    })?;
                Ok(CanonicalEvent::ItemRead {
                    notification_id,
                    unread_count: declared_count(&body),
                })
            }
            NOTIFICATION_MARKED_ALL_READ => Ok(CanonicalEvent::AllRead {
                unread_count: declared_count(&body),
            }),
            _ => Ok(CanonicalEvent::ItemCreated {
                notification: normalize::from_broadcast(name, &body),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CanonicalEvent::ItemCreated { .. } => "item-created",
            CanonicalEvent::ItemRead { .. } => "item-read",
            CanonicalEvent::AllRead { .. } => "all-read",
        }
    }
}

/// `unread_count` is present only when it is a non-negative whole number.
/// Zero counts as present.
fn declared_count(body: &Map<String, Value>) -> Option<u32> {
    let value = body.get("unread_count")?;
    let count = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })?;
    u32::try_from(count).ok()
}
