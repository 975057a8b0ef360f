// Record normalization
//
// Turns loosely-shaped payloads (REST list items, push event bodies) into
// `Notification` values. Every key is read defensively: servers and
// broadcasters disagree on snake_case vs camelCase and on whether extra
// fields live at the top level or under `data`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::action::parse_actions;
use crate::api::RawNotification;
use crate::notification::{Notification, NotificationId, Source, BROADCAST_ID_PREFIX};

/// Parse a server timestamp.
///
/// Accepts RFC 3339 (`2024-01-01T10:00:00+00:00`) and the bare SQL form
/// (`2024-01-01 10:00:00`, read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Infer an icon hint from the notification type.
pub fn infer_icon(kind: &str) -> Option<&'static str> {
    let kind = kind.to_ascii_lowercase();
    let last = kind
        .rsplit(|c| c == '\\' || c == '.' || c == '/')
        .next()
        .unwrap_or(&kind);

    match last {
        "success" => return Some("check"),
        "warning" | "danger" | "error" => return Some("alert"),
        "info" => return Some("info"),
        _ => {}
    }

    if last.contains("message") || last.contains("comment") {
        Some("message")
    } else if last.contains("user") || last.contains("follow") {
        Some("user")
    } else if last.contains("post") {
        Some("post")
    } else if last.contains("alert") || last.contains("error") || last.contains("fail") {
        Some("alert")
    } else {
        None
    }
}

/// Normalize a REST list item.
///
/// Returns `None` for records without an id: they cannot be reconciled
/// against any other source.
pub fn from_api(raw: RawNotification) -> Option<Notification> {
    let id = raw.id?;
    let kind = raw.kind.unwrap_or_default();
    let mut data = object_or_decoded(raw.data.as_ref());

    let actions = match raw.actions.as_ref() {
        Some(value) if value.as_array().is_some_and(|a| !a.is_empty()) => parse_actions(value),
        _ => data.get("actions").map(parse_actions).unwrap_or_default(),
    };

    if !has_str(&data, "icon") && !has_str(&data, "icon_class") {
        if let Some(icon) = infer_icon(&kind) {
            data.insert("icon".to_string(), Value::String(icon.to_string()));
        }
    }

    let created_at = raw
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| raw.created.as_deref().and_then(parse_timestamp))
        .unwrap_or_else(Utc::now);

    Some(Notification {
        id,
        kind,
        title: raw.title.filter(|s| !s.is_empty()),
        message: raw.message.filter(|s| !s.is_empty()),
        data,
        actions,
        created_at,
        read_at: raw.read_at.as_deref().and_then(parse_timestamp),
        is_new: false,
        source: Source::Api,
    })
}

/// Normalize the body of a "notification created" push event.
pub fn from_broadcast(event_name: &str, payload: &Map<String, Value>) -> Notification {
    let nested = payload.get("data").and_then(Value::as_object);
    let lookup = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|key| {
            str_field(payload, key).or_else(|| nested.and_then(|n| str_field(n, key)))
        })
    };

    let id = payload
        .get("id")
        .and_then(NotificationId::from_value)
        .unwrap_or_else(|| NotificationId::generate(BROADCAST_ID_PREFIX));

    let title = str_field(payload, "title")
        .or_else(|| nested.and_then(|n| str_field(n, "title")))
        .unwrap_or_else(|| event_name.replace('.', " "));

    let message = str_field(payload, "message")
        .or_else(|| nested.and_then(|n| str_field(n, "message")))
        .or_else(|| str_field(payload, "body"))
        .or_else(|| nested.and_then(|n| str_field(n, "body")))
        .unwrap_or_default();

    let kind = str_field(payload, "type").unwrap_or_else(|| event_name.to_string());

    let mut data = nested.cloned().unwrap_or_else(|| payload.clone());

    if let Some(icon) = lookup(&["icon"]) {
        data.insert("icon".to_string(), Value::String(icon));
    }
    if let Some(class) = lookup(&["icon_class", "iconClass"]) {
        data.insert("icon_class".to_string(), Value::String(class));
    }
    if let Some(url) = lookup(&["action_url", "actionUrl"]) {
        data.insert("action_url".to_string(), Value::String(url));
    }

    let actions = payload
        .get("actions")
        .or_else(|| nested.and_then(|n| n.get("actions")))
        .map(parse_actions)
        .unwrap_or_default();

    let created_at = str_field(payload, "created_at")
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| {
            payload
                .get("timestamp")
                .and_then(Value::as_i64)
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        })
        .unwrap_or_else(Utc::now);

    let read_at = str_field(payload, "read_at")
        .as_deref()
        .and_then(parse_timestamp);

    Notification {
        id,
        kind,
        title: Some(title),
        message: Some(message),
        data,
        actions,
        created_at,
        read_at,
        is_new: false,
        source: Source::Broadcast,
    }
}

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn has_str(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

// `data` is stored as a JSON column; some serializers hand it back encoded.
fn object_or_decoded(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Map::new(),
    }
}
