// Display helpers
//
// Title/message/icon/time-ago derivation shared by every front end.

use chrono::{DateTime, Utc};

use crate::notification::Notification;

pub const DEFAULT_MESSAGE: &str = "You have a new notification";

/// Icon hints the feed knows how to draw
pub const KNOWN_ICONS: &[&str] = &["bell", "post", "user", "message", "alert", "check", "info"];

/// Resolved icon for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Icon {
    /// Caller-supplied CSS class
    Class(String),
    /// One of [`KNOWN_ICONS`]
    Named(&'static str),
}

pub fn title(n: &Notification) -> String {
    if let Some(title) = n.data_str("title") {
        return title.to_string();
    }
    if let Some(title) = n.title.as_deref().filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    humanize_type(&n.kind)
}

pub fn message(n: &Notification) -> String {
    n.data_str("message")
        .or_else(|| n.message.as_deref().filter(|m| !m.is_empty()))
        .or_else(|| n.data_str("title"))
        .unwrap_or(DEFAULT_MESSAGE)
        .to_string()
}

pub fn icon(n: &Notification) -> Option<Icon> {
    if let Some(class) = n.data_str("icon_class") {
        return Some(Icon::Class(class.to_string()));
    }
    let hint = n.data_str("icon")?;
    let named = KNOWN_ICONS
        .iter()
        .find(|known| **known == hint)
        .copied()
        .unwrap_or("bell");
    Some(Icon::Named(named))
}

/// `App\Notification\PostPublished` -> `Post Published`
pub fn humanize_type(kind: &str) -> String {
    let last = kind.rsplit('\\').next().unwrap_or(kind);
    let mut out = String::with_capacity(last.len() + 4);
    let mut prev: Option<char> = None;

    for ch in last.chars() {
        let ch = match ch {
            '.' | '_' | '-' => ' ',
            other => other,
        };
        if ch.is_uppercase() && prev.is_some_and(|p| p != ' ') {
            out.push(' ');
        }
        out.push(ch);
        prev = Some(ch);
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Relative age as shown in the feed (`just now`, `5m ago`, `3d ago`, ...)
pub fn time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - created_at).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = hours / 24;
    if days < 7 {
        return format!("{}d ago", days);
    }
    if days < 30 {
        return format!("{}w ago", days / 7);
    }

    created_at.format("%Y-%m-%d").to_string()
}
