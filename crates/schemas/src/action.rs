// Notification actions
//
// Buttons/links attached to a notification. Field names are camelCase on the
// wire to match what the server-side action builder emits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub open_in_new_tab: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
    #[serde(default)]
    pub should_close: bool,
    #[serde(default)]
    pub is_disabled: bool,
}

impl NotificationAction {
    /// Create an action; the label defaults to the name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>, open_in_new_tab: bool) -> Self {
        self.url = Some(url.into());
        self.open_in_new_tab = open_in_new_tab;
        self
    }

    /// Dispatch a named client event instead of navigating
    pub fn dispatch(mut self, event: impl Into<String>, data: Option<Value>) -> Self {
        self.event = Some(event.into());
        self.event_data = data;
        self
    }

    pub fn close(mut self) -> Self {
        self.should_close = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_disabled = true;
        self
    }

    pub fn button(self) -> Self {
        self.color("primary")
    }

    pub fn danger(self) -> Self {
        self.color("danger")
    }

    pub fn success(self) -> Self {
        self.color("success")
    }

    pub fn warning(self) -> Self {
        self.color("warning")
    }

    pub fn info(self) -> Self {
        self.color("info")
    }

    /// An action with neither name nor label cannot be rendered
    pub fn is_renderable(&self) -> bool {
        !self.name.is_empty() || !self.label.is_empty()
    }
}

/// Parse an action list leniently: malformed or unnamed entries are skipped.
pub fn parse_actions(value: &Value) -> Vec<NotificationAction> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value::<NotificationAction>(item.clone()).ok())
        .filter(NotificationAction::is_renderable)
        .collect()
}
