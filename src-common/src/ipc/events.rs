//! Host event notifications.

use serde::{Deserialize, Serialize};

/// Event the host emits when a Generator menu item is toggled.
pub const MENU_CHANGED_EVENT: &str = "generatorMenuChanged";

/// An event pushed by the host outside any request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

/// Payload of a `generatorMenuChanged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuChange {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

impl HostEvent {
    /// Parse a notification body of the form `<eventName>\r<json>`.
    pub fn parse(body: &str) -> Option<Self> {
        let (name, json) = body.split_once('\r')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let payload = serde_json::from_str(json.trim_end_matches('\0')).ok()?;
        Some(Self {
            name: name.to_string(),
            payload,
        })
    }

    /// The menu change carried by this event, if it is one.
    pub fn menu_change(&self) -> Option<MenuChange> {
        if self.name != MENU_CHANGED_EVENT {
            return None;
        }
        let change = self.payload.get(MENU_CHANGED_EVENT)?;
        serde_json::from_value(change.clone()).ok()
    }
}
