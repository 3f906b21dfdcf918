//! Notification requests and the payload delivered to devices.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{DEFAULT_BADGE, DEFAULT_ICON, DEFAULT_TAG};

/// Which subscriptions a notification goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every registered subscription.
    Broadcast,
    /// Only subscriptions owned by this user.
    Owner(String),
}

impl Audience {
    /// Map an optional owner id to an audience.
    ///
    /// An absent or blank id means broadcast.
    pub fn from_owner(owner_id: Option<String>) -> Self {
        match owner_id {
            Some(id) if !id.trim().is_empty() => Self::Owner(id),
            _ => Self::Broadcast,
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::Owner(id) => write!(f, "owner {id}"),
        }
    }
}

/// A notification submitted to the dispatcher.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    /// Notification title. Must be non-empty.
    pub title: String,
    /// Notification body text. Must be non-empty.
    pub body: String,
    /// Icon URL shown with the notification.
    pub icon: Option<String>,
    /// Monochrome badge URL (Android status bar).
    pub badge: Option<String>,
    /// Grouping key; same-tag notifications replace each other.
    pub tag: Option<String>,
    /// Opaque data forwarded to the service worker, e.g. `{"url": "/progress"}`.
    pub data: Option<Map<String, Value>>,
    /// Who receives it.
    pub audience: Audience,
}

impl NotificationRequest {
    /// A request with only the required fields set.
    pub fn new(title: impl Into<String>, body: impl Into<String>, audience: Audience) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
            badge: None,
            tag: None,
            data: None,
            audience,
        }
    }

    /// Name of the first missing required field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.title.trim().is_empty() {
            Some("title")
        } else if self.body.trim().is_empty() {
            Some("body")
        } else {
            None
        }
    }

    /// Build the payload every target receives, filling in defaults.
    pub fn payload(&self) -> NotificationPayload {
        fn or_default(value: Option<&String>, fallback: &str) -> String {
            value
                .filter(|v| !v.is_empty())
                .map_or_else(|| fallback.to_string(), Clone::clone)
        }

        NotificationPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            icon: or_default(self.icon.as_ref(), DEFAULT_ICON),
            badge: or_default(self.badge.as_ref(), DEFAULT_BADGE),
            tag: or_default(self.tag.as_ref(), DEFAULT_TAG),
            data: self.data.clone().unwrap_or_default(),
        }
    }
}

/// JSON document encrypted and pushed to each device.
///
/// The service worker reads these fields in its `push` handler and passes
/// them to `showNotification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Icon URL.
    pub icon: String,
    /// Badge URL.
    pub badge: String,
    /// Grouping tag.
    pub tag: String,
    /// Data for the click handler.
    pub data: Map<String, Value>,
}

impl NotificationPayload {
    /// Serialize to the bytes that get encrypted.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
