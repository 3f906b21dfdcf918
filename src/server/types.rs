//! Request and response bodies for the HTTP front door.
//!
//! Field names follow the PWA client (`userId`, `keys.p256dh`), which is
//! why these types are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::notifications::{Audience, DispatchReport, NotificationRequest, Subscription};

/// Body of `POST /send-push-notification`.
///
/// `title` and `body` are optional here so that a missing or `null` field
/// is reported as an invalid request rather than a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPushRequest {
    /// Notification title.
    pub title: Option<String>,
    /// Notification body.
    pub body: Option<String>,
    /// Icon URL.
    pub icon: Option<String>,
    /// Badge URL.
    pub badge: Option<String>,
    /// Grouping tag.
    pub tag: Option<String>,
    /// Data forwarded to the service worker.
    pub data: Option<Map<String, Value>>,
    /// Restrict delivery to this user's devices.
    pub user_id: Option<String>,
}

impl From<SendPushRequest> for NotificationRequest {
    fn from(req: SendPushRequest) -> Self {
        Self {
            title: req.title.unwrap_or_default(),
            body: req.body.unwrap_or_default(),
            icon: req.icon,
            badge: req.badge,
            tag: req.tag,
            data: req.data,
            audience: Audience::from_owner(req.user_id),
        }
    }
}

/// Body of a successful `POST /send-push-notification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPushResponse {
    /// Human-readable summary.
    pub message: String,
    /// Deliveries accepted.
    pub sent: usize,
    /// Deliveries failed. Absent when there were no targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    /// Targets attempted. Absent when there were no targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl From<&DispatchReport> for SendPushResponse {
    fn from(report: &DispatchReport) -> Self {
        if report.total == 0 {
            return Self {
                message: "No subscriptions found".to_string(),
                sent: 0,
                failed: None,
                total: None,
            };
        }
        Self {
            message: "Notifications processed".to_string(),
            sent: report.sent,
            failed: Some(report.failed),
            total: Some(report.total),
        }
    }
}

/// Key material inside a browser `PushSubscription.toJSON()`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionKeys {
    /// Browser's ECDH public key (base64url).
    pub p256dh: String,
    /// Auth secret (base64url).
    pub auth: String,
}

/// Body of `POST /push-subscriptions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSubscriptionRequest {
    /// User registering the device.
    pub user_id: Option<String>,
    /// Push service endpoint.
    pub endpoint: String,
    /// Encryption keys.
    pub keys: SubscriptionKeys,
}

impl RegisterSubscriptionRequest {
    /// Name of the first missing field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.endpoint.trim().is_empty() {
            Some("endpoint")
        } else if self.keys.p256dh.trim().is_empty() {
            Some("keys.p256dh")
        } else if self.keys.auth.trim().is_empty() {
            Some("keys.auth")
        } else {
            None
        }
    }

    /// Convert into a stored subscription registered now.
    pub fn into_subscription(self) -> Subscription {
        let owner_id = self.user_id.filter(|id| !id.trim().is_empty());
        Subscription::new(owner_id, self.endpoint, self.keys.p256dh, self.keys.auth)
    }
}

/// Body of `DELETE /push-subscriptions`.
#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeRequest {
    /// Endpoint to remove.
    pub endpoint: String,
}

/// Error body for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
}
