//! Web push message delivery.
//!
//! Encrypts a payload for one subscription (RFC 8291, `aes128gcm`), signs
//! the request with the service's VAPID key (RFC 8292) and POSTs it to the
//! subscription's push service endpoint (RFC 8030). The push service's
//! answer is classified so the dispatcher can tell a dead endpoint from a
//! hiccup.

// Rust guideline compliant 2026-02

use std::time::Duration;

use async_trait::async_trait;

use super::store::Subscription;
use super::vapid::VapidIdentity;
use crate::constants::{endpoint_for_log, DEFAULT_TTL_SECS, ERROR_BODY_MAX_LEN};

/// Why one delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The endpoint no longer exists (404/410). It never will again.
    #[error("subscription gone (HTTP {status})")]
    Gone {
        /// 404 or 410.
        status: u16,
    },
    /// The push service rejected our VAPID credentials (401/403).
    #[error("push service rejected VAPID authorization (HTTP {status}): {detail}")]
    Unauthorized {
        /// 401 or 403.
        status: u16,
        /// Response body excerpt.
        detail: String,
    },
    /// The push service refused this message (other 4xx).
    #[error("push service rejected message (HTTP {status}): {detail}")]
    Rejected {
        /// The 4xx status.
        status: u16,
        /// Response body excerpt.
        detail: String,
    },
    /// Network error, timeout, 429 or 5xx. A later request may succeed.
    #[error("transient delivery failure: {detail}")]
    Transient {
        /// HTTP status, when the push service answered at all.
        status: Option<u16>,
        /// What went wrong.
        detail: String,
    },
    /// The message could not be built for this subscription
    /// (malformed endpoint or key material).
    #[error("could not build push message: {0}")]
    InvalidSubscription(String),
}

impl DeliveryError {
    /// HTTP status reported by the push service, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Gone { status }
            | Self::Unauthorized { status, .. }
            | Self::Rejected { status, .. } => Some(*status),
            Self::Transient { status, .. } => *status,
            Self::InvalidSubscription(_) => None,
        }
    }

    /// Whether the subscription should be deleted.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }

    /// Build the error for a delivery attempt that exceeded its time budget.
    pub fn timed_out(after: Duration) -> Self {
        Self::Transient {
            status: None,
            detail: format!("no response within {}s", after.as_secs_f32()),
        }
    }
}

/// Map a push service response status onto a delivery result.
pub fn classify_status(status: u16, body: &str) -> Result<(), DeliveryError> {
    let detail = || {
        let trimmed = body.trim();
        match trimmed.char_indices().nth(ERROR_BODY_MAX_LEN) {
            Some((idx, _)) => format!("{}...", &trimmed[..idx]),
            None => trimmed.to_string(),
        }
    };

    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(DeliveryError::Gone { status }),
        401 | 403 => Err(DeliveryError::Unauthorized {
            status,
            detail: detail(),
        }),
        429 | 500..=599 => Err(DeliveryError::Transient {
            status: Some(status),
            detail: format!("HTTP {status} {}", detail()),
        }),
        _ => Err(DeliveryError::Rejected {
            status,
            detail: detail(),
        }),
    }
}

/// Delivers one payload to one subscription.
///
/// The dispatcher calls this once per target, concurrently. Implementations
/// must not share failure state between calls.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Send `payload` to `subscription`, signing with `vapid`.
    async fn deliver(
        &self,
        vapid: &VapidIdentity,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError>;
}

/// [`DeliveryClient`] speaking the Web Push protocol over `reqwest`.
///
/// Uses the `web-push` crate for payload encryption and VAPID signing, then
/// sends the request itself so one pooled `reqwest::Client` serves every
/// delivery.
#[derive(Debug, Clone)]
pub struct WebPushClient {
    http: reqwest::Client,
    ttl: u32,
}

impl WebPushClient {
    /// Wrap an existing HTTP client.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            ttl: DEFAULT_TTL_SECS,
        }
    }

    /// Build a client with its own connection pool and request timeout.
    pub fn with_timeout(timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self::new(http))
    }

    /// Set how long push services keep undelivered messages (seconds).
    #[must_use]
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    fn build_message(
        &self,
        vapid: &VapidIdentity,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<web_push::WebPushMessage, web_push::WebPushError> {
        use web_push::{ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder};

        let sub_info =
            SubscriptionInfo::new(&subscription.endpoint, &subscription.p256dh, &subscription.auth);

        let mut sig_builder =
            VapidSignatureBuilder::from_base64(vapid.keys().private_key_base64url(), &sub_info)?;
        sig_builder.add_claim("sub", vapid.subject());
        let sig = sig_builder.build()?;

        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(sig);
        builder.set_ttl(self.ttl);
        builder.build()
    }
}

#[async_trait]
impl DeliveryClient for WebPushClient {
    async fn deliver(
        &self,
        vapid: &VapidIdentity,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let message = self
            .build_message(vapid, subscription, payload)
            .map_err(|e| DeliveryError::InvalidSubscription(e.to_string()))?;

        let mut request = self
            .http
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string());

        if let Some(urgency) = message.urgency {
            request = request.header("Urgency", urgency.to_string());
        }

        if let Some(topic) = message.topic {
            request = request.header("Topic", topic);
        }

        if let Some(push_payload) = message.payload {
            request = request
                .header("Content-Encoding", push_payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");

            // Includes the VAPID `Authorization: vapid t=..., k=...` header.
            for (key, value) in &push_payload.crypto_headers {
                request = request.header(*key, value.as_str());
            }

            request = request.body(push_payload.content);
        }

        let response = request.send().await.map_err(|e| DeliveryError::Transient {
            status: e.status().map(|s| s.as_u16()),
            detail: if e.is_timeout() {
                "request timed out".to_string()
            } else {
                format!("HTTP request failed: {e}")
            },
        })?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            log::debug!(
                "[WebPush] Delivered to {}... (HTTP {status})",
                endpoint_for_log(&subscription.endpoint)
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        classify_status(status, &body)
    }
}
