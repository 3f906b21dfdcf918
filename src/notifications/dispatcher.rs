//! Notification fan-out.
//!
//! [`Dispatcher::dispatch`] turns one [`NotificationRequest`] into one
//! delivery attempt per target subscription, waits for all of them, prunes
//! endpoints the push service reports as gone, and reports counts.
//!
//! # Failure model
//!
//! ```text
//! invalid or oversized request ─┐
//! VAPID not configured ─────────┼──> Err(DispatchError)   (nothing sent)
//! subscription read failed ─────┘
//!
//! per-target delivery failure ──> counted in `failed`, never aborts the batch
//! per-target 404/410 ───────────> counted in `failed`, subscription deleted
//! prune delete failed ──────────> logged only
//! ```

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;

use super::push::{DeliveryClient, DeliveryError};
use super::request::{Audience, NotificationRequest};
use super::store::{StoreError, Subscription, SubscriptionStore};
use super::vapid::VapidIdentity;
use crate::constants::{
    endpoint_for_log, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_MAX_IN_FLIGHT, MAX_PAYLOAD_BYTES,
};

/// Whole-operation failure of a dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Title or body missing, or the payload is too large to encrypt.
    /// Raised before any I/O.
    #[error("invalid notification request: {0}")]
    InvalidRequest(String),
    /// VAPID identity not established. Raised before any I/O.
    #[error("push notifications are not configured: {0}")]
    Configuration(String),
    /// Target subscriptions could not be read.
    #[error("failed to load subscriptions: {0}")]
    Store(#[from] StoreError),
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    /// Endpoint the attempt targeted.
    pub endpoint_url: String,
    /// Whether the push service accepted the message.
    pub succeeded: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// HTTP status from the push service, when it answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip)]
    gone: bool,
}

impl DeliveryOutcome {
    fn new(endpoint_url: String, result: &Result<(), DeliveryError>) -> Self {
        match result {
            Ok(()) => Self {
                endpoint_url,
                succeeded: true,
                error_detail: None,
                status_code: None,
                gone: false,
            },
            Err(e) => Self {
                endpoint_url,
                succeeded: false,
                error_detail: Some(e.to_string()),
                status_code: e.status(),
                gone: e.is_permanent(),
            },
        }
    }

    /// Whether the push service said this endpoint no longer exists.
    pub fn is_gone(&self) -> bool {
        self.gone
    }
}

/// Aggregate result of a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Attempts the push service accepted.
    pub sent: usize,
    /// Attempts that failed for any reason.
    pub failed: usize,
    /// Subscriptions targeted. Always `sent + failed`.
    pub total: usize,
    /// Subscriptions deleted because their endpoint is gone.
    pub pruned: usize,
    /// One entry per targeted subscription.
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    fn from_outcomes(outcomes: Vec<DeliveryOutcome>, pruned: usize) -> Self {
        let total = outcomes.len();
        let sent = outcomes.iter().filter(|o| o.succeeded).count();
        Self {
            sent,
            failed: total - sent,
            total,
            pruned,
            outcomes,
        }
    }
}

/// Fans notifications out to subscriptions.
///
/// Holds no per-request state; one dispatcher serves concurrent requests.
pub struct Dispatcher {
    store: Arc<dyn SubscriptionStore>,
    delivery: Arc<dyn DeliveryClient>,
    vapid: Option<Arc<VapidIdentity>>,
    delivery_timeout: Duration,
    max_in_flight: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("vapid_configured", &self.vapid.is_some())
            .field("delivery_timeout", &self.delivery_timeout)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher.
    ///
    /// `vapid` is `None` when the deployment has no VAPID identity; every
    /// dispatch then fails with [`DispatchError::Configuration`].
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        delivery: Arc<dyn DeliveryClient>,
        vapid: Option<VapidIdentity>,
    ) -> Self {
        Self {
            store,
            delivery,
            vapid: vapid.map(Arc::new),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Bound each delivery attempt; an expired attempt counts as failed.
    #[must_use]
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Bound concurrent delivery attempts within one dispatch.
    #[must_use]
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    /// The VAPID identity, if configured.
    pub fn vapid(&self) -> Option<&VapidIdentity> {
        self.vapid.as_deref()
    }

    /// The store targets are resolved from.
    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Deliver `request` to its audience.
    ///
    /// Fails only on invalid input, missing configuration or an unreadable
    /// store. Once targets are resolved, every delivery failure is reported
    /// in the returned counts.
    pub async fn dispatch(
        &self,
        request: &NotificationRequest,
    ) -> Result<DispatchReport, DispatchError> {
        if let Some(field) = request.missing_field() {
            return Err(DispatchError::InvalidRequest(format!("{field} is required")));
        }

        let payload = request
            .payload()
            .to_bytes()
            .map_err(|e| DispatchError::InvalidRequest(format!("payload not encodable: {e}")))?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(DispatchError::InvalidRequest(format!(
                "notification is {} bytes encoded, limit is {MAX_PAYLOAD_BYTES}",
                payload.len()
            )));
        }
        let payload: Arc<[u8]> = payload.into();

        let vapid = self.vapid.clone().ok_or_else(|| {
            DispatchError::Configuration(
                "VAPID_SUBJECT, VAPID_PUBLIC_KEY and VAPID_PRIVATE_KEY must be set".to_string(),
            )
        })?;

        log::info!(
            "[Dispatch] Sending {:?} to {}",
            request.title,
            request.audience
        );

        let targets = self.resolve(&request.audience).await?;
        if targets.is_empty() {
            log::info!("[Dispatch] No subscriptions for {}", request.audience);
            return Ok(DispatchReport::default());
        }

        log::info!("[Dispatch] Delivering to {} subscription(s)", targets.len());

        let outcomes = self.fan_out(vapid, targets, payload).await;
        let pruned = self.prune(&outcomes).await;
        let report = DispatchReport::from_outcomes(outcomes, pruned);

        log::info!(
            "[Dispatch] Sent: {}, failed: {}, total: {}, pruned: {}",
            report.sent,
            report.failed,
            report.total,
            report.pruned
        );
        Ok(report)
    }

    async fn resolve(&self, audience: &Audience) -> Result<Vec<Subscription>, StoreError> {
        match audience {
            Audience::Broadcast => self.store.list_all().await,
            Audience::Owner(owner_id) => self.store.list_by_owner(owner_id).await,
        }
    }

    /// One task per target, all awaited; outcomes come back in target order.
    async fn fan_out(
        &self,
        vapid: Arc<VapidIdentity>,
        targets: Vec<Subscription>,
        payload: Arc<[u8]>,
    ) -> Vec<DeliveryOutcome> {
        let limiter = Arc::new(Semaphore::new(self.max_in_flight));
        let timeout = self.delivery_timeout;
        let endpoints: Vec<String> = targets.iter().map(|s| s.endpoint.clone()).collect();

        let handles: Vec<_> = targets
            .into_iter()
            .map(|subscription| {
                let delivery = Arc::clone(&self.delivery);
                let vapid = Arc::clone(&vapid);
                let payload = Arc::clone(&payload);
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    // The semaphore is never closed.
                    let _permit = limiter.acquire_owned().await;
                    let attempt = delivery.deliver(&vapid, &subscription, &payload);
                    match tokio::time::timeout(timeout, attempt).await {
                        Ok(result) => result,
                        Err(_elapsed) => Err(DeliveryError::timed_out(timeout)),
                    }
                })
            })
            .collect();

        let results = join_all(handles).await;

        endpoints
            .into_iter()
            .zip(results)
            .map(|(endpoint, joined)| {
                let result = joined.unwrap_or_else(|e| {
                    Err(DeliveryError::Transient {
                        status: None,
                        detail: format!("delivery task failed: {e}"),
                    })
                });
                log_failure(&endpoint, &result);
                DeliveryOutcome::new(endpoint, &result)
            })
            .collect()
    }

    /// Delete subscriptions whose endpoint is gone. Returns how many were removed.
    async fn prune(&self, outcomes: &[DeliveryOutcome]) -> usize {
        let mut pruned = 0;
        for outcome in outcomes.iter().filter(|o| o.is_gone()) {
            let endpoint = endpoint_for_log(&outcome.endpoint_url);
            match self.store.delete_by_endpoint(&outcome.endpoint_url).await {
                Ok(true) => {
                    log::info!("[Dispatch] Removed expired subscription {endpoint}...");
                    pruned += 1;
                }
                Ok(false) => {
                    log::debug!("[Dispatch] Expired subscription {endpoint}... already removed");
                }
                Err(e) => {
                    log::warn!("[Dispatch] Failed to remove expired subscription {endpoint}...: {e}");
                }
            }
        }
        pruned
    }
}

fn log_failure(endpoint: &str, result: &Result<(), DeliveryError>) {
    let Err(e) = result else {
        return;
    };
    let endpoint = endpoint_for_log(endpoint);
    match e {
        DeliveryError::Unauthorized { .. } => {
            log::error!("[Dispatch] {endpoint}...: {e} (check VAPID keys and subject)");
        }
        DeliveryError::Gone { .. } => log::info!("[Dispatch] {endpoint}...: {e}"),
        _ => log::warn!("[Dispatch] {endpoint}...: {e}"),
    }
}
