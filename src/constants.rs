//! Service-wide constants for push-dispatch.
//!
//! Centralizes defaults for payload fields, delivery limits and the HTTP
//! front door so they are discoverable in one place.
//!
//! # Categories
//!
//! - **Payload defaults**: values substituted for absent request fields
//! - **Delivery**: push message TTL, timeouts and fan-out bounds
//! - **Server**: bind address and routes

use std::time::Duration;

// ============================================================================
// Payload defaults
// ============================================================================

/// Icon shown when a request does not name one.
pub const DEFAULT_ICON: &str = "/icon-192x192.png";

/// Badge shown when a request does not name one.
pub const DEFAULT_BADGE: &str = "/icon-192x192.png";

/// Grouping tag used when a request does not supply one.
///
/// Notifications sharing a tag replace each other on the device.
pub const DEFAULT_TAG: &str = "default";

// ============================================================================
// Delivery
// ============================================================================

/// How long the push service should hold an undelivered message (seconds).
pub const DEFAULT_TTL_SECS: u32 = 86_400;

/// Largest plaintext payload `web-push` will encrypt with aes128gcm.
pub const MAX_PAYLOAD_BYTES: usize = 3052;

/// Upper bound for a single delivery attempt.
///
/// One unresponsive push service must not stall the whole dispatch.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum delivery attempts in flight for one dispatch.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Characters of an endpoint URL kept when logging it.
///
/// Push endpoints are capability URLs; the full value never goes to logs.
pub const ENDPOINT_LOG_PREFIX_LEN: usize = 48;

/// Bytes of a push service error body kept in a delivery outcome.
pub const ERROR_BODY_MAX_LEN: usize = 256;

// ============================================================================
// Server
// ============================================================================

/// Address the front door binds when nothing else is configured.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// Route accepting notification requests.
pub const SEND_ROUTE: &str = "/send-push-notification";

/// Route for registering and removing device subscriptions.
pub const SUBSCRIPTIONS_ROUTE: &str = "/push-subscriptions";

/// Route exposing the VAPID application server key to browsers.
pub const VAPID_PUBLIC_KEY_ROUTE: &str = "/vapid-public-key";

/// Headers browsers may send on cross-origin requests.
pub const CORS_ALLOWED_HEADERS: &[&str] =
    &["authorization", "x-client-info", "apikey", "content-type"];

/// Shorten an endpoint URL for logging.
pub fn endpoint_for_log(endpoint: &str) -> &str {
    match endpoint.char_indices().nth(ENDPOINT_LOG_PREFIX_LEN) {
        Some((idx, _)) => &endpoint[..idx],
        None => endpoint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_values_are_reasonable() {
        assert!(DEFAULT_DELIVERY_TIMEOUT >= Duration::from_secs(1));
        assert!(DEFAULT_DELIVERY_TIMEOUT <= Duration::from_secs(60));
        assert!(DEFAULT_MAX_IN_FLIGHT > 0);
    }

    #[test]
    fn test_endpoint_for_log_truncates_long_urls() {
        let long = format!("https://fcm.googleapis.com/fcm/send/{}", "x".repeat(200));
        assert_eq!(endpoint_for_log(&long).chars().count(), ENDPOINT_LOG_PREFIX_LEN);
        assert_eq!(endpoint_for_log("https://short"), "https://short");
    }
}
