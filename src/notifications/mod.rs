//! Web push notification dispatch.
//!
//! Resolves which browser subscriptions a notification goes to, delivers
//! it to each through its push service, and removes subscriptions whose
//! endpoint has gone away.
//!
//! # Architecture
//!
//! ```text
//! NotificationRequest
//!     ↓
//! Dispatcher ── resolve ──> SubscriptionStore (list_by_owner / list_all)
//!     │
//!     ├── fan out ──> DeliveryClient × N  (concurrent, each with a timeout)
//!     │                   ↓
//!     │               push service (FCM, Mozilla autopush, APNs web, ...)
//!     │
//!     └── prune ───> SubscriptionStore (delete_by_endpoint on 404/410)
//!     ↓
//! DispatchReport { sent, failed, total, pruned }
//! ```
//!
//! # VAPID
//!
//! Every push request is signed with one P-256 key pair configured at
//! startup ([`vapid::VapidIdentity`]). Browsers subscribe with the matching
//! public key, so rotating the key invalidates every existing subscription.

// Rust guideline compliant 2026-02

pub mod dispatcher;
pub mod push;
pub mod request;
pub mod store;
pub mod vapid;

pub use dispatcher::{DeliveryOutcome, DispatchError, DispatchReport, Dispatcher};
pub use push::{DeliveryClient, DeliveryError, WebPushClient};
pub use request::{Audience, NotificationPayload, NotificationRequest};
pub use store::{
    FileSubscriptionStore, MemorySubscriptionStore, StoreError, Subscription, SubscriptionStore,
};
pub use vapid::{VapidIdentity, VapidKeys};
