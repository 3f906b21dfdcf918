//! Push Dispatch - web push fan-out for the nPnG JM PWA.
//!
//! Accepts a notification request, resolves the browser subscriptions it
//! targets, delivers a VAPID-signed encrypted message to each, and prunes
//! subscriptions whose push service reports them gone.
//!
//! # Modules
//!
//! - [`notifications`] - Request model, subscription store, delivery, dispatcher
//! - [`server`] - HTTP front door
//! - [`config`] - Configuration loading
//! - [`constants`] - Defaults and route paths

pub mod config;
pub mod constants;
pub mod notifications;
pub mod server;

pub use config::Config;
pub use notifications::{
    Audience, DispatchError, DispatchReport, Dispatcher, NotificationRequest, Subscription,
    SubscriptionStore,
};
