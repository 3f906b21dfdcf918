//! Configuration loading.
//!
//! Settings come from an optional JSON file, then environment variables
//! override them. VAPID credentials are only ever read from the
//! environment and are never written to disk.
//!
//! # Environment
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `PUSH_CONFIG_FILE` | Config file path (default: platform config dir) |
//! | `PUSH_BIND_ADDR` | Front door listen address |
//! | `PUSH_STORE_PATH` | Subscription store JSON file |
//! | `PUSH_DELIVERY_TIMEOUT_SECS` | Per-delivery timeout |
//! | `PUSH_MAX_IN_FLIGHT` | Concurrent deliveries per dispatch |
//! | `PUSH_TTL_SECS` | Push message TTL |
//! | `VAPID_SUBJECT` | `mailto:` or `https:` contact URI |
//! | `VAPID_PUBLIC_KEY` | base64url uncompressed P-256 point |
//! | `VAPID_PRIVATE_KEY` | base64url P-256 private key |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::constants::{
    DEFAULT_BIND_ADDR, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_MAX_IN_FLIGHT, DEFAULT_TTL_SECS,
};
use crate::notifications::VapidIdentity;

/// Raw VAPID settings as read from the environment.
#[derive(Clone, Default)]
pub struct VapidSettings {
    /// Contact URI for the JWT `sub` claim.
    pub subject: Option<String>,
    /// base64url public key.
    pub public_key: Option<String>,
    /// base64url private key.
    pub private_key: Option<String>,
}

impl std::fmt::Debug for VapidSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidSettings")
            .field("subject", &self.subject)
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for the push-dispatch service.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP front door listens on.
    pub bind_addr: String,
    /// JSON file backing the subscription store.
    pub store_path: PathBuf,
    /// Seconds before a single delivery attempt is abandoned.
    pub delivery_timeout_secs: u64,
    /// Maximum concurrent deliveries within one dispatch.
    pub max_in_flight: usize,
    /// Seconds push services should keep undelivered messages.
    pub ttl_secs: u32,
    /// VAPID credentials - NOT serialized to disk (environment only).
    #[serde(skip)]
    pub vapid: VapidSettings,
}

impl Default for Config {
    fn default() -> Self {
        let store_path = Self::config_dir().map_or_else(
            || PathBuf::from("push_subscriptions.json"),
            |dir| dir.join("push_subscriptions.json"),
        );

        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            store_path,
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT.as_secs(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            ttl_secs: DEFAULT_TTL_SECS,
            vapid: VapidSettings::default(),
        }
    }
}

impl Config {
    /// Platform configuration directory for this service, if one exists.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("push-dispatch"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var("PUSH_CONFIG_FILE").ok().map(PathBuf::from);
        let mut config = match &explicit {
            // An explicitly named file must exist and parse.
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_dir().map(|d| d.join("config.json")) {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.sanitize();
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Replace out-of-range limits with usable values.
    fn sanitize(&mut self) {
        if self.delivery_timeout_secs == 0 {
            log::warn!(
                "Ignoring delivery_timeout_secs=0, using {}s",
                DEFAULT_DELIVERY_TIMEOUT.as_secs()
            );
            self.delivery_timeout_secs = DEFAULT_DELIVERY_TIMEOUT.as_secs();
        }
        if !(1..=Semaphore::MAX_PERMITS).contains(&self.max_in_flight) {
            let clamped = self.max_in_flight.clamp(1, Semaphore::MAX_PERMITS);
            log::warn!("Clamping max_in_flight={} to {clamped}", self.max_in_flight);
            self.max_in_flight = clamped;
        }
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production). Unparseable numbers are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind_addr) = get("PUSH_BIND_ADDR") {
            self.bind_addr = bind_addr;
        }

        if let Some(store_path) = get("PUSH_STORE_PATH") {
            self.store_path = PathBuf::from(store_path);
        }

        if let Some(value) = get("PUSH_DELIVERY_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => self.delivery_timeout_secs = secs,
                _ => log::warn!("Ignoring invalid PUSH_DELIVERY_TIMEOUT_SECS={value:?}"),
            }
        }

        if let Some(value) = get("PUSH_MAX_IN_FLIGHT") {
            match value.parse::<usize>() {
                Ok(max) if (1..=Semaphore::MAX_PERMITS).contains(&max) => self.max_in_flight = max,
                _ => log::warn!("Ignoring invalid PUSH_MAX_IN_FLIGHT={value:?}"),
            }
        }

        if let Some(value) = get("PUSH_TTL_SECS") {
            match value.parse::<u32>() {
                Ok(ttl) => self.ttl_secs = ttl,
                Err(_) => log::warn!("Ignoring invalid PUSH_TTL_SECS={value:?}"),
            }
        }

        self.vapid = VapidSettings {
            subject: get("VAPID_SUBJECT"),
            public_key: get("VAPID_PUBLIC_KEY"),
            private_key: get("VAPID_PRIVATE_KEY"),
        };
    }

    /// Per-delivery timeout.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    /// Build the VAPID identity.
    ///
    /// Returns `Ok(None)` when no VAPID variable is set: the service can
    /// run, but every dispatch reports a configuration error. A partial or
    /// malformed identity is an error, so a typo fails at startup instead of
    /// on the first notification.
    pub fn vapid_identity(&self) -> Result<Option<VapidIdentity>> {
        let VapidSettings {
            subject,
            public_key,
            private_key,
        } = &self.vapid;

        match (subject, public_key, private_key) {
            (None, None, None) => Ok(None),
            (Some(subject), Some(public_key), Some(private_key)) => {
                VapidIdentity::new(subject, public_key, private_key)
                    .map(Some)
                    .context("Invalid VAPID configuration")
            }
            _ => {
                let missing: Vec<&str> = [
                    ("VAPID_SUBJECT", subject.is_none()),
                    ("VAPID_PUBLIC_KEY", public_key.is_none()),
                    ("VAPID_PRIVATE_KEY", private_key.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                anyhow::bail!("Incomplete VAPID configuration, missing {}", missing.join(", "))
            }
        }
    }
}
