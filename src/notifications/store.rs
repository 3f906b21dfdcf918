//! Push subscription storage.
//!
//! A subscription is one browser/device endpoint plus the key material
//! needed to encrypt for it. The endpoint URL is the record key: it is
//! unique per subscription and is how dead endpoints get pruned.
//!
//! Two stores ship: [`MemorySubscriptionStore`] for tests and ephemeral
//! deployments, and [`FileSubscriptionStore`], which keeps the same map
//! mirrored to a JSON file so registrations survive restarts.

// Rust guideline compliant 2026-02

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants::endpoint_for_log;

/// A registered push endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// User that registered this endpoint, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
    /// When the browser registered.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// A subscription registered now.
    pub fn new(
        owner_id: Option<String>,
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            endpoint: endpoint.into(),
            p256dh: p256dh.into(),
            auth: auth.into(),
            created_at: Utc::now(),
        }
    }
}

/// Failure reading or writing subscriptions.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backing file could not be read or written.
    #[error("subscription store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Backing data could not be parsed or encoded.
    #[error("subscription store data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// Backend refused or could not be reached.
    #[error("subscription store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed record store for push subscriptions.
///
/// Implementations must make each call atomic per record. Deleting an
/// endpoint that is not stored is not an error.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Every subscription owned by `owner_id`.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>, StoreError>;

    /// Every subscription in the store.
    async fn list_all(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Remove the subscription with this endpoint.
    ///
    /// Returns `true` if a record was removed, `false` if none existed.
    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<bool, StoreError>;

    /// Insert or replace the subscription keyed by its endpoint.
    async fn upsert(&self, subscription: Subscription) -> Result<(), StoreError>;
}

/// Endpoint-keyed map shared by both store implementations.
#[derive(Debug, Default)]
struct SubscriptionMap {
    subscriptions: BTreeMap<String, Subscription>,
}

impl SubscriptionMap {
    fn by_owner(&self, owner_id: &str) -> Vec<Subscription> {
        self.subscriptions
            .values()
            .filter(|s| s.owner_id.as_deref() == Some(owner_id))
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<Subscription> {
        self.subscriptions.values().cloned().collect()
    }

    fn remove(&mut self, endpoint: &str) -> bool {
        self.subscriptions.remove(endpoint).is_some()
    }

    fn upsert(&mut self, subscription: Subscription) {
        if let Some(previous) = self.subscriptions.get(&subscription.endpoint) {
            if previous.owner_id != subscription.owner_id {
                log::info!(
                    "[Store] Endpoint {}... moved from owner {:?} to {:?}",
                    endpoint_for_log(&subscription.endpoint),
                    previous.owner_id,
                    subscription.owner_id
                );
            }
        }
        self.subscriptions
            .insert(subscription.endpoint.clone(), subscription);
    }

    fn len(&self) -> usize {
        self.subscriptions.len()
    }
}

/// In-memory subscription store.
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    inner: RwLock<SubscriptionMap>,
}

impl MemorySubscriptionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `subscriptions`.
    pub fn with_subscriptions(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        let mut map = SubscriptionMap::default();
        for subscription in subscriptions {
            map.upsert(subscription);
        }
        Self {
            inner: RwLock::new(map),
        }
    }

    /// Number of stored subscriptions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether a subscription with this endpoint exists.
    pub async fn contains(&self, endpoint: &str) -> bool {
        self.inner
            .read()
            .await
            .subscriptions
            .contains_key(endpoint)
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.inner.read().await.by_owner(owner_id))
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.inner.read().await.all())
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.remove(endpoint))
    }

    async fn upsert(&self, subscription: Subscription) -> Result<(), StoreError> {
        self.inner.write().await.upsert(subscription);
        Ok(())
    }
}

/// On-disk format version for [`FileSubscriptionStore`].
const FILE_STORE_VERSION: u8 = 1;

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u8,
    subscriptions: &'a BTreeMap<String, Subscription>,
}

#[derive(Deserialize)]
struct StoreFile {
    version: u8,
    #[serde(default)]
    subscriptions: BTreeMap<String, Subscription>,
}

/// Subscription store mirrored to a JSON file.
///
/// The whole map lives in memory; every mutation rewrites the file while
/// the write lock is held, so the file always matches the map.
#[derive(Debug)]
pub struct FileSubscriptionStore {
    path: PathBuf,
    inner: RwLock<SubscriptionMap>,
}

impl FileSubscriptionStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let map = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: StoreFile = serde_json::from_slice(&bytes)?;
                if file.version != FILE_STORE_VERSION {
                    return Err(StoreError::Unavailable(format!(
                        "unsupported store version {} in {}",
                        file.version,
                        path.display()
                    )));
                }
                SubscriptionMap {
                    subscriptions: file.subscriptions,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SubscriptionMap::default(),
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "[Store] Loaded {} push subscription(s) from {}",
            map.len(),
            path.display()
        );

        Ok(Self {
            path,
            inner: RwLock::new(map),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the map to a sibling temp file, then rename over the original.
    async fn persist(&self, map: &SubscriptionMap) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(&StoreFileRef {
            version: FILE_STORE_VERSION,
            subscriptions: &map.subscriptions,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }

        tokio::fs::rename(&tmp_path, &self.path).await?;
        log::debug!("[Store] Saved {} subscription(s) to {:?}", map.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for FileSubscriptionStore {
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.inner.read().await.by_owner(owner_id))
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.inner.read().await.all())
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<bool, StoreError> {
        let mut map = self.inner.write().await;
        let Some(removed) = map.subscriptions.remove(endpoint) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&map).await {
            // Keep memory and disk consistent when the write fails.
            map.subscriptions.insert(removed.endpoint.clone(), removed);
            return Err(e);
        }
        Ok(true)
    }

    async fn upsert(&self, subscription: Subscription) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let previous = map.subscriptions.get(&subscription.endpoint).cloned();
        let endpoint = subscription.endpoint.clone();
        map.upsert(subscription);
        if let Err(e) = self.persist(&map).await {
            match previous {
                Some(previous) => {
                    map.subscriptions.insert(endpoint, previous);
                }
                None => {
                    map.subscriptions.remove(&endpoint);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}
