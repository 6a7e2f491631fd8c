// ── Read-through feeds ──
//
// REST collections served through the cache store: a fresh entry is
// returned as-is, a miss (absent or stale) refetches and stores.

use std::sync::Arc;

use tracing::debug;

use iotsync_api::ApiClient;

use crate::error::CoreError;
use crate::model::{Device, DeviceStats, Notification, OwnerKey};
use crate::store::CacheStore;

/// Device collection per owner, shared with the connection manager so
/// live events keep it current.
pub struct DeviceFeed {
    api: Arc<ApiClient>,
    cache: Arc<CacheStore<Device>>,
}

impl DeviceFeed {
    pub fn new(api: Arc<ApiClient>, cache: Arc<CacheStore<Device>>) -> Self {
        Self { api, cache }
    }

    pub fn cache(&self) -> &Arc<CacheStore<Device>> {
        &self.cache
    }

    pub async fn list(&self, owner: &OwnerKey) -> Result<Arc<Vec<Device>>, CoreError> {
        if let Some(devices) = self.cache.get(owner) {
            debug!(owner = %owner, "device cache hit");
            return Ok(devices);
        }
        self.refresh(owner).await
    }

    /// Bypass the cache and store the fresh collection.
    pub async fn refresh(&self, owner: &OwnerKey) -> Result<Arc<Vec<Device>>, CoreError> {
        let devices: Vec<Device> = self
            .api
            .list_devices()
            .await?
            .into_iter()
            .map(Device::from)
            .collect();
        debug!(owner = %owner, count = devices.len(), "device cache refilled");
        let shared = Arc::new(devices.clone());
        self.cache.set(owner.clone(), devices);
        Ok(shared)
    }

    /// Aggregate counters; never cached.
    pub async fn stats(&self) -> Result<DeviceStats, CoreError> {
        Ok(self.api.device_stats().await?.into())
    }
}

/// Notifications per owner.
pub struct NotificationFeed {
    api: Arc<ApiClient>,
    cache: CacheStore<Notification>,
}

impl NotificationFeed {
    pub fn new(api: Arc<ApiClient>, cache: CacheStore<Notification>) -> Self {
        Self { api, cache }
    }

    pub async fn list(&self, owner: &OwnerKey) -> Result<Arc<Vec<Notification>>, CoreError> {
        if let Some(items) = self.cache.get(owner) {
            return Ok(items);
        }
        let items: Vec<Notification> = self
            .api
            .list_notifications()
            .await?
            .into_iter()
            .map(Notification::from)
            .collect();
        let shared = Arc::new(items.clone());
        self.cache.set(owner.clone(), items);
        Ok(shared)
    }

    /// Mark one notification read server-side, then patch the cached copy.
    pub async fn mark_read(&self, owner: &OwnerKey, id: &str) -> Result<(), CoreError> {
        self.api.mark_notification_read(id).await?;

        let cached = self
            .cache
            .get(owner)
            .and_then(|items| items.iter().find(|n| n.id == id).cloned());
        if let Some(mut notification) = cached {
            notification.read = true;
            self.cache.update_one(owner, notification);
        }
        Ok(())
    }

    /// Mark everything read; the cached entry is dropped and refetched on
    /// the next `list`.
    pub async fn mark_all_read(&self, owner: &OwnerKey) -> Result<(), CoreError> {
        self.api.mark_all_notifications_read().await?;
        self.cache.clear(owner);
        Ok(())
    }

    pub async fn unread_count(&self) -> Result<u64, CoreError> {
        Ok(self.api.unread_notification_count().await?)
    }
}
