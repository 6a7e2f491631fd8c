// Notification endpoints

use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::models::NotificationRecord;

impl ApiClient {
    /// Notifications for the authenticated user.
    ///
    /// `GET /api/notifications`
    pub async fn list_notifications(&self) -> Result<Vec<NotificationRecord>, Error> {
        let url = self.api_url("notifications")?;
        debug!("listing notifications");
        self.get_json(url).await
    }

    /// `PATCH /api/notifications/{id}/read`
    pub async fn mark_notification_read(&self, id: &str) -> Result<(), Error> {
        let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
        let url = self.api_url(&format!("notifications/{encoded}/read"))?;
        debug!(id, "marking notification read");
        self.patch_empty(url).await
    }

    /// `PATCH /api/notifications/read-all`
    pub async fn mark_all_notifications_read(&self) -> Result<(), Error> {
        let url = self.api_url("notifications/read-all")?;
        debug!("marking all notifications read");
        self.patch_empty(url).await
    }

    /// `GET /api/notifications/unread-count`
    pub async fn unread_notification_count(&self) -> Result<u64, Error> {
        let url = self.api_url("notifications/unread-count")?;
        self.get_json(url).await
    }
}
