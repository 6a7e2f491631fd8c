// Device endpoints
//
// Read-only views the sync layer needs: the full collection (polling
// source) and the aggregate counters.

use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::models::{DeviceRecord, DeviceStatsRecord};

impl ApiClient {
    /// List every device visible to the caller.
    ///
    /// `GET /api/devices` (no pagination)
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.api_url("devices")?;
        debug!("listing devices");
        self.get_json(url).await
    }

    /// Aggregate status counts for the caller's organization.
    ///
    /// `GET /api/devices/stats`
    pub async fn device_stats(&self) -> Result<DeviceStatsRecord, Error> {
        let url = self.api_url("devices/stats")?;
        debug!("fetching device stats");
        self.get_json(url).await
    }
}
