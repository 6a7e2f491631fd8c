// Onboarding endpoints
//
// The same multipart request can go to two places: the streaming endpoint
// answers with `text/event-stream` progress, the plain one blocks until
// the device is created and answers with JSON.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::client::{ApiClient, check_status, parse_json};
use crate::error::Error;
use crate::models::OnboardingRequest;
use crate::stream::EventStream;

impl ApiClient {
    /// Open the progress stream for an onboarding request.
    ///
    /// `POST /api/devices/unified-onboarding-stream`
    ///
    /// Resolves as soon as response headers arrive; the body is read
    /// incrementally through the returned [`EventStream`]. No whole-request
    /// timeout is applied here, the caller owns the idle deadline.
    pub async fn open_onboarding_stream(
        &self,
        request: &OnboardingRequest,
    ) -> Result<EventStream, Error> {
        let url = self.api_url("devices/unified-onboarding-stream")?;
        debug!(url = %url, "opening onboarding stream");

        let form = request.to_form()?;
        let builder = self
            .authorize(self.http().post(url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .multipart(form);
        let resp = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let resp = check_status(resp).await?;
        Ok(EventStream::new(resp))
    }

    /// Non-streaming onboarding call.
    ///
    /// `POST /api/devices/unified-onboarding`
    ///
    /// Returns the raw JSON so the caller can normalize either response
    /// shape (bare device, or `{device, pdfData}`).
    pub async fn onboard_device(
        &self,
        request: &OnboardingRequest,
        timeout: Duration,
    ) -> Result<Value, Error> {
        let url = self.api_url("devices/unified-onboarding")?;
        debug!(url = %url, timeout_secs = timeout.as_secs(), "onboarding (non-streaming)");

        let form = request.to_form()?;
        let builder = self
            .authorize(self.http().post(url).timeout(timeout))
            .multipart(form);
        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                Error::Transport(e)
            }
        })?;
        parse_json(check_status(resp).await?).await
    }
}
