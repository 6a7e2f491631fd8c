// ── Progress stream controller ──
//
// Drives one onboarding request over the streaming endpoint, reporting
// progress as it arrives. Transient stream failures fall back to the
// plain request/response endpoint with a bounded, linearly backed-off
// retry loop; business failures surface immediately.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use iotsync_api::models::{ProgressRecord, StreamErrorRecord};
use iotsync_api::{ApiClient, OnboardingRequest, StreamEvent};

use crate::config::OnboardingConfig;
use crate::error::CoreError;
use crate::model::{OnboardingResult, ProgressEvent};

/// Runs onboarding requests against one backend.
///
/// One `run` at a time per controller; overlapping calls are not
/// coordinated.
pub struct ProgressStreamController {
    api: Arc<ApiClient>,
    config: OnboardingConfig,
}

impl ProgressStreamController {
    pub fn new(api: Arc<ApiClient>, config: OnboardingConfig) -> Self {
        Self { api, config }
    }

    /// Onboard a device, invoking `on_progress` for every progress event.
    ///
    /// Resolves with the normalized result of the `complete` event, or of
    /// the fallback call when the stream failed transiently.
    pub async fn run<F>(
        &self,
        request: &OnboardingRequest,
        mut on_progress: F,
    ) -> Result<OnboardingResult, CoreError>
    where
        F: FnMut(&ProgressEvent) + Send,
    {
        match self.run_stream(request, &mut on_progress).await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, "onboarding stream failed, falling back to plain request");
                self.run_fallback(request, e).await
            }
            outcome => outcome,
        }
    }

    async fn run_stream<F>(
        &self,
        request: &OnboardingRequest,
        on_progress: &mut F,
    ) -> Result<OnboardingResult, CoreError>
    where
        F: FnMut(&ProgressEvent) + Send,
    {
        let idle = self.config.stream_timeout;
        let idle_error = || CoreError::Timeout {
            timeout_secs: idle.as_secs(),
        };

        let stream = timeout(idle, self.api.open_onboarding_stream(request))
            .await
            .map_err(|_| idle_error())??;
        debug!("onboarding stream open");

        let mut events = std::pin::pin!(stream.into_stream());
        let mut received = 0_usize;
        loop {
            let next = timeout(idle, events.next())
                .await
                .map_err(|_| idle_error())?;
            let Some(event) = next.transpose()? else {
                warn!(
                    events = received,
                    "onboarding stream drained without a terminal event"
                );
                return Err(CoreError::StreamIncomplete);
            };
            received += 1;

            match handle_event(event, on_progress) {
                Step::Continue => {}
                Step::Done(outcome) => return outcome,
            }
        }
    }

    async fn run_fallback(
        &self,
        request: &OnboardingRequest,
        cause: CoreError,
    ) -> Result<OnboardingResult, CoreError> {
        let attempts = self.config.fallback_attempts.max(1);
        let mut last = cause;

        for attempt in 1..=attempts {
            info!(attempt, attempts, "non-streaming onboarding attempt");
            match self
                .api
                .onboard_device(request, self.config.request_timeout)
                .await
            {
                Ok(raw) => return OnboardingResult::from_response(raw),
                Err(e) => {
                    let e = CoreError::from(e);
                    if !e.is_transient() {
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "non-streaming onboarding attempt failed");
                    last = e;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.fallback_backoff.saturating_mul(attempt)).await;
            }
        }

        Err(CoreError::FallbackExhausted {
            attempts,
            last: Box::new(last),
        })
    }
}

enum Step {
    Continue,
    Done(Result<OnboardingResult, CoreError>),
}

fn handle_event<F>(event: StreamEvent, on_progress: &mut F) -> Step
where
    F: FnMut(&ProgressEvent),
{
    match event.name.as_str() {
        "progress" => {
            match serde_json::from_value::<ProgressRecord>(event.data) {
                Ok(record) => on_progress(&ProgressEvent::from(record)),
                Err(e) => warn!(error = %e, "skipping malformed progress event"),
            }
            Step::Continue
        }
        "complete" => {
            debug!("onboarding complete");
            Step::Done(OnboardingResult::from_response(event.data))
        }
        "error" => Step::Done(Err(rejection(event.data))),
        other => {
            debug!(event = other, "ignoring stream event");
            Step::Continue
        }
    }
}

fn rejection(data: Value) -> CoreError {
    match serde_json::from_value::<StreamErrorRecord>(data) {
        Ok(record) => CoreError::OnboardingRejected {
            message: record.text().to_owned(),
            retryable: record.retryable,
        },
        Err(e) => {
            warn!(error = %e, "malformed error event");
            CoreError::OnboardingRejected {
                message: "onboarding failed".into(),
                retryable: None,
            }
        }
    }
}
