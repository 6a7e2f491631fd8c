// ── Polling channel ──
//
// Timer-driven snapshot diffing for when no live channel is available.
// One immediate poll, then a fixed interval. A failed poll is reported
// and the interval keeps running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use iotsync_api::ApiClient;

use crate::error::CoreError;
use crate::model::{Device, InboundEvent, SessionIdentity, SyncEvent};

/// Where polled events go.
pub type EventSink = Arc<dyn Fn(SyncEvent) + Send + Sync>;

/// Full device collection provider.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn fetch_devices(&self) -> Result<Vec<Device>, CoreError>;
}

#[async_trait]
impl DeviceSource for ApiClient {
    async fn fetch_devices(&self) -> Result<Vec<Device>, CoreError> {
        let records = self.list_devices().await?;
        Ok(records.into_iter().map(Device::from).collect())
    }
}

/// Diff two consecutive snapshots.
///
/// Only appended records are reported as created, and a shrinking
/// collection yields one [`SyncEvent::DevicesRemoved`] without naming the
/// missing records. Status changes are matched by id.
pub fn diff_snapshots(previous: &[Device], current: &[Device]) -> Vec<SyncEvent> {
    let mut events = Vec::new();

    if current.len() > previous.len() {
        events.extend(current[previous.len()..].iter().map(|device| {
            SyncEvent::Inbound(InboundEvent::DeviceCreated {
                device: device.clone(),
            })
        }));
    } else if current.len() < previous.len() {
        events.push(SyncEvent::DevicesRemoved {
            previous: previous.len(),
            current: current.len(),
        });
    }

    let before: HashMap<&str, &Device> = previous.iter().map(|d| (d.id.as_str(), d)).collect();
    for device in current {
        if let Some(old) = before.get(device.id.as_str()) {
            if old.status != device.status {
                events.push(SyncEvent::Inbound(InboundEvent::DeviceStatusChanged {
                    device_id: device.id.clone(),
                    status: device.status,
                    device_name: Some(device.name.clone()),
                    updated_at: device.updated_at,
                }));
            }
        }
    }

    events
}

struct PollShared {
    source: Arc<dyn DeviceSource>,
    sink: EventSink,
    snapshot: Mutex<Option<Vec<Device>>>,
    /// Serializes interval polls with `trigger_poll`.
    in_flight: tokio::sync::Mutex<()>,
}

impl PollShared {
    async fn poll_once(&self) {
        let _guard = self.in_flight.lock().await;

        let devices = match self.source.fetch_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "device poll failed");
                (self.sink)(SyncEvent::PollFailed {
                    message: e.to_string(),
                });
                return;
            }
        };

        let events = {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
            let events = snapshot
                .as_deref()
                .map(|previous| diff_snapshots(previous, &devices))
                .unwrap_or_default();
            *snapshot = Some(devices);
            events
        };

        debug!(changes = events.len(), "device poll complete");
        for event in events {
            (self.sink)(event);
        }
    }
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fixed-interval device poller.
pub struct PollingChannel {
    shared: Arc<PollShared>,
    interval: Duration,
    task: Mutex<Option<PollTask>>,
}

impl PollingChannel {
    pub fn new(source: Arc<dyn DeviceSource>, interval: Duration, sink: EventSink) -> Self {
        Self {
            shared: Arc::new(PollShared {
                source,
                sink,
                snapshot: Mutex::new(None),
                in_flight: tokio::sync::Mutex::new(()),
            }),
            interval,
            task: Mutex::new(None),
        }
    }

    /// Start polling. No-op while already active.
    pub fn start(&self, identity: &SessionIdentity) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("poller already active");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.shared),
            self.interval,
            cancel.clone(),
        ));
        debug!(
            tenant = %identity.tenant,
            interval_secs = self.interval.as_secs(),
            "device polling started"
        );
        *task = Some(PollTask { cancel, handle });
    }

    /// Stop polling and forget the last snapshot.
    ///
    /// A poll in flight is abandoned; once this returns no further events
    /// reach the sink and the next `start` takes a fresh baseline.
    pub async fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(PollTask { cancel, handle }) = task {
            cancel.cancel();
            handle.abort();
            if let Some(panic) = handle.await.err().filter(JoinError::is_panic) {
                warn!(error = %panic, "poll task panicked");
            }
            debug!("device polling stopped");
        }
        *self
            .shared
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Poll right now, outside the interval.
    pub async fn trigger_poll(&self) {
        self.shared.poll_once().await;
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

impl Drop for PollingChannel {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

async fn poll_loop(shared: Arc<PollShared>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = shared.poll_once() => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;
    use url::Url;

    use super::*;
    use crate::model::DeviceStatus;

    fn device(id: &str, status: DeviceStatus) -> Device {
        Device {
            id: id.into(),
            name: id.to_uppercase(),
            status,
            location: None,
            manufacturer: None,
            model: None,
            organization_id: None,
            last_seen: None,
            updated_at: None,
        }
    }

    fn online(ids: &[&str]) -> Vec<Device> {
        ids.iter().map(|id| device(id, DeviceStatus::Online)).collect()
    }

    struct Scripted(Mutex<VecDeque<Result<Vec<Device>, CoreError>>>);

    #[async_trait]
    impl DeviceSource for Scripted {
        async fn fetch_devices(&self) -> Result<Vec<Device>, CoreError> {
            self.0.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn collector() -> (EventSink, Arc<Mutex<Vec<SyncEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: EventSink =
            Arc::new(move |event: SyncEvent| sink_seen.lock().unwrap().push(event));
        (sink, seen)
    }

    #[test]
    fn appended_device_is_created() {
        let events = diff_snapshots(&online(&["a", "b"]), &online(&["a", "b", "c"]));
        assert_eq!(events.len(), 1);
        let SyncEvent::Inbound(InboundEvent::DeviceCreated { device }) = &events[0] else {
            panic!("expected DeviceCreated, got {events:?}");
        };
        assert_eq!(device.id, "c");
    }

    #[test]
    fn shrinking_collection_signals_removal() {
        let events = diff_snapshots(&online(&["a", "b", "c"]), &online(&["a", "c"]));
        assert_eq!(
            events,
            [SyncEvent::DevicesRemoved {
                previous: 3,
                current: 2
            }]
        );
    }

    #[test]
    fn status_change_is_matched_by_id() {
        let previous = online(&["a", "b"]);
        let current = vec![device("b", DeviceStatus::Error), device("a", DeviceStatus::Online)];
        let events = diff_snapshots(&previous, &current);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            SyncEvent::Inbound(InboundEvent::DeviceStatusChanged {
                device_id,
                status: DeviceStatus::Error,
                ..
            }) if device_id == "b"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_does_not_stop_interval() {
        let source = Arc::new(Scripted(Mutex::new(VecDeque::from([
            Ok(online(&["a", "b"])),
            Err(CoreError::ConnectionFailed {
                reason: "connection reset".into(),
                transient: true,
            }),
            Ok(online(&["a", "b", "c"])),
        ]))));
        let (sink, seen) = collector();
        let poller = PollingChannel::new(source, Duration::from_secs(5), sink);
        let identity =
            SessionIdentity::new("org-1", Url::parse("ws://localhost/ws").unwrap());

        poller.start(&identity);
        assert!(poller.is_active());

        // Baseline poll only.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(matches!(
            seen.lock().unwrap().as_slice(),
            [SyncEvent::PollFailed { .. }]
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert!(matches!(
                &seen[1],
                SyncEvent::Inbound(InboundEvent::DeviceCreated { device }) if device.id == "c"
            ));
        }

        poller.stop().await;
        assert!(!poller.is_active());
    }

    /// Baseline `[a, b]`, then a fetch that takes 10s, then `[a]`.
    struct Stalling(AtomicU32);

    #[async_trait]
    impl DeviceSource for Stalling {
        async fn fetch_devices(&self) -> Result<Vec<Device>, CoreError> {
            match self.0.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(online(&["a", "b"])),
                1 => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(online(&["a", "b", "c"]))
                }
                _ => Ok(online(&["a"])),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_abandons_poll_in_flight() {
        let (sink, seen) = collector();
        let poller = PollingChannel::new(
            Arc::new(Stalling(AtomicU32::new(0))),
            Duration::from_secs(5),
            sink,
        );
        let identity =
            SessionIdentity::new("org-1", Url::parse("ws://localhost/ws").unwrap());

        poller.start(&identity);
        // Second poll started at 5s and is still waiting on the source.
        tokio::time::sleep(Duration::from_secs(6)).await;
        poller.stop().await;
        assert!(!poller.is_active());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(seen.lock().unwrap().is_empty());

        // Restart takes a fresh baseline instead of diffing `[a]` against
        // an old snapshot.
        poller.start(&identity);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(seen.lock().unwrap().is_empty());
        poller.stop().await;
    }

    #[tokio::test]
    async fn trigger_poll_diffs_against_last_snapshot() {
        let source = Arc::new(Scripted(Mutex::new(VecDeque::from([
            Ok(online(&["a", "b", "c"])),
            Ok(online(&["a", "c"])),
        ]))));
        let (sink, seen) = collector();
        let poller = PollingChannel::new(source, Duration::from_secs(5), sink);

        poller.trigger_poll().await;
        poller.trigger_poll().await;

        assert_eq!(
            *seen.lock().unwrap(),
            [SyncEvent::DevicesRemoved {
                previous: 3,
                current: 2
            }]
        );
    }
}
