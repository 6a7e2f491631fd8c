// ── Event dispatch ──
//
// Single fan-out point for everything a session produces. Each event is
// applied to the bound device cache, handed to the registered handler,
// then broadcast to stream subscribers, in that order.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use iotsync_api::websocket::ChannelMessage;

use crate::convert::inbound_event;
use crate::model::{
    Device, DeviceStats, DeviceStatus, InboundEvent, OwnerKey, SessionEnd, SyncEvent,
    TransportTier,
};
use crate::store::CacheStore;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Typed callbacks for session events. Every method defaults to a no-op,
/// so implementors only override what they render.
///
/// Callbacks run on the session task; they must not block.
pub trait SyncHandler: Send + Sync {
    fn on_connection_status_change(&self, _connected: bool) {}

    fn on_device_status_changed(
        &self,
        _device_id: &str,
        _status: DeviceStatus,
        _device_name: Option<&str>,
    ) {
    }

    fn on_device_created(&self, _device: &Device) {}

    fn on_device_deleted(&self, _device_id: &str, _device_name: Option<&str>) {}

    fn on_stats_updated(&self, _stats: &DeviceStats) {}

    /// The polled collection shrank.
    fn on_devices_removed(&self, _previous: usize, _current: usize) {}

    fn on_transport_changed(&self, _tier: TransportTier) {}

    fn on_poll_failed(&self, _message: &str) {}

    /// The session gave up; reconnecting needs a new `connect`.
    fn on_session_ended(&self, _reason: SessionEnd) {}
}

struct CacheBinding {
    store: Arc<CacheStore<Device>>,
    owner: OwnerKey,
}

pub(crate) struct Dispatcher {
    events: broadcast::Sender<Arc<SyncEvent>>,
    handler: RwLock<Option<Arc<dyn SyncHandler>>>,
    cache: RwLock<Option<CacheBinding>>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            events,
            handler: RwLock::new(None),
            cache: RwLock::new(None),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Arc<SyncEvent>> {
        self.events.subscribe()
    }

    pub(crate) fn set_handler(&self, handler: Option<Arc<dyn SyncHandler>>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    pub(crate) fn bind_cache(&self, store: Arc<CacheStore<Device>>, owner: OwnerKey) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) =
            Some(CacheBinding { store, owner });
    }

    /// Decode and dispatch one channel message. Unknown types are dropped.
    pub(crate) fn dispatch_message(&self, message: &ChannelMessage) {
        trace!(kind = %message.kind, destination = ?message.destination, "channel message");
        if let Some(event) = inbound_event(&message.kind, &message.payload) {
            self.emit(SyncEvent::Inbound(event));
        }
    }

    pub(crate) fn connection_status(&self, connected: bool) {
        self.emit(SyncEvent::ConnectionStatus { connected });
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        self.apply_to_cache(&event);

        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            invoke(handler.as_ref(), &event);
        }

        // No receivers is fine: the handler may be the only consumer.
        if self.events.send(Arc::new(event)).is_err() {
            trace!("no event subscribers");
        }
    }

    fn apply_to_cache(&self, event: &SyncEvent) {
        let guard = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let Some(binding) = guard.as_ref() else {
            return;
        };
        let CacheBinding { store, owner } = binding;

        let applied = match event {
            SyncEvent::Inbound(InboundEvent::DeviceCreated { device }) => {
                store.add_one(owner, device.clone())
            }
            SyncEvent::Inbound(InboundEvent::DeviceDeleted { device_id, .. }) => {
                store.remove_one(owner, device_id)
            }
            SyncEvent::Inbound(InboundEvent::DeviceStatusChanged {
                device_id,
                status,
                updated_at,
                ..
            }) => {
                let current = store
                    .get(owner)
                    .and_then(|devices| devices.iter().find(|d| d.id == *device_id).cloned());
                match current {
                    Some(mut device) => {
                        device.status = *status;
                        if updated_at.is_some() {
                            device.updated_at = *updated_at;
                        }
                        store.update_one(owner, device)
                    }
                    None => false,
                }
            }
            SyncEvent::DevicesRemoved { .. } => {
                store.clear(owner);
                true
            }
            _ => return,
        };
        debug!(owner = %owner, applied, "cache patched from live event");
    }
}

fn invoke(handler: &dyn SyncHandler, event: &SyncEvent) {
    match event {
        SyncEvent::ConnectionStatus { connected } => {
            handler.on_connection_status_change(*connected);
        }
        SyncEvent::Inbound(InboundEvent::DeviceStatusChanged {
            device_id,
            status,
            device_name,
            ..
        }) => handler.on_device_status_changed(device_id, *status, device_name.as_deref()),
        SyncEvent::Inbound(InboundEvent::DeviceCreated { device }) => {
            handler.on_device_created(device);
        }
        SyncEvent::Inbound(InboundEvent::DeviceDeleted {
            device_id,
            device_name,
        }) => handler.on_device_deleted(device_id, device_name.as_deref()),
        SyncEvent::Inbound(InboundEvent::StatsUpdated { stats }) => handler.on_stats_updated(stats),
        SyncEvent::DevicesRemoved { previous, current } => {
            handler.on_devices_removed(*previous, *current);
        }
        SyncEvent::TransportChanged { tier } => handler.on_transport_changed(*tier),
        SyncEvent::PollFailed { message } => handler.on_poll_failed(message),
        SyncEvent::SessionEnded { reason } => handler.on_session_ended(*reason),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn device(id: &str, status: DeviceStatus) -> Device {
        Device {
            id: id.into(),
            name: format!("device {id}"),
            status,
            location: None,
            manufacturer: None,
            model: None,
            organization_id: Some("org-1".into()),
            last_seen: None,
            updated_at: None,
        }
    }

    fn message(payload: serde_json::Value) -> ChannelMessage {
        ChannelMessage {
            destination: None,
            kind: payload["type"].as_str().unwrap().to_owned(),
            payload,
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl SyncHandler for Recorder {
        fn on_connection_status_change(&self, connected: bool) {
            self.calls.lock().unwrap().push(format!("status:{connected}"));
        }

        fn on_device_status_changed(
            &self,
            device_id: &str,
            status: DeviceStatus,
            _device_name: Option<&str>,
        ) {
            self.calls.lock().unwrap().push(format!("{device_id}:{status}"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn live_events_patch_bound_cache() {
        let store = Arc::new(CacheStore::new(Duration::from_secs(300)));
        let owner = OwnerKey::new("org-1", "u1");
        store.set(
            owner.clone(),
            vec![device("d1", DeviceStatus::Online), device("d2", DeviceStatus::Online)],
        );

        let dispatcher = Dispatcher::new();
        dispatcher.bind_cache(Arc::clone(&store), owner.clone());

        dispatcher.dispatch_message(&message(json!({
            "type": "DEVICE_STATUS_UPDATE", "deviceId": "d2", "status": "OFFLINE"
        })));
        dispatcher.dispatch_message(&message(json!({
            "type": "DEVICE_CREATED", "device": { "id": "d3", "name": "Fan", "status": "ONLINE" }
        })));
        dispatcher.dispatch_message(&message(json!({
            "type": "DEVICE_DELETED", "deviceId": "d1"
        })));

        let snapshot = store.get(&owner).unwrap();
        let ids: Vec<_> = snapshot.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["d3", "d2"]);
        assert_eq!(snapshot[1].status, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn handler_runs_before_broadcast() {
        let dispatcher = Dispatcher::new();
        let recorder = Arc::new(Recorder::default());
        dispatcher.set_handler(Some(recorder.clone()));
        let mut rx = dispatcher.subscribe();

        dispatcher.connection_status(true);
        dispatcher.dispatch_message(&message(json!({
            "type": "DEVICE_STATUS_UPDATE", "deviceId": "d1", "status": "WARNING"
        })));
        dispatcher.dispatch_message(&message(json!({ "type": "SOMETHING_NEW" })));

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            ["status:true", "d1:WARNING"]
        );
        assert_eq!(
            *rx.recv().await.unwrap(),
            SyncEvent::ConnectionStatus { connected: true }
        );
        assert!(matches!(
            *rx.recv().await.unwrap(),
            SyncEvent::Inbound(InboundEvent::DeviceStatusChanged { .. })
        ));
        assert!(rx.try_recv().is_err());
    }
}
