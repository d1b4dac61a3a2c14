use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use signage_types::events::{ChangeAction, DeviceEvent, GatewayEvent, Table};

/// An event addressed to every dashboard connection of one user.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub owner_id: Uuid,
    pub event: GatewayEvent,
}

/// Fans dashboard events out to connected users and pushes device events
/// to connected displays.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every dashboard connection receives every event and keeps its owner's.
    broadcast_tx: broadcast::Sender<Arc<Dispatched>>,

    /// Per-display push channels: display_id -> (conn_id, sender)
    device_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<DeviceEvent>)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                device_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Dispatched>> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an event to all of `owner_id`'s dashboard connections.
    pub fn notify(&self, owner_id: Uuid, event: GatewayEvent) {
        // No receivers just means nobody is watching.
        let _ = self.inner.broadcast_tx.send(Arc::new(Dispatched { owner_id, event }));
    }

    pub fn notify_change(&self, owner_id: Uuid, table: Table, action: ChangeAction, id: Uuid) {
        self.notify(owner_id, GatewayEvent::changed(table, action, id));
    }

    /// Register a display's push channel. A newer connection replaces an older one.
    pub async fn register_device(&self, display_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<DeviceEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .device_channels
            .write()
            .await
            .insert(display_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a display's push channel, but only if conn_id matches.
    pub async fn unregister_device(&self, display_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.device_channels.write().await;
        if channels
            .get(&display_id)
            .is_some_and(|(stored, _)| *stored == conn_id)
        {
            channels.remove(&display_id);
        }
    }

    /// Push an event to a display. Returns `false` when it is not connected.
    pub async fn send_to_display(&self, display_id: Uuid, event: DeviceEvent) -> bool {
        let channels = self.inner.device_channels.read().await;
        match channels.get(&display_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub async fn is_connected(&self, display_id: Uuid) -> bool {
        self.inner.device_channels.read().await.contains_key(&display_id)
    }
}
