/// Real-time channel manager
///
/// Wraps the app-supplied `ChannelTransport` with connection bookkeeping,
/// room scoping and listener fan-out. Room-scoped events (messages, typing,
/// read receipts) are dropped unless their room has been joined, so a closed
/// chat screen stops receiving without unregistering the transport.
use crate::error::{EvenLoveError, Result};
use crate::types::{ChannelEvent, ChannelEventKind};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Transport collaborator: the app's socket client.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open the connection for one event. The receiver yields every event
    /// the server pushes; it closes when the connection drops.
    async fn connect(&self, event_id: &str) -> Result<mpsc::UnboundedReceiver<ChannelEvent>>;

    async fn disconnect(&self);

    async fn join_room(&self, match_id: &str) -> Result<()>;

    async fn leave_room(&self, match_id: &str) -> Result<()>;

    /// Broadcast one event to the server for peer delivery.
    async fn emit(&self, event: ChannelEvent) -> Result<()>;
}

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(ChannelEvent) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct ChannelInner {
    connected: bool,
    event_id: Option<String>,
    rooms: HashSet<String>,
    listeners: HashMap<ChannelEventKind, Vec<(ListenerId, Listener)>>,
    next_listener_id: ListenerId,
}

#[derive(Clone)]
pub struct ChannelManager {
    transport: Arc<dyn ChannelTransport>,
    inner: Arc<RwLock<ChannelInner>>,
    pump: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ChannelManager {
    pub fn new(transport: Arc<dyn ChannelTransport>) -> Self {
        Self {
            transport,
            inner: Arc::new(RwLock::new(ChannelInner::default())),
            pump: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.connected
    }

    pub async fn active_event(&self) -> Option<String> {
        self.inner.read().await.event_id.clone()
    }

    /// Connect for one event. No-op when already connected to that event;
    /// a different event tears the old connection down first.
    pub async fn connect(&self, event_id: &str) -> Result<()> {
        {
            let inner = self.inner.read().await;
            if inner.connected && inner.event_id.as_deref() == Some(event_id) {
                debug!("channel already connected to event {}", event_id);
                return Ok(());
            }
        }
        if self.is_connected().await {
            self.disconnect().await;
        }

        let rx = self
            .transport
            .connect(event_id)
            .await
            .map_err(|e| match e {
                EvenLoveError::ChannelConnect(_) => e,
                other => EvenLoveError::ChannelConnect(other.to_string()),
            })?;

        {
            let mut inner = self.inner.write().await;
            inner.connected = true;
            inner.event_id = Some(event_id.to_string());
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run_pump(rx).await });
        // A racing connect may have installed a pump already; keep one alive.
        if let Some(old) = self.pump.lock().await.replace(handle) {
            old.abort();
        }

        info!("channel connected to event {}", event_id);
        Ok(())
    }

    /// Tear down the connection. Safe when already disconnected. Listener
    /// registrations survive a disconnect.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
        let was_connected = {
            let mut inner = self.inner.write().await;
            let was = inner.connected;
            inner.connected = false;
            inner.event_id = None;
            inner.rooms.clear();
            was
        };
        if was_connected {
            self.transport.disconnect().await;
            info!("channel disconnected");
        }
    }

    /// Register a listener for one event kind. Multiple listeners per kind
    /// are supported; all are dispatched.
    pub async fn on<F>(&self, kind: ChannelEventKind, listener: F) -> ListenerId
    where
        F: Fn(ChannelEvent) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().await;
        inner.next_listener_id += 1;
        let id = inner.next_listener_id;
        inner
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    pub async fn off(&self, kind: ChannelEventKind, id: ListenerId) {
        let mut inner = self.inner.write().await;
        if let Some(list) = inner.listeners.get_mut(&kind) {
            list.retain(|(lid, _)| *lid != id);
        }
    }

    pub async fn clear_listeners(&self) {
        self.inner.write().await.listeners.clear();
    }

    /// Join one match's room so its message/typing/read events are delivered.
    pub async fn join_room(&self, match_id: &str) -> Result<()> {
        if !self.is_connected().await {
            return Err(EvenLoveError::ChannelConnect(
                "cannot join room while disconnected".to_string(),
            ));
        }
        self.transport.join_room(match_id).await?;
        self.inner.write().await.rooms.insert(match_id.to_string());
        debug!("joined room {}", match_id);
        Ok(())
    }

    /// Leave a room and stop delivery of its events. Safe if never joined.
    pub async fn leave_room(&self, match_id: &str) {
        let was_member = self.inner.write().await.rooms.remove(match_id);
        if was_member {
            if let Err(e) = self.transport.leave_room(match_id).await {
                warn!("leave_room {} failed: {}", match_id, e);
            }
            debug!("left room {}", match_id);
        }
    }

    /// Send one event to the server for peer delivery.
    pub async fn emit(&self, event: ChannelEvent) -> Result<()> {
        if !self.is_connected().await {
            return Err(EvenLoveError::ChannelConnect(
                "cannot emit while disconnected".to_string(),
            ));
        }
        self.transport.emit(event).await
    }

    async fn run_pump(&self, mut rx: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = rx.recv().await {
            self.dispatch(event).await;
        }
        debug!("channel event stream closed");
    }

    async fn dispatch(&self, event: ChannelEvent) {
        let listeners: Vec<Listener> = {
            let inner = self.inner.read().await;

            // Room-scoped events are only delivered for joined rooms.
            if let Some(room) = event.room() {
                if !inner.rooms.contains(room) {
                    debug!("dropping {:?} for unjoined room {}", event.kind(), room);
                    return;
                }
            }

            inner
                .listeners
                .get(&event.kind())
                .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
                .unwrap_or_default()
        };

        for listener in listeners {
            listener(event.clone()).await;
        }
    }
}
