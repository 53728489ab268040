//! Fan-out of price updates and alert triggers to subscribed clients.
//!
//! Each client owns a private bounded queue drained by its own writer
//! task, so a stalled network write on one client never delays ingest or
//! delivery to others. Price updates are supersede-able and dropped
//! oldest-first under pressure; alert triggers are never dropped - a
//! client that cannot accept one is disconnected.

use crate::{
    alert::AlertTriggered,
    cache::PriceCache,
    protocol::ServerMessage,
    tick::PriceState,
};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub mod registry;

pub use registry::{ChannelFilter, ClientId, ClientKind, SubscriptionRegistry};

/// Default per-client outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<ServerMessage>,
    closed: bool,
}

/// Bounded single-consumer outbound queue for one client.
#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a droppable message (price, snapshot, acks). When full, the
    /// oldest queued price message is evicted in its favour; if nothing is
    /// evictable the incoming message itself is dropped.
    pub fn push(&self, message: ServerMessage) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        if state.items.len() >= self.capacity {
            match state
                .items
                .iter()
                .position(|m| matches!(m, ServerMessage::Price { .. }))
            {
                Some(oldest_price) => {
                    state.items.remove(oldest_price);
                }
                None => {
                    debug!("outbound queue full with undroppable messages, price update dropped");
                    return false;
                }
            }
        }
        state.items.push_back(message);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Enqueue an alert trigger. Returns false when the queue is full -
    /// the caller must disconnect the client, never drop the alert
    /// silently.
    pub fn push_alert(&self, message: ServerMessage) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.items.len() >= self.capacity {
            return false;
        }
        state.items.push_back(message);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Wait for the next message. Returns `None` once the queue has been
    /// closed (close discards anything still pending).
    pub async fn pop(&self) -> Option<ServerMessage> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue, discarding anything still pending, and wake the
    /// consumer.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.items.clear();
        drop(state);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}

/// Handle returned to a connection task for one registered client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: ClientId,
    pub kind: ClientKind,
    pub queue: Arc<OutboundQueue>,
}

/// Routes committed updates to every matching client queue.
#[derive(Debug)]
pub struct BroadcastHub {
    registry: SubscriptionRegistry,
    cache: Arc<PriceCache>,
    queue_capacity: usize,
}

impl BroadcastHub {
    pub fn new(cache: Arc<PriceCache>, queue_capacity: usize) -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            cache,
            queue_capacity,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Register a connection and preload its queue with a full price
    /// snapshot. The preload happens under the registry write lock, so no
    /// update can fall between the snapshot and the first live message.
    pub fn connect(&self, kind: ClientKind) -> ClientHandle {
        let (id, queue) = self.registry.register(kind, self.queue_capacity, |queue| {
            queue.push(ServerMessage::snapshot(self.cache.snapshot()));
        });
        info!(client_id = id, %kind, "client connected");
        ClientHandle { id, kind, queue }
    }

    /// Drop a client: its subscription is removed and its queue drained
    /// and closed. Idempotent.
    pub fn disconnect(&self, id: ClientId) {
        if self.registry.unregister(id) {
            info!(client_id = id, "client disconnected");
        }
    }

    /// Fan one committed price update out to matching clients.
    pub fn publish_price(&self, state: &PriceState) {
        for queue in self.registry.price_targets(&state.symbol) {
            queue.push(ServerMessage::price(state.clone()));
        }
    }

    /// Deliver an alert trigger to every alert subscriber. Clients whose
    /// queues cannot accept it are disconnected - a client too slow to
    /// receive alerts is not meeting its contract.
    pub fn publish_alert(&self, trigger: &AlertTriggered) {
        let mut failed = Vec::new();
        for (id, queue) in self.registry.alert_targets() {
            let delivered = queue.push_alert(ServerMessage::AlertTriggered {
                data: trigger.clone(),
            });
            if !delivered {
                failed.push(id);
            }
        }
        for id in failed {
            warn!(
                client_id = id,
                alert_id = trigger.alert_id,
                "client queue full on alert delivery, disconnecting"
            );
            self.disconnect(id);
        }
    }

    /// Push a direct reply (pong, subscription ack, get_price result) to
    /// one client.
    pub fn reply(&self, id: ClientId, message: ServerMessage) {
        if let Some(queue) = self.registry.queue(id) {
            queue.push(message);
        }
    }
}
