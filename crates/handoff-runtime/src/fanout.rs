//! Event channel and fan-out to connected observers.
//!
//! Producers push events onto a single unbounded channel via
//! [`EventFanout::publish`]. A broadcaster task drains the channel and copies
//! each event into every subscriber's own unbounded queue. A push to a queue
//! whose consumer has disappeared prunes that queue; the broadcaster itself
//! never stops on delivery failure.
//!
//! Delivery is best effort: observers only see events published while they
//! are subscribed. The poll path in [`sessions`] covers late subscribers.
//!
//! [`sessions`]: crate::sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use handoff_core::HandoffEvent;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One observer's unbounded event queue.
struct ObserverQueue {
    id: u64,
    tx: mpsc::UnboundedSender<HandoffEvent>,
}

/// Single-producer-channel, multi-observer event fan-out.
pub struct EventFanout {
    channel_tx: mpsc::UnboundedSender<HandoffEvent>,
    /// Receiving half of the channel, taken by [`spawn_broadcaster`].
    ///
    /// [`spawn_broadcaster`]: EventFanout::spawn_broadcaster
    inbox: Mutex<Option<mpsc::UnboundedReceiver<HandoffEvent>>>,
    observers: Mutex<Vec<ObserverQueue>>,
    next_observer_id: AtomicU64,
}

impl EventFanout {
    /// Create a fanout with an empty observer list.
    #[must_use]
    pub fn new() -> Self {
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        Self {
            channel_tx,
            inbox: Mutex::new(Some(channel_rx)),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
        }
    }

    /// Queue an event for broadcast.
    ///
    /// Returns the number of observers subscribed at publish time, which is
    /// what "delivered" means for the pending-request poll path: an event
    /// published with zero observers reaches nobody until polled.
    pub fn publish(&self, event: HandoffEvent) -> usize {
        counter!("handoff_events_published_total").increment(1);
        let observers = self.observers.lock().len();
        // Send only fails when the broadcaster-side receiver is gone, which
        // cannot happen while `self` holds `channel_tx`.
        let _ = self.channel_tx.send(event);
        observers
    }

    /// Register a new observer queue.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut observers = self.observers.lock();
        observers.push(ObserverQueue { id, tx });
        #[allow(clippy::cast_precision_loss)]
        gauge!("handoff_observers").set(observers.len() as f64);
        debug!(observer_id = id, "observer subscribed");
        Subscription {
            id,
            rx,
            fanout: Arc::downgrade(self),
        }
    }

    /// Remove an observer queue by id. Idempotent.
    pub fn unsubscribe(&self, id: u64) {
        let mut observers = self.observers.lock();
        observers.retain(|obs| obs.id != id);
        #[allow(clippy::cast_precision_loss)]
        gauge!("handoff_observers").set(observers.len() as f64);
    }

    /// Number of currently subscribed observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Spawn the broadcaster task: drain the channel, copy each event to
    /// every observer queue, prune queues whose consumer disappeared. Exits
    /// when `cancel` fires.
    pub fn spawn_broadcaster(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let Some(mut inbox) = self.inbox.lock().take() else {
            warn!("broadcaster already running");
            return tokio::spawn(async {});
        };
        let fanout = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("broadcaster stopped");
                        break;
                    }
                    event = inbox.recv() => {
                        let Some(event) = event else { break };
                        let delivered = fanout.fan_out(&event);
                        debug!(event_type = event.event_type(), delivered, "broadcast event");
                    }
                }
            }
        })
    }

    /// Copy one event into every live observer queue, pruning dead ones.
    fn fan_out(&self, event: &HandoffEvent) -> usize {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|obs| obs.tx.send(event.clone()).is_ok());
        let pruned = before - observers.len();
        if pruned > 0 {
            counter!("handoff_observer_prunes_total").increment(pruned as u64);
            debug!(pruned, "pruned dead observers");
        }
        observers.len()
    }
}

impl Default for EventFanout {
    fn default() -> Self {
        Self::new()
    }
}

/// An observer's handle on the event stream. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<HandoffEvent>,
    fanout: Weak<EventFanout>,
}

impl Subscription {
    /// Observer id within the fanout.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<HandoffEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<HandoffEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(fanout) = self.fanout.upgrade() {
            fanout.unsubscribe(self.id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
