//! Fans full session snapshots out to any number of independent observers.
//!
//! Every subscriber gets its own bounded channel. A new subscriber first
//! receives one `Snapshot` message with the latest known state, then an
//! `Update` for every state change. Messages always carry the whole
//! snapshot so a receiver never has to keep state of its own.
//!
//! The transport holding a `SubscriberStream` must keep draining it. A
//! subscriber whose buffer is full when an update arrives is dropped, just
//! like a disconnected one, and its stream ends after the queued messages.

use crate::clock::SessionClock;
use crate::common::{HandlerId, SubscriberId};
use crate::error::DeliveryError;
use crate::events::{BroadcastMessage, EventKind};
use crate::session::SessionSnapshot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

/// Clock events that change what an observer should display.
pub const BROADCAST_TRIGGERS: [EventKind; 5] = [
    EventKind::Start,
    EventKind::Paused,
    EventKind::Resumed,
    EventKind::Stopped,
    EventKind::Completed,
];

/// Messages buffered per subscriber before it counts as lagging.
pub const SUBSCRIBER_BUFFER: usize = 64;

struct Inner {
    latest: SessionSnapshot,
    subscribers: HashMap<SubscriberId, mpsc::Sender<BroadcastMessage>>,
    capacity: usize,
}

/// A cloneable handle to one session's subscriber registry.
#[derive(Clone)]
pub struct SessionBroadcaster {
    inner: Arc<Mutex<Inner>>,
}

/// The receiving end handed to the transport for one subscriber.
#[derive(Debug)]
pub struct SubscriberStream {
    id: SubscriberId,
    rx: mpsc::Receiver<BroadcastMessage>,
}

impl SubscriberStream {
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Waits for the next message. Returns `None` once the subscriber has
    /// been removed and everything already queued was read.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        self.rx.recv().await
    }

    /// Returns an already queued message without waiting.
    pub fn try_recv(&mut self) -> Option<BroadcastMessage> {
        self.rx.try_recv().ok()
    }
}

impl SessionBroadcaster {
    pub fn new(initial: SessionSnapshot) -> Self {
        Self::with_capacity(initial, SUBSCRIBER_BUFFER)
    }

    /// Like `new`, buffering at most `capacity` messages per subscriber.
    pub fn with_capacity(initial: SessionSnapshot, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                latest: initial,
                subscribers: HashMap::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers handlers on `clock` so that every lifecycle change is
    /// published to subscribers.
    pub fn attach(&self, clock: &mut SessionClock) -> Vec<HandlerId> {
        self.refresh(clock.snapshot());
        BROADCAST_TRIGGERS
            .iter()
            .map(|kind| {
                let broadcaster = self.clone();
                clock.subscribe(*kind, move |event, snapshot| {
                    broadcaster.publish(event.kind(), snapshot.clone());
                    Ok(())
                })
            })
            .collect()
    }

    /// Registers `id` and immediately queues one `Snapshot` message.
    ///
    /// Subscribing again under an existing id replaces the old stream.
    pub fn subscribe(&self, id: impl Into<SubscriberId>) -> SubscriberStream {
        let id = id.into();
        let mut inner = self.lock();
        let (tx, rx) = mpsc::channel(inner.capacity);
        // Fresh channel with a live receiver: this send cannot fail.
        tx.try_send(BroadcastMessage::Snapshot(inner.latest.clone())).ok();
        if inner.subscribers.insert(id.clone(), tx).is_some() {
            debug!("Subscriber {} re-subscribed; previous stream closed.", id);
        } else {
            debug!("Subscriber {} joined.", id);
        }
        SubscriberStream { id, rx }
    }

    /// Removes `id`. Removing an unknown id is not an error.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = self.lock().subscribers.remove(id).is_some();
        if removed {
            debug!("Subscriber {} left.", id);
        }
        removed
    }

    /// Stores `snapshot` as the latest state and pushes it to every
    /// subscriber. Subscribers whose channel is gone or full are dropped;
    /// the others are unaffected.
    ///
    /// # Returns
    /// The number of subscribers the update was delivered to.
    pub fn publish(&self, kind: EventKind, snapshot: SessionSnapshot) -> usize {
        let mut inner = self.lock();
        inner.latest = snapshot;
        let mut failed = Vec::new();
        let mut delivered = 0;
        for (id, tx) in &inner.subscribers {
            match tx.try_send(BroadcastMessage::Update(inner.latest.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => failed.push(DeliveryError::Lagging(id.clone())),
                Err(TrySendError::Closed(_)) => {
                    failed.push(DeliveryError::Disconnected(id.clone()))
                }
            }
        }
        for failure in failed {
            warn!("Dropping subscriber after '{}' update: {}", kind.name(), failure);
            inner.subscribers.remove(failure.subscriber());
        }
        trace!("Published '{}' to {} subscriber(s).", kind.name(), delivered);
        delivered
    }

    /// Replaces the latest snapshot without notifying anyone. Used so that
    /// late joiners see current counters.
    pub fn refresh(&self, snapshot: SessionSnapshot) {
        self.lock().latest = snapshot;
    }

    pub fn latest(&self) -> SessionSnapshot {
        self.lock().latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}
