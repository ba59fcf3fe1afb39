//! An in-process publish/subscribe registry for clock events.

use crate::common::HandlerId;
use crate::events::{ClockEvent, EventKind};
use crate::session::SessionSnapshot;
use slotmap::SlotMap;
use std::collections::HashMap;
use tracing::warn;

/// A handler invoked with each event and the state that event left behind.
///
/// Returning `Err` is logged and otherwise ignored; it never affects the
/// clock or any other handler.
pub type EventHandler = Box<dyn Fn(&ClockEvent, &SessionSnapshot) -> anyhow::Result<()> + Send + Sync>;

/// Maps each `EventKind` to an ordered list of independent handlers.
#[derive(Default)]
pub struct EventBus {
    tokens: SlotMap<HandlerId, EventKind>,
    handlers: HashMap<EventKind, Vec<(HandlerId, EventHandler)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`. Handlers run in registration order.
    ///
    /// # Returns
    /// A `HandlerId` that can be passed to `unsubscribe`.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl Fn(&ClockEvent, &SessionSnapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.tokens.insert(kind);
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Registers the same handler for every event kind.
    pub fn subscribe_all<F>(&mut self, handler: F) -> Vec<HandlerId>
    where
        F: Fn(&ClockEvent, &SessionSnapshot) -> anyhow::Result<()> + Clone + Send + Sync + 'static,
    {
        EventKind::ALL
            .iter()
            .map(|kind| self.subscribe(*kind, handler.clone()))
            .collect()
    }

    /// Removes a handler. Returns `true` if it was still registered.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let Some(kind) = self.tokens.remove(id) else {
            return false;
        };
        if let Some(list) = self.handlers.get_mut(&kind) {
            list.retain(|(handler_id, _)| *handler_id != id);
        }
        true
    }

    /// Delivers `event` to every handler registered for its kind.
    pub fn publish(&self, event: &ClockEvent, snapshot: &SessionSnapshot) {
        let Some(list) = self.handlers.get(&event.kind()) else {
            return;
        };
        for (id, handler) in list {
            if let Err(e) = handler(event, snapshot) {
                warn!(
                    "Handler {:?} failed on '{}' event: {:#}",
                    id,
                    event.kind().name(),
                    e
                );
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.tokens.len()
    }
}
