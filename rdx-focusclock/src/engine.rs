//! The async engine that drives one `SessionClock` in real time.

use crate::clock::{SessionClock, TickHandle};
use crate::common::{Mode, SubscriberId};
use crate::components::broadcaster::{SessionBroadcaster, SubscriberStream, BROADCAST_TRIGGERS};
use crate::components::store::SnapshotStore;
use crate::config::{ConfigPatch, SessionConfig};
use crate::error::{ConfigError, SnapshotError};
use crate::events::{ClockEvent, EventKind};
use crate::session::{ClockState, SessionSnapshot};
use crate::time::{EpochMillis, SystemTimeSource, TimeSource};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, trace, warn};

/// The length of one logical second.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

struct ActiveTicker {
    handle: TickHandle,
    task: JoinHandle<()>,
}

/// The main Focusclock engine.
///
/// This struct owns the session clock behind an async mutex, installs the
/// single per-second ticking task, and wires the clock's events to the
/// broadcaster, the optional snapshot store and a `broadcast` channel. The
/// engine is cheap to clone; every clone is a handle to the same session.
#[derive(Clone)]
pub struct FocusclockEngine {
    clock: Arc<Mutex<SessionClock>>,
    ticker: Arc<std::sync::Mutex<Option<ActiveTicker>>>,
    broadcaster: SessionBroadcaster,
    clock_event_sender: broadcast::Sender<ClockEvent>,
    store: Option<Arc<dyn SnapshotStore>>,
}

// Core implementation block for internal logic.
impl FocusclockEngine {
    /// Creates an engine reading the host's clock, without persistence.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_parts(config, SystemTimeSource, None)
    }

    /// Creates an engine from explicit collaborators.
    ///
    /// Construction never starts a phase, even with `auto_start` set; that
    /// happens in `boot`, after any stored snapshot has been tried. When a
    /// store is given, its `save` runs on every lifecycle and config event
    /// while the clock lock is held (see `SnapshotStore`).
    pub fn with_parts(
        config: SessionConfig,
        time: impl TimeSource + 'static,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        const CHANNEL_CAPACITY: usize = 256;
        let (clock_event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);

        let mut clock = SessionClock::new(config, time);
        let broadcaster = SessionBroadcaster::new(clock.snapshot());
        broadcaster.attach(&mut clock);

        let sender = clock_event_sender.clone();
        clock.subscribe_all(move |event, _| {
            // No receivers is fine.
            sender.send(event.clone()).ok();
            Ok(())
        });

        if let Some(store) = &store {
            for kind in BROADCAST_TRIGGERS.iter().chain([EventKind::Config].iter()) {
                let store = store.clone();
                clock.subscribe(*kind, move |_, snapshot| store.save(snapshot));
            }
        }

        Self {
            clock: Arc::new(Mutex::new(clock)),
            ticker: Arc::new(std::sync::Mutex::new(None)),
            broadcaster,
            clock_event_sender,
            store,
        }
    }

    /// Makes the ticking task match the clock: keeps it if its handle is
    /// still current, otherwise aborts it and installs a new one.
    fn rearm(&self, clock: &SessionClock) {
        let mut slot = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        let wanted = clock.ticking_handle();
        if let (Some(active), Some(handle)) = (slot.as_ref(), wanted) {
            if active.handle == handle && !active.task.is_finished() {
                return;
            }
        }
        if let Some(old) = slot.take() {
            old.task.abort();
        }
        if let Some(handle) = wanted {
            let engine = self.clone();
            let task = tokio::spawn(async move { engine.tick_loop(handle).await });
            *slot = Some(ActiveTicker { handle, task });
        }
    }

    async fn tick_loop(self, mut handle: TickHandle) {
        let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        loop {
            interval.tick().await;
            let mut clock = self.clock.lock().await;
            match clock.tick_with(handle) {
                Some(next) if next != handle => {
                    trace!("Ticker adopted {:?} after auto-advance.", next);
                    handle = next;
                    let mut slot = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Some(active) = slot.as_mut() {
                        active.handle = next;
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    /// Runs `op` against the clock and re-synchronizes the ticking task.
    async fn apply<R>(&self, op: impl FnOnce(&mut SessionClock) -> R) -> R {
        let mut clock = self.clock.lock().await;
        let result = op(&mut clock);
        self.rearm(&clock);
        result
    }
}

// Public API implementation block.
impl FocusclockEngine {
    /// Restores the session from the store if one is attached and holds a
    /// snapshot, otherwise honors `auto_start`. This is the only place
    /// `auto_start` takes effect.
    pub async fn boot(&self) {
        info!("FocusclockEngine starting up...");
        let restored = match &self.store {
            Some(store) => store.load().unwrap_or_else(|e| {
                warn!("Could not load stored snapshot: {:#}", e);
                None
            }),
            None => None,
        };
        self.apply(|clock| {
            if let Some(snapshot) = restored {
                if let Err(e) = clock.rehydrate(snapshot) {
                    warn!("Stored snapshot rejected: {}", e);
                }
            } else if clock.config().auto_start {
                clock.start(None, None);
            }
        })
        .await;
    }

    /// Keeps the engine running until Ctrl+C, then shuts it down.
    ///
    /// Call `boot` first if the session should be restored from the store.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Engine running. Press Ctrl+C to shut down.");
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received.");
        self.shutdown().await?;
        info!("FocusclockEngine has shut down.");
        Ok(())
    }

    /// Stops the ticking task without touching session state, and saves the
    /// final snapshot so a later `boot` resumes where this one left off.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let clock = self.clock.lock().await;
        if let Some(active) = self.ticker.lock().unwrap_or_else(PoisonError::into_inner).take() {
            active.task.abort();
        }
        if let Some(store) = &self.store {
            store.save(&clock.snapshot())?;
        }
        Ok(())
    }

    pub async fn start(&self, mode: Option<Mode>, resume_from: Option<EpochMillis>) {
        self.apply(|clock| clock.start(mode, resume_from)).await;
    }

    pub async fn pause(&self) {
        self.apply(SessionClock::pause).await;
    }

    pub async fn resume(&self) {
        self.apply(SessionClock::resume).await;
    }

    pub async fn stop(&self) {
        self.apply(SessionClock::stop).await;
    }

    /// Starts the phase a completed phase is waiting on. See `SessionClock::advance`.
    pub async fn advance(&self) -> bool {
        self.apply(SessionClock::advance).await
    }

    pub async fn set_configuration(&self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        self.apply(|clock| clock.set_configuration(patch)).await
    }

    pub async fn rehydrate(&self, snapshot: SessionSnapshot) -> Result<(), SnapshotError> {
        self.apply(|clock| clock.rehydrate(snapshot)).await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.clock.lock().await.snapshot()
    }

    pub async fn state(&self) -> ClockState {
        self.clock.lock().await.state()
    }

    pub async fn config(&self) -> SessionConfig {
        self.clock.lock().await.config().clone()
    }

    /// Attaches a broadcast subscriber. Its first message is a snapshot taken now.
    pub async fn subscribe(&self, id: impl Into<SubscriberId>) -> SubscriberStream {
        let clock = self.clock.lock().await;
        self.broadcaster.refresh(clock.snapshot());
        self.broadcaster.subscribe(id)
    }

    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// Subscribes to every `ClockEvent`, ticks included.
    pub fn subscribe_clock_events(&self) -> broadcast::Receiver<ClockEvent> {
        self.clock_event_sender.subscribe()
    }
}
