//! The session state machine: the single source of truth for one timer.
//!
//! `SessionClock` is synchronous and performs no I/O. It owns the `Session`,
//! the `SessionConfig` and an `EventBus`, and it reads wall-clock time from an
//! injected `TimeSource`. The periodic driver that calls `tick` once per
//! second lives in `engine`; the clock only tracks which ticking handle is
//! current so that a late or stale tick can be told apart and ignored.

use crate::common::{HandlerId, Mode};
use crate::components::bus::EventBus;
use crate::config::{ConfigPatch, SessionConfig};
use crate::error::{ConfigError, SnapshotError};
use crate::events::{ClockEvent, EventKind, TickEvent};
use crate::session::{ClockState, Session, SessionSnapshot};
use crate::time::{format_mm_ss, whole_seconds_between, EpochMillis, TimeSource, MAX_EPOCH_MS};
use tracing::{debug, info, trace, warn};

/// Identifies one installed ticking handle. A new handle is issued every
/// time a phase starts or resumes; at most one is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle(u64);

/// The countdown state machine for one session.
pub struct SessionClock {
    config: SessionConfig,
    session: Session,
    bus: EventBus,
    time: Box<dyn TimeSource>,
    ticking: Option<TickHandle>,
    generation: u64,
    /// The phase chosen by the last completion, if it has not started yet.
    upcoming: Option<Mode>,
}

// Accessors and internal plumbing.
impl SessionClock {
    /// Creates an idle clock parked on the configured start mode.
    pub fn new(config: SessionConfig, time: impl TimeSource + 'static) -> Self {
        let session = Session::idle(&config);
        Self {
            config,
            session,
            bus: EventBus::new(),
            time: Box::new(time),
            ticking: None,
            generation: 0,
            upcoming: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ClockState {
        self.session.state()
    }

    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.session.remaining_seconds
    }

    pub fn formatted_remaining(&self) -> String {
        format_mm_ss(self.session.remaining_seconds)
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking.is_some()
    }

    /// The handle a driver must present to `tick_with`.
    pub fn ticking_handle(&self) -> Option<TickHandle> {
        self.ticking
    }

    /// The phase `advance` would start after a completion without auto-advance.
    pub fn upcoming_mode(&self) -> Option<Mode> {
        self.upcoming
    }

    pub fn now_ms(&self) -> EpochMillis {
        self.time.now_ms()
    }

    /// Registers a handler for one event kind. See `EventBus::subscribe`.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl Fn(&ClockEvent, &SessionSnapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        self.bus.subscribe(kind, handler)
    }

    /// Registers one handler for every event kind.
    pub fn subscribe_all<F>(&mut self, handler: F) -> Vec<HandlerId>
    where
        F: Fn(&ClockEvent, &SessionSnapshot) -> anyhow::Result<()> + Clone + Send + Sync + 'static,
    {
        self.bus.subscribe_all(handler)
    }

    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// An immutable copy of the session and configuration.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(&self.session, &self.config, self.time.now_ms())
    }

    fn emit(&self, event: ClockEvent) {
        let snapshot = self.snapshot();
        self.bus.publish(&event, &snapshot);
    }

    fn tick_event(&self, progress: f64) -> TickEvent {
        TickEvent {
            progress_pct: (progress * 100.0).clamp(0.0, 100.0),
            formatted: format_mm_ss(self.session.remaining_seconds),
            remaining_seconds: self.session.remaining_seconds,
            total_seconds: self.session.total_seconds,
            mode: self.session.mode,
        }
    }

    /// Replaces the current ticking handle with a fresh one.
    fn install_ticker(&mut self) -> TickHandle {
        self.generation += 1;
        let handle = TickHandle(self.generation);
        self.ticking = Some(handle);
        handle
    }

    fn cancel_ticker(&mut self) {
        self.ticking = None;
    }

    /// Picks the phase after `finished`, resetting the cycle counter when a
    /// long rest is due.
    fn next_mode(&mut self, finished: Mode) -> Mode {
        match finished {
            Mode::Work if self.session.cycle_count >= self.config.cycles_before_long_rest => {
                self.session.cycle_count = 0;
                Mode::LongRest
            }
            Mode::Work => Mode::ShortRest,
            Mode::ShortRest | Mode::LongRest => Mode::Work,
        }
    }

    fn reset_idle(&mut self) {
        self.cancel_ticker();
        self.session = Session::idle(&self.config);
        self.upcoming = None;
    }
}

// Public operations.
impl SessionClock {
    /// Starts a phase, or resumes if currently paused.
    ///
    /// # Arguments
    /// * `mode` - The phase to run. Defaults to the configured start mode.
    /// * `resume_from` - A shared epoch the phase started at. Remaining time is
    ///   reconstructed from it instead of starting at the full duration.
    ///   Epochs outside `0..=MAX_EPOCH_MS` are clamped into that range.
    pub fn start(&mut self, mode: Option<Mode>, resume_from: Option<EpochMillis>) {
        if self.session.paused_at_epoch.is_some() {
            self.resume();
            return;
        }
        let mode = mode.unwrap_or(self.config.start_mode);
        let total = self.config.seconds_for(mode);
        let now = self.time.now_ms();

        self.session.mode = mode;
        self.session.total_seconds = total;
        match resume_from {
            Some(epoch) => {
                let epoch = epoch.clamp(0, MAX_EPOCH_MS);
                let elapsed = whole_seconds_between(epoch, now);
                self.session.remaining_seconds = u64::from(total).saturating_sub(elapsed) as u32;
                self.session.phase_start_epoch = Some(epoch);
            }
            None => {
                self.session.remaining_seconds = total;
                self.session.phase_start_epoch = Some(now);
            }
        }
        self.upcoming = None;
        self.cancel_ticker();
        self.install_ticker();
        info!(
            "{} phase started with {} remaining.",
            mode,
            self.formatted_remaining()
        );
        self.emit(ClockEvent::Start { mode });
    }

    /// Freezes the countdown. No-op unless a phase is ticking.
    pub fn pause(&mut self) {
        if self.ticking.is_none() || self.session.paused_at_epoch.is_some() {
            return;
        }
        self.cancel_ticker();
        self.session.paused_at_epoch = Some(self.time.now_ms());
        info!(
            "{} phase paused at {}.",
            self.session.mode,
            self.formatted_remaining()
        );
        self.emit(ClockEvent::Paused {
            mode: self.session.mode,
            remaining_seconds: self.session.remaining_seconds,
        });
    }

    /// Continues a paused phase from its frozen remaining time. No-op unless paused.
    ///
    /// `phase_start_epoch` is rewritten to `now - elapsed`, so that
    /// `total_seconds` and the epoch still reproduce the remaining time.
    pub fn resume(&mut self) {
        if self.session.paused_at_epoch.take().is_none() {
            return;
        }
        let elapsed = self
            .session
            .total_seconds
            .saturating_sub(self.session.remaining_seconds);
        self.session.phase_start_epoch = Some(
            self.time
                .now_ms()
                .saturating_sub(i64::from(elapsed) * 1000)
                .max(0),
        );
        self.install_ticker();
        info!(
            "{} phase resumed at {}.",
            self.session.mode,
            self.formatted_remaining()
        );
        self.emit(ClockEvent::Resumed {
            mode: self.session.mode,
            remaining_seconds: self.session.remaining_seconds,
        });
    }

    /// Cancels ticking and resets to the idle baseline. Emits a final
    /// `tick` at 100% so renderers can reset, then `stopped`.
    pub fn stop(&mut self) {
        self.cancel_ticker();
        self.session.remaining_seconds = 0;
        self.session.paused_at_epoch = None;
        self.session.phase_start_epoch = None;
        self.session.mode = self.config.start_mode;
        self.session.cycle_count = 0;
        self.upcoming = None;

        self.emit(ClockEvent::Tick(self.tick_event(1.0)));
        self.session.total_seconds = self.config.seconds_for(self.config.start_mode);
        info!("Session stopped.");
        self.emit(ClockEvent::Stopped);
    }

    /// Starts the phase chosen by the last completion.
    ///
    /// Returns `false` if no completed phase is waiting to be followed.
    pub fn advance(&mut self) -> bool {
        match self.upcoming {
            Some(next) if self.state() == ClockState::Idle => {
                self.start(Some(next), None);
                true
            }
            _ => false,
        }
    }

    /// Merges `patch` into the configuration.
    ///
    /// A phase already in progress keeps its length. On error the previous
    /// configuration stays in force and nothing is emitted.
    pub fn set_configuration(&mut self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        let next = match self.config.merged(patch) {
            Ok(next) => next,
            Err(e) => {
                warn!("Rejected configuration change: {}", e);
                return Err(e);
            }
        };
        self.config = next;
        if self.state() == ClockState::Idle && self.upcoming.is_none() {
            let cycle_count = self.session.cycle_count;
            self.session = Session::idle(&self.config);
            self.session.cycle_count = cycle_count;
        }
        debug!("Configuration updated: {:?}", self.config);
        self.emit(ClockEvent::Config {
            configuration: self.config.clone(),
        });
        Ok(())
    }

    /// Advances the running phase by one second.
    ///
    /// Does nothing when no phase is ticking, e.g. when a tick races `stop`.
    pub fn tick(&mut self) {
        if self.ticking.is_none() {
            trace!("Tick ignored; clock is not running.");
            return;
        }
        self.session.remaining_seconds = self.session.remaining_seconds.saturating_sub(1);
        trace!(
            "{} {} / {}",
            self.session.mode,
            self.formatted_remaining(),
            format_mm_ss(self.session.total_seconds)
        );
        self.emit(ClockEvent::Tick(self.tick_event(self.session.progress())));
        if self.session.remaining_seconds == 0 {
            self.complete();
        }
    }

    /// Ticks only if `handle` is still the current ticking handle.
    ///
    /// # Returns
    /// The handle the driver should keep using, or `None` if it should stop.
    /// After an auto-advance this is the new phase's handle.
    pub fn tick_with(&mut self, handle: TickHandle) -> Option<TickHandle> {
        if self.ticking != Some(handle) {
            trace!("Stale tick from {:?} ignored.", handle);
            return None;
        }
        self.tick();
        self.ticking
    }

    fn complete(&mut self) {
        self.cancel_ticker();
        let finished = self.session.mode;
        if finished == Mode::Work {
            self.session.cycle_count += 1;
        }
        self.session.phase_start_epoch = None;
        info!(
            "{} phase completed ({} work phase(s) this cycle).",
            finished, self.session.cycle_count
        );
        self.emit(ClockEvent::Completed { mode: finished });

        let next = self.next_mode(finished);
        self.upcoming = Some(next);
        if self.config.auto_advance {
            self.emit(ClockEvent::AutoAdvance {
                from: finished,
                to: next,
            });
            self.start(Some(next), None);
        }
    }

    /// Restores state from an externally supplied snapshot.
    ///
    /// Running snapshots are reconstructed from `phase_start_epoch` against
    /// the current time. An invalid snapshot leaves the clock idle with its
    /// previous configuration.
    pub fn rehydrate(&mut self, snapshot: SessionSnapshot) -> Result<(), SnapshotError> {
        if let Err(e) = snapshot.validate() {
            warn!("Rejected snapshot, falling back to idle: {}", e);
            self.reset_idle();
            self.emit(ClockEvent::Stopped);
            return Err(e);
        }
        self.cancel_ticker();
        self.upcoming = None;
        self.config = snapshot.configuration;
        self.session = Session {
            mode: snapshot.mode,
            cycle_count: snapshot.cycle_count,
            total_seconds: snapshot.total_seconds,
            remaining_seconds: snapshot.remaining_seconds,
            paused_at_epoch: snapshot.paused_at_epoch,
            phase_start_epoch: snapshot.phase_start_epoch,
        };

        match (snapshot.state, snapshot.phase_start_epoch) {
            (ClockState::Running, Some(start)) => {
                let elapsed = whole_seconds_between(start, self.time.now_ms());
                self.session.remaining_seconds =
                    u64::from(self.session.total_seconds).saturating_sub(elapsed) as u32;
                self.install_ticker();
                info!(
                    "Rehydrated running {} phase with {} remaining.",
                    self.session.mode,
                    self.formatted_remaining()
                );
                self.emit(ClockEvent::Start {
                    mode: self.session.mode,
                });
            }
            (ClockState::Paused, _) => {
                info!(
                    "Rehydrated paused {} phase at {}.",
                    self.session.mode,
                    self.formatted_remaining()
                );
                self.emit(ClockEvent::Paused {
                    mode: self.session.mode,
                    remaining_seconds: self.session.remaining_seconds,
                });
            }
            _ => info!("Rehydrated idle session."),
        }
        Ok(())
    }

    /// Decodes a JSON snapshot and rehydrates from it.
    pub fn rehydrate_json(&mut self, raw: &str) -> Result<(), SnapshotError> {
        match serde_json::from_str::<SessionSnapshot>(raw) {
            Ok(snapshot) => self.rehydrate(snapshot),
            Err(e) => {
                warn!("Undecodable snapshot, falling back to idle: {}", e);
                self.reset_idle();
                self.emit(ClockEvent::Stopped);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTime;
    use std::sync::{Arc, Mutex};

    const T0: EpochMillis = 1_700_000_000_000;

    fn recording_clock(config: SessionConfig) -> (SessionClock, ManualTime, Arc<Mutex<Vec<ClockEvent>>>) {
        let time = ManualTime::new(T0);
        let mut clock = SessionClock::new(config, time.clone());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        clock.subscribe_all(move |event, _| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        (clock, time, events)
    }

    fn short_config() -> SessionConfig {
        SessionConfig {
            work_minutes: 1,
            short_rest_minutes: 1,
            long_rest_minutes: 2,
            ..SessionConfig::default()
        }
    }

    fn run_ticks(clock: &mut SessionClock, time: &ManualTime, n: u32) {
        for _ in 0..n {
            time.advance_secs(1);
            clock.tick();
        }
    }

    fn kinds(events: &Arc<Mutex<Vec<ClockEvent>>>) -> Vec<EventKind> {
        events.lock().unwrap().iter().map(ClockEvent::kind).collect()
    }

    #[test]
    fn new_clock_is_idle() {
        let (clock, _, events) = recording_clock(SessionConfig::default());
        assert_eq!(clock.state(), ClockState::Idle);
        assert!(!clock.is_ticking());
        assert_eq!(clock.session().total_seconds, 1500);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn start_sets_full_duration_and_epoch() {
        let (mut clock, _, events) = recording_clock(SessionConfig::default());
        clock.start(None, None);
        assert_eq!(clock.mode(), Mode::Work);
        assert_eq!(clock.remaining_seconds(), 1500);
        assert_eq!(clock.session().phase_start_epoch, Some(T0));
        assert_eq!(clock.state(), ClockState::Running);
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[ClockEvent::Start { mode: Mode::Work }]
        );
    }

    #[test]
    fn ticks_decrement_monotonically() {
        let (mut clock, time, events) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        for n in 1..=100u32 {
            run_ticks(&mut clock, &time, 1);
            assert_eq!(clock.remaining_seconds(), 1500 - n);
        }
        let last = events.lock().unwrap().last().cloned();
        match last {
            Some(ClockEvent::Tick(tick)) => {
                assert_eq!(tick.remaining_seconds, 1400);
                assert_eq!(tick.total_seconds, 1500);
                assert_eq!(tick.formatted, "23:20");
                assert!((tick.progress_pct - 100.0 / 15.0).abs() < 1e-9);
            }
            other => panic!("expected tick, got {:?}", other),
        }
    }

    #[test]
    fn start_from_epoch_reconstructs_remaining() {
        let (mut clock, time, _) = recording_clock(SessionConfig::default());
        time.advance_ms(37_400);
        clock.start(Some(Mode::Work), Some(T0));
        assert_eq!(clock.remaining_seconds(), 1463);
        assert_eq!(clock.session().phase_start_epoch, Some(T0));
    }

    #[test]
    fn start_from_ancient_epoch_clamps_to_zero() {
        let (mut clock, time, _) = recording_clock(SessionConfig::default());
        time.advance_secs(10_000);
        clock.start(Some(Mode::ShortRest), Some(T0));
        assert_eq!(clock.remaining_seconds(), 0);
    }

    #[test]
    fn start_from_out_of_range_epoch_clamps_instead_of_panicking() {
        let (mut clock, _, events) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), Some(i64::MIN));
        assert_eq!(clock.remaining_seconds(), 0);
        assert_eq!(clock.session().phase_start_epoch, Some(0));
        assert!(clock.snapshot().validate().is_ok());

        clock.start(Some(Mode::Work), Some(i64::MAX));
        assert_eq!(clock.remaining_seconds(), 1500);
        assert_eq!(clock.session().phase_start_epoch, Some(MAX_EPOCH_MS));
        assert_eq!(
            kinds(&events),
            vec![EventKind::Start, EventKind::Start]
        );
    }

    #[test]
    fn pause_freezes_and_is_idempotent() {
        let (mut clock, time, events) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 10);
        clock.pause();
        clock.pause();
        assert_eq!(clock.remaining_seconds(), 1490);
        assert_eq!(clock.state(), ClockState::Paused);
        assert!(!clock.is_ticking());

        let paused = kinds(&events)
            .into_iter()
            .filter(|k| *k == EventKind::Paused)
            .count();
        assert_eq!(paused, 1);

        // Ticks while paused change nothing.
        run_ticks(&mut clock, &time, 5);
        assert_eq!(clock.remaining_seconds(), 1490);
    }

    #[test]
    fn resume_continues_from_frozen_value() {
        let (mut clock, time, events) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 10);
        clock.pause();
        time.advance_secs(600);
        clock.resume();
        assert_eq!(clock.remaining_seconds(), 1490);
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&ClockEvent::Resumed {
                mode: Mode::Work,
                remaining_seconds: 1490
            })
        );
        run_ticks(&mut clock, &time, 1);
        assert_eq!(clock.remaining_seconds(), 1489);
    }

    #[test]
    fn resume_keeps_epoch_consistent_with_remaining() {
        let (mut clock, time, _) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 10);
        clock.pause();
        time.advance_secs(600);
        clock.resume();
        let snapshot = clock.snapshot();
        assert_eq!(snapshot.remaining_at(clock.now_ms()), 1490);
    }

    #[test]
    fn start_while_paused_resumes() {
        let (mut clock, time, _) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 3);
        clock.pause();
        clock.start(Some(Mode::LongRest), None);
        assert_eq!(clock.mode(), Mode::Work);
        assert_eq!(clock.remaining_seconds(), 1497);
        assert_eq!(clock.state(), ClockState::Running);
    }

    #[test]
    fn resume_and_pause_are_noops_when_idle() {
        let (mut clock, _, events) = recording_clock(SessionConfig::default());
        clock.resume();
        clock.pause();
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn stop_emits_final_tick_then_stopped() {
        let (mut clock, time, events) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::ShortRest), None);
        run_ticks(&mut clock, &time, 4);
        events.lock().unwrap().clear();

        clock.stop();
        let recorded = events.lock().unwrap().clone();
        assert_eq!(recorded.len(), 2);
        match &recorded[0] {
            ClockEvent::Tick(tick) => {
                assert_eq!(tick.progress_pct, 100.0);
                assert_eq!(tick.remaining_seconds, 0);
                assert_eq!(tick.formatted, "00:00");
                assert_eq!(tick.total_seconds, 300);
            }
            other => panic!("expected final tick, got {:?}", other),
        }
        assert_eq!(recorded[1], ClockEvent::Stopped);
        assert_eq!(clock.state(), ClockState::Idle);
        assert_eq!(clock.mode(), Mode::Work);
    }

    #[test]
    fn stop_twice_yields_identical_idle_state() {
        let (mut clock, time, _) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::ShortRest), None);
        run_ticks(&mut clock, &time, 2);
        clock.stop();
        let first = clock.session().clone();
        clock.stop();
        assert_eq!(clock.session(), &first);
        assert_eq!(first.cycle_count, 0);
        assert_eq!(first.remaining_seconds, 0);
    }

    #[test]
    fn stale_handle_is_ignored_after_stop() {
        let (mut clock, _, _) = recording_clock(SessionConfig::default());
        clock.start(None, None);
        let handle = clock.ticking_handle().unwrap();
        clock.stop();
        assert_eq!(clock.tick_with(handle), None);
        assert_eq!(clock.remaining_seconds(), 0);
    }

    #[test]
    fn restart_issues_a_new_handle() {
        let (mut clock, _, _) = recording_clock(SessionConfig::default());
        clock.start(None, None);
        let first = clock.ticking_handle().unwrap();
        clock.start(Some(Mode::ShortRest), None);
        let second = clock.ticking_handle().unwrap();
        assert_ne!(first, second);
        assert_eq!(clock.tick_with(first), None);
        assert_eq!(clock.tick_with(second), Some(second));
        assert_eq!(clock.remaining_seconds(), 299);
    }

    #[test]
    fn completion_auto_advances_to_short_rest() {
        let (mut clock, time, events) = recording_clock(short_config());
        clock.start(Some(Mode::Work), None);
        events.lock().unwrap().clear();
        let handle = clock.ticking_handle().unwrap();
        for _ in 0..59 {
            time.advance_secs(1);
            assert_eq!(clock.tick_with(handle), Some(handle));
        }
        time.advance_secs(1);
        let next = clock.tick_with(handle).expect("auto-advance keeps ticking");
        assert_ne!(next, handle);

        assert_eq!(clock.mode(), Mode::ShortRest);
        assert_eq!(clock.session().cycle_count, 1);
        let tail: Vec<_> = events.lock().unwrap().iter().rev().take(3).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                ClockEvent::Completed { mode: Mode::Work },
                ClockEvent::AutoAdvance {
                    from: Mode::Work,
                    to: Mode::ShortRest
                },
                ClockEvent::Start {
                    mode: Mode::ShortRest
                },
            ]
        );
    }

    #[test]
    fn completion_without_auto_advance_waits() {
        let config = SessionConfig {
            auto_advance: false,
            ..short_config()
        };
        let (mut clock, time, events) = recording_clock(config);
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 60);
        assert_eq!(clock.state(), ClockState::Idle);
        assert!(!clock.is_ticking());
        assert_eq!(clock.upcoming_mode(), Some(Mode::ShortRest));
        assert!(!kinds(&events).contains(&EventKind::AutoAdvance));

        // Further ticks are ignored.
        run_ticks(&mut clock, &time, 3);
        assert_eq!(clock.remaining_seconds(), 0);

        assert!(clock.advance());
        assert_eq!(clock.mode(), Mode::ShortRest);
        assert_eq!(clock.remaining_seconds(), 60);
        assert!(!clock.advance());
    }

    #[test]
    fn long_rest_follows_configured_cycle_count() {
        let (mut clock, time, events) = recording_clock(short_config());
        clock.start(Some(Mode::Work), None);
        let mut transitions = Vec::new();
        while transitions.len() < 9 {
            run_ticks(&mut clock, &time, 1);
            if let Some(ClockEvent::Start { mode }) = events.lock().unwrap().last() {
                if transitions.last() != Some(mode) {
                    transitions.push(*mode);
                }
            }
        }
        assert_eq!(
            transitions,
            vec![
                Mode::ShortRest,
                Mode::Work,
                Mode::ShortRest,
                Mode::Work,
                Mode::ShortRest,
                Mode::Work,
                Mode::LongRest,
                Mode::Work,
                Mode::ShortRest,
            ]
        );
    }

    #[test]
    fn cycle_count_resets_when_long_rest_is_scheduled() {
        let config = SessionConfig {
            cycles_before_long_rest: 2,
            ..short_config()
        };
        let (mut clock, time, _) = recording_clock(config);
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 60);
        assert_eq!(clock.session().cycle_count, 1);
        run_ticks(&mut clock, &time, 60);
        assert_eq!(clock.mode(), Mode::Work);
        run_ticks(&mut clock, &time, 60);
        assert_eq!(clock.mode(), Mode::LongRest);
        assert_eq!(clock.session().cycle_count, 0);
        assert_eq!(clock.remaining_seconds(), 120);
    }

    #[test]
    fn invalid_configuration_keeps_previous_values() {
        let (mut clock, _, events) = recording_clock(SessionConfig::default());
        let err = clock
            .set_configuration(&ConfigPatch::default().work_minutes(-5))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NonPositive { .. }));
        assert!(events.lock().unwrap().is_empty());
        clock.start(Some(Mode::Work), None);
        assert_eq!(clock.remaining_seconds(), 1500);
    }

    #[test]
    fn configuration_does_not_resize_running_phase() {
        let (mut clock, time, events) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 5);
        clock
            .set_configuration(&ConfigPatch::default().work_minutes(50))
            .unwrap();
        assert_eq!(clock.session().total_seconds, 1500);
        assert_eq!(clock.remaining_seconds(), 1495);
        assert_eq!(clock.config().work_minutes, 50);
        assert_eq!(kinds(&events).last(), Some(&EventKind::Config));

        clock.stop();
        clock.start(Some(Mode::Work), None);
        assert_eq!(clock.remaining_seconds(), 3000);
    }

    #[test]
    fn snapshot_round_trip_reproduces_session() {
        let (mut clock, time, _) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 42);
        let snapshot = clock.snapshot();

        let mut copy = SessionClock::new(SessionConfig::default(), time.clone());
        copy.rehydrate(snapshot).unwrap();
        assert_eq!(copy.mode(), Mode::Work);
        assert_eq!(copy.state(), ClockState::Running);
        assert!(copy.is_ticking());
        let diff = i64::from(copy.remaining_seconds()) - i64::from(clock.remaining_seconds());
        assert!(diff.abs() <= 1);
    }

    #[test]
    fn rehydrated_running_phase_accounts_for_downtime() {
        let (mut clock, time, _) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        let json = clock.snapshot().to_json().unwrap();

        time.advance_secs(100);
        let mut copy = SessionClock::new(SessionConfig::default(), time.clone());
        copy.rehydrate_json(&json).unwrap();
        assert_eq!(copy.remaining_seconds(), 1400);
    }

    #[test]
    fn rehydrated_paused_phase_stays_frozen() {
        let (mut clock, time, _) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        run_ticks(&mut clock, &time, 10);
        clock.pause();
        let snapshot = clock.snapshot();

        time.advance_secs(500);
        let mut copy = SessionClock::new(SessionConfig::default(), time.clone());
        copy.rehydrate(snapshot).unwrap();
        assert_eq!(copy.state(), ClockState::Paused);
        assert_eq!(copy.remaining_seconds(), 1490);
        assert!(!copy.is_ticking());
        copy.resume();
        assert_eq!(copy.remaining_seconds(), 1490);
    }

    #[test]
    fn malformed_snapshot_falls_back_to_idle() {
        let custom = SessionConfig {
            work_minutes: 40,
            ..SessionConfig::default()
        };
        let (mut clock, _, events) = recording_clock(custom);
        clock.start(None, None);

        let err = clock
            .rehydrate_json(r#"{"state":"running","mode":"nap"}"#)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Decode(_)));
        assert_eq!(clock.state(), ClockState::Idle);
        assert!(!clock.is_ticking());
        assert_eq!(clock.config().work_minutes, 40);
        assert_eq!(kinds(&events).last(), Some(&EventKind::Stopped));

        let mut bad = clock.snapshot();
        bad.total_seconds = 0;
        assert!(matches!(
            clock.rehydrate(bad),
            Err(SnapshotError::Malformed(_))
        ));
        assert_eq!(clock.config().work_minutes, 40);
    }

    #[test]
    fn snapshot_with_out_of_range_epoch_is_rejected_without_panicking() {
        let (mut clock, time, events) = recording_clock(SessionConfig::default());
        clock.start(Some(Mode::Work), None);
        let mut hostile = clock.snapshot();
        hostile.phase_start_epoch = Some(i64::MIN);
        let json = hostile.to_json().unwrap();

        time.advance_secs(5);
        let err = clock.rehydrate_json(&json).unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed(_)));
        assert_eq!(clock.state(), ClockState::Idle);
        assert!(!clock.is_ticking());
        assert_eq!(kinds(&events).last(), Some(&EventKind::Stopped));
    }
}
