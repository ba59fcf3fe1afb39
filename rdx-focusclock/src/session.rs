//! The session data model and its self-describing snapshot.
//!
//! A `Session` is owned by exactly one `SessionClock` and is only mutated
//! through the clock's operations. A `SessionSnapshot` is the immutable,
//! serializable copy handed to the broadcaster, to persistence and to
//! late-joining observers.

use crate::common::Mode;
use crate::config::SessionConfig;
use crate::error::SnapshotError;
use crate::time::{is_plausible_epoch, whole_seconds_between, EpochMillis};
use serde::{Deserialize, Serialize};

/// The coarse state of a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    Idle,
    Running,
    Paused,
}

/// Mutable state of one timer. See `SessionClock` for the operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub mode: Mode,
    /// Completed work phases since the last long rest.
    pub cycle_count: u32,
    pub total_seconds: u32,
    pub remaining_seconds: u32,
    pub paused_at_epoch: Option<EpochMillis>,
    /// Effective wall-clock start of the running phase.
    pub phase_start_epoch: Option<EpochMillis>,
}

impl Session {
    /// An idle session parked on the configured start mode.
    pub fn idle(config: &SessionConfig) -> Self {
        Self {
            mode: config.start_mode,
            cycle_count: 0,
            total_seconds: config.seconds_for(config.start_mode),
            remaining_seconds: 0,
            paused_at_epoch: None,
            phase_start_epoch: None,
        }
    }

    pub fn state(&self) -> ClockState {
        match (self.paused_at_epoch, self.phase_start_epoch) {
            (Some(_), _) => ClockState::Paused,
            (None, Some(_)) => ClockState::Running,
            (None, None) => ClockState::Idle,
        }
    }

    /// Fraction of the phase already elapsed, clamped to `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total_seconds == 0 {
            return 1.0;
        }
        let elapsed = self.total_seconds.saturating_sub(self.remaining_seconds);
        (f64::from(elapsed) / f64::from(self.total_seconds)).clamp(0.0, 1.0)
    }
}

/// A full, self-describing copy of a session and the configuration it runs
/// under. Observers never receive diffs, always one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: ClockState,
    pub mode: Mode,
    pub cycle_count: u32,
    pub total_seconds: u32,
    pub remaining_seconds: u32,
    pub paused_at_epoch: Option<EpochMillis>,
    pub phase_start_epoch: Option<EpochMillis>,
    /// When this copy was taken.
    pub captured_at_epoch: EpochMillis,
    pub configuration: SessionConfig,
}

impl SessionSnapshot {
    pub(crate) fn capture(session: &Session, config: &SessionConfig, now: EpochMillis) -> Self {
        Self {
            state: session.state(),
            mode: session.mode,
            cycle_count: session.cycle_count,
            total_seconds: session.total_seconds,
            remaining_seconds: session.remaining_seconds,
            paused_at_epoch: session.paused_at_epoch,
            phase_start_epoch: session.phase_start_epoch,
            captured_at_epoch: now,
            configuration: config.clone(),
        }
    }

    /// Remaining seconds as an observer would compute them at `now`.
    ///
    /// While running this is derived from `phase_start_epoch`, not from the
    /// sender's decremented counter, so independent observers converge.
    pub fn remaining_at(&self, now: EpochMillis) -> u32 {
        match (self.state, self.phase_start_epoch) {
            (ClockState::Running, Some(start)) => {
                let elapsed = whole_seconds_between(start, now);
                u64::from(self.total_seconds).saturating_sub(elapsed) as u32
            }
            _ => self.remaining_seconds,
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes and validates a snapshot.
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(raw)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Checks that the fields describe a state a clock could actually be in.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        self.configuration.validate()?;
        if self.total_seconds == 0 {
            return Err(SnapshotError::Malformed("total_seconds must be positive".into()));
        }
        if self.remaining_seconds > self.total_seconds {
            return Err(SnapshotError::Malformed(format!(
                "remaining_seconds {} exceeds total_seconds {}",
                self.remaining_seconds, self.total_seconds
            )));
        }
        let stamps = [
            ("paused_at_epoch", self.paused_at_epoch),
            ("phase_start_epoch", self.phase_start_epoch),
            ("captured_at_epoch", Some(self.captured_at_epoch)),
        ];
        for (field, stamp) in stamps {
            if let Some(ms) = stamp.filter(|ms| !is_plausible_epoch(*ms)) {
                return Err(SnapshotError::Malformed(format!(
                    "{} {} is outside the supported time range",
                    field, ms
                )));
            }
        }
        let consistent = match self.state {
            ClockState::Idle => self.paused_at_epoch.is_none() && self.phase_start_epoch.is_none(),
            ClockState::Running => self.paused_at_epoch.is_none() && self.phase_start_epoch.is_some(),
            ClockState::Paused => self.paused_at_epoch.is_some(),
        };
        if !consistent {
            return Err(SnapshotError::Malformed(format!(
                "timestamps do not match state {:?}",
                self.state
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_snapshot(start: EpochMillis) -> SessionSnapshot {
        let config = SessionConfig::default();
        let session = Session {
            mode: Mode::Work,
            cycle_count: 0,
            total_seconds: 1500,
            remaining_seconds: 1500,
            paused_at_epoch: None,
            phase_start_epoch: Some(start),
        };
        SessionSnapshot::capture(&session, &config, start)
    }

    #[test]
    fn remaining_is_recomputed_from_phase_start() {
        let snap = running_snapshot(10_000);
        assert_eq!(snap.remaining_at(10_000 + 37_000), 1463);
        assert_eq!(snap.remaining_at(10_000 + 37_999), 1463);
        assert_eq!(snap.remaining_at(10_000 + 2_000_000), 0);
    }

    #[test]
    fn json_round_trip_preserves_snapshot() {
        let snap = running_snapshot(42);
        let decoded = SessionSnapshot::from_json(&snap.to_json().unwrap()).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn invalid_mode_is_a_decode_error() {
        let raw = running_snapshot(0).to_json().unwrap().replace("\"work\"", "\"siesta\"");
        assert!(matches!(
            SessionSnapshot::from_json(&raw),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn missing_field_is_a_decode_error() {
        let raw = r#"{"state":"idle","mode":"work"}"#;
        assert!(matches!(
            SessionSnapshot::from_json(raw),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn inconsistent_timestamps_are_malformed() {
        let mut snap = running_snapshot(0);
        snap.phase_start_epoch = None;
        assert!(matches!(snap.validate(), Err(SnapshotError::Malformed(_))));

        let mut snap = running_snapshot(0);
        snap.remaining_seconds = snap.total_seconds + 1;
        assert!(matches!(snap.validate(), Err(SnapshotError::Malformed(_))));
    }

    #[test]
    fn out_of_range_epochs_are_malformed() {
        let snap = running_snapshot(i64::MIN);
        assert!(matches!(snap.validate(), Err(SnapshotError::Malformed(_))));

        let mut snap = running_snapshot(10_000);
        snap.state = ClockState::Paused;
        snap.paused_at_epoch = Some(i64::MAX);
        assert!(matches!(snap.validate(), Err(SnapshotError::Malformed(_))));

        let mut snap = running_snapshot(10_000);
        snap.captured_at_epoch = -5;
        assert!(matches!(snap.validate(), Err(SnapshotError::Malformed(_))));

        // Observers never panic on a hostile epoch, even before validation.
        assert_eq!(running_snapshot(i64::MIN).remaining_at(0), 0);
    }

    #[test]
    fn progress_is_clamped() {
        let session = Session {
            mode: Mode::ShortRest,
            cycle_count: 1,
            total_seconds: 300,
            remaining_seconds: 150,
            paused_at_epoch: None,
            phase_start_epoch: None,
        };
        assert!((session.progress() - 0.5).abs() < f64::EPSILON);
    }
}
