//! Defines the configuration structures for a Focusclock session.
//!
//! `SessionConfig` is the validated, authoritative configuration a clock runs
//! with. `ConfigPatch` is the partial, unvalidated form used both for
//! `set_configuration` and for layered loading (TOML file plus `FOCUSCLOCK_*`
//! environment variables) through the `config` crate.

use crate::common::Mode;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `FOCUSCLOCK_WORK_MINUTES=50`.
pub const ENV_PREFIX: &str = "FOCUSCLOCK";

/// Longest phase accepted, in minutes. Keeps `minutes * 60` inside `u32`.
const MAX_MINUTES: i64 = (u32::MAX / 60) as i64;

/// The validated configuration of a session clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub work_minutes: u32,
    pub short_rest_minutes: u32,
    pub long_rest_minutes: u32,
    /// Completed work phases required before a long rest is scheduled.
    pub cycles_before_long_rest: u32,
    /// Whether a completed phase immediately starts the next one.
    pub auto_advance: bool,
    /// The mode `start` uses when none is given, and the mode `stop` returns to.
    #[serde(default)]
    pub start_mode: Mode,
    /// Whether an engine starts ticking as soon as it is constructed.
    #[serde(default)]
    pub auto_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            short_rest_minutes: 5,
            long_rest_minutes: 15,
            cycles_before_long_rest: 4,
            auto_advance: true,
            start_mode: Mode::Work,
            auto_start: false,
        }
    }
}

/// A partial configuration update. Absent fields keep their current value.
///
/// Durations are signed so that a negative value reaches validation and is
/// reported, instead of failing somewhere inside deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub work_minutes: Option<i64>,
    #[serde(default)]
    pub short_rest_minutes: Option<i64>,
    #[serde(default)]
    pub long_rest_minutes: Option<i64>,
    #[serde(default)]
    pub cycles_before_long_rest: Option<i64>,
    #[serde(default)]
    pub auto_advance: Option<bool>,
    #[serde(default)]
    pub start_mode: Option<Mode>,
    #[serde(default)]
    pub auto_start: Option<bool>,
}

impl ConfigPatch {
    pub fn work_minutes(mut self, minutes: i64) -> Self {
        self.work_minutes = Some(minutes);
        self
    }

    pub fn short_rest_minutes(mut self, minutes: i64) -> Self {
        self.short_rest_minutes = Some(minutes);
        self
    }

    pub fn long_rest_minutes(mut self, minutes: i64) -> Self {
        self.long_rest_minutes = Some(minutes);
        self
    }

    pub fn cycles_before_long_rest(mut self, cycles: i64) -> Self {
        self.cycles_before_long_rest = Some(cycles);
        self
    }

    pub fn auto_advance(mut self, enabled: bool) -> Self {
        self.auto_advance = Some(enabled);
        self
    }

    pub fn start_mode(mut self, mode: Mode) -> Self {
        self.start_mode = Some(mode);
        self
    }
}

impl SessionConfig {
    /// Loads a configuration from defaults, an optional TOML file and the
    /// environment, in that order of precedence (later wins).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        let patch: ConfigPatch = builder.build()?.try_deserialize()?;
        Self::default().merged(&patch)
    }

    /// Returns a copy of `self` with `patch` applied, or the first field that
    /// failed validation. `self` is never modified.
    pub fn merged(&self, patch: &ConfigPatch) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        if let Some(v) = patch.work_minutes {
            next.work_minutes = minutes("work_minutes", v)?;
        }
        if let Some(v) = patch.short_rest_minutes {
            next.short_rest_minutes = minutes("short_rest_minutes", v)?;
        }
        if let Some(v) = patch.long_rest_minutes {
            next.long_rest_minutes = minutes("long_rest_minutes", v)?;
        }
        if let Some(v) = patch.cycles_before_long_rest {
            next.cycles_before_long_rest = positive("cycles_before_long_rest", v)?;
        }
        if let Some(v) = patch.auto_advance {
            next.auto_advance = v;
        }
        if let Some(v) = patch.start_mode {
            next.start_mode = v;
        }
        if let Some(v) = patch.auto_start {
            next.auto_start = v;
        }
        Ok(next)
    }

    /// Checks the invariants of an already-built configuration, e.g. one
    /// that arrived inside a snapshot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        minutes("work_minutes", i64::from(self.work_minutes))?;
        minutes("short_rest_minutes", i64::from(self.short_rest_minutes))?;
        minutes("long_rest_minutes", i64::from(self.long_rest_minutes))?;
        positive("cycles_before_long_rest", i64::from(self.cycles_before_long_rest))?;
        Ok(())
    }

    /// The configured length of `mode`, in seconds.
    pub fn seconds_for(&self, mode: Mode) -> u32 {
        let minutes = match mode {
            Mode::Work => self.work_minutes,
            Mode::ShortRest => self.short_rest_minutes,
            Mode::LongRest => self.long_rest_minutes,
        };
        minutes * 60
    }
}

fn positive(field: &'static str, value: i64) -> Result<u32, ConfigError> {
    if value <= 0 {
        return Err(ConfigError::NonPositive { field, value });
    }
    u32::try_from(value).map_err(|_| ConfigError::OutOfRange { field, value })
}

fn minutes(field: &'static str, value: i64) -> Result<u32, ConfigError> {
    let minutes = positive(field, value)?;
    if value > MAX_MINUTES {
        return Err(ConfigError::OutOfRange { field, value });
    }
    Ok(minutes)
}
