//! Contains common, primitive types shared across the Focusclock crate.
//!
//! This module defines the identifiers used to address bus handlers and
//! broadcast subscribers, and the `Mode` enum that names each phase of a
//! session. Using distinct types keeps the public API hard to misuse.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::str::FromStr;

new_key_type! {
    /// Uniquely and safely identifies a handler registered on the `EventBus`.
    ///
    /// This key is returned by `EventBus::subscribe` and acts as the
    /// unsubscribe token. It is never reused, so a stale token can never
    /// remove somebody else's handler.
    pub struct HandlerId;
}

/// Identifies one observer attached to a `SessionBroadcaster`.
///
/// The id is chosen by the caller (typically the transport's connection id),
/// so re-subscribing under the same id replaces the previous stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub String);

impl From<&str> for SubscriberId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubscriberId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The phase a session is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Work,
    ShortRest,
    LongRest,
}

impl Mode {
    /// A human-readable label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Work => "Work",
            Mode::ShortRest => "Short Rest",
            Mode::LongRest => "Long Rest",
        }
    }

    pub fn is_rest(self) -> bool {
        !matches!(self, Mode::Work)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Work
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = String;

    /// Accepts the serialized names plus the short aliases the shell uses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" | "focus" => Ok(Mode::Work),
            "short_rest" | "short" | "shortrest" => Ok(Mode::ShortRest),
            "long_rest" | "long" | "longrest" => Ok(Mode::LongRest),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}
