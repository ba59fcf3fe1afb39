//! Defines all public event types emitted by the Focusclock crate.
//!
//! `ClockEvent` is the contract with an external renderer: one variant per
//! lifecycle or progress notification. `BroadcastMessage` is the contract
//! with an external transport: every message carries a full snapshot.

use crate::common::Mode;
use crate::config::SessionConfig;
use crate::session::SessionSnapshot;
use serde::{Deserialize, Serialize};

/// The per-second progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
    /// Elapsed share of the phase, `0..=100`.
    pub progress_pct: f64,
    /// Remaining time as `MM:SS`.
    pub formatted: String,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub mode: Mode,
}

/// Everything a `SessionClock` can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClockEvent {
    Tick(TickEvent),
    Start { mode: Mode },
    Paused { mode: Mode, remaining_seconds: u32 },
    Resumed { mode: Mode, remaining_seconds: u32 },
    Stopped,
    Completed { mode: Mode },
    #[serde(rename = "autoadvance")]
    AutoAdvance { from: Mode, to: Mode },
    Config { configuration: SessionConfig },
}

/// The name of a `ClockEvent`, used as the key handlers subscribe under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Tick,
    Start,
    Paused,
    Resumed,
    Stopped,
    Completed,
    AutoAdvance,
    Config,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Tick,
        EventKind::Start,
        EventKind::Paused,
        EventKind::Resumed,
        EventKind::Stopped,
        EventKind::Completed,
        EventKind::AutoAdvance,
        EventKind::Config,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Tick => "tick",
            EventKind::Start => "start",
            EventKind::Paused => "paused",
            EventKind::Resumed => "resumed",
            EventKind::Stopped => "stopped",
            EventKind::Completed => "completed",
            EventKind::AutoAdvance => "autoadvance",
            EventKind::Config => "config",
        }
    }
}

impl ClockEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClockEvent::Tick(_) => EventKind::Tick,
            ClockEvent::Start { .. } => EventKind::Start,
            ClockEvent::Paused { .. } => EventKind::Paused,
            ClockEvent::Resumed { .. } => EventKind::Resumed,
            ClockEvent::Stopped => EventKind::Stopped,
            ClockEvent::Completed { .. } => EventKind::Completed,
            ClockEvent::AutoAdvance { .. } => EventKind::AutoAdvance,
            ClockEvent::Config { .. } => EventKind::Config,
        }
    }
}

/// A message pushed to one broadcast subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "session", rename_all = "snake_case")]
pub enum BroadcastMessage {
    /// Sent exactly once, immediately on subscribe.
    Snapshot(SessionSnapshot),
    /// Sent on every state change afterwards.
    Update(SessionSnapshot),
}

impl BroadcastMessage {
    pub fn session(&self) -> &SessionSnapshot {
        match self {
            BroadcastMessage::Snapshot(s) | BroadcastMessage::Update(s) => s,
        }
    }
}
