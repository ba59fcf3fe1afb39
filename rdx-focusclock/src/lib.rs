//! # Focusclock
//!
//! A reconnect-safe focus/rest session clock for Rust.
//!
//! Focusclock runs one authoritative countdown through a repeating sequence
//! of phases (work, short rest, long rest), emits progress and lifecycle
//! events, and mirrors its state to any number of observers through full
//! snapshots.
//!
//! ## Core Concepts
//!
//! - **SessionClock**: The synchronous state machine. It owns the session,
//!   advances once per logical second and enforces the phase cycle.
//! - **Timestamp reconciliation**: Every running phase records the epoch it
//!   effectively started at. Observers recompute remaining time from that
//!   epoch rather than trusting a local tick count, so they never drift.
//! - **Event-Driven**: Renderers subscribe to strongly-typed `ClockEvent`s on
//!   the clock's `EventBus`, or to the engine's `broadcast` stream.
//! - **SessionBroadcaster**: Fans full snapshots out to subscribers. A new
//!   subscriber gets the current snapshot first, then an update per change.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use focusclock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Load configuration from defaults and the environment.
//!     let config = SessionConfig::load(None)?;
//!
//!     // 2. Create the engine.
//!     let engine = FocusclockEngine::new(config);
//!
//!     // 3. Subscribe to clock events before starting.
//!     let mut events = engine.subscribe_clock_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Received: {:?}", event);
//!         }
//!     });
//!
//!     // 4. Start a work phase and run until Ctrl+C.
//!     engine.start(Some(Mode::Work), None).await;
//!     engine.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Focusclock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod session;
pub mod time;

/// A prelude module for easy importing of the most common Focusclock types.
pub mod prelude {
    pub use crate::clock::{SessionClock, TickHandle};
    pub use crate::common::{HandlerId, Mode, SubscriberId};
    pub use crate::components::broadcaster::{SessionBroadcaster, SubscriberStream};
    pub use crate::components::store::{JsonFileStore, MemoryStore, SnapshotStore};
    pub use crate::config::{ConfigPatch, SessionConfig};
    pub use crate::engine::FocusclockEngine;
    pub use crate::error::{ConfigError, SnapshotError};
    pub use crate::events::{BroadcastMessage, ClockEvent, EventKind, TickEvent};
    pub use crate::session::{ClockState, SessionSnapshot};
    pub use crate::time::{ManualTime, SystemTimeSource, TimeSource};
}
