//! Contains the building blocks that sit around the session clock.
//!
//! The `EventBus` delivers clock events to in-process handlers, the
//! `SessionBroadcaster` fans full snapshots out to remote observers, and the
//! `SnapshotStore` implementations persist the latest snapshot.

pub mod broadcaster;
pub mod bus;
pub mod store;
