//! Persistence collaborators for session snapshots.
//!
//! The clock never persists anything itself. An engine can be given a
//! `SnapshotStore`; it saves the latest snapshot after every lifecycle change
//! and can restore from it at boot.

use crate::session::SessionSnapshot;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Reads and writes one session's snapshot.
///
/// The engine calls `save` synchronously from the clock's event handlers,
/// while it holds the clock lock. Ticking and every other engine call wait
/// for it, so implementations must return quickly: a small local write is
/// fine, anything slower should hand the snapshot off to its own task.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<SessionSnapshot>>;
    fn save(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()>;
}

/// Keeps the snapshot in memory. Useful for tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<SessionSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Option<SessionSnapshot>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot slot poisoned"))?;
        Ok(slot.clone())
    }

    fn save(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot slot poisoned"))?;
        *slot = Some(snapshot.clone());
        Ok(())
    }
}

/// Stores the snapshot as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> anyhow::Result<Option<SessionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading snapshot from {}", self.path.display()))?;
        let snapshot = SessionSnapshot::from_json(&raw)
            .with_context(|| format!("decoding snapshot in {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let raw = snapshot.to_json()?;
        // Write to a sibling file first so a crash never leaves half a document.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
