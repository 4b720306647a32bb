//! Structure-change notifications

use defmap_core::CrateId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Told once per update cycle that rebuilt at least one DefMap
pub trait StructureChangeListener: Send + Sync {
    fn on_structure_changed(&self, crates: &[CrateId]);
}

/// Counts structure changes, e.g. to invalidate resolve caches keyed on it
#[derive(Debug, Default)]
pub struct StructureModificationTracker {
    count: AtomicU64,
    last_changed: Mutex<Vec<CrateId>>,
}

impl StructureModificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modification_count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Crates reported by the most recent signal
    pub fn last_changed(&self) -> Vec<CrateId> {
        self.last_changed.lock().clone()
    }
}

impl StructureChangeListener for StructureModificationTracker {
    fn on_structure_changed(&self, crates: &[CrateId]) {
        *self.last_changed.lock() = crates.to_vec();
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
