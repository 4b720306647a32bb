//! DefMap cache service
//!
//! Holds the built DefMap of every crate together with the indices needed to
//! map file events back to crates, and the pending change sets filled by
//! editor callbacks and drained by the updater.
//!
//! Locking: the DefMap table (states plus both indices) is one `RwLock` so a
//! commit replaces a crate's entries atomically. The two pending sets have
//! their own `Mutex`. No method holds more than one of them at a time.

use defmap_core::{CrateDefMap, CrateId, FileId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cache state of one crate
#[derive(Debug, Clone, Default)]
pub enum DefMapState {
    /// Never built, or evicted for a rebuild
    #[default]
    NotBuilt,

    /// The last build attempt failed or was cancelled mid-crate
    Failed,

    Built(Arc<CrateDefMap>),
}

impl DefMapState {
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built(_))
    }

    pub fn def_map(&self) -> Option<&Arc<CrateDefMap>> {
        match self {
            Self::Built(def_map) => Some(def_map),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct DefMapTable {
    states: HashMap<CrateId, DefMapState>,

    /// file -> (stamp at build time, owning crate)
    file_stamps: HashMap<FileId, (u64, CrateId)>,

    /// missed path -> crate that looked for it
    missed_files: HashMap<PathBuf, CrateId>,
}

impl DefMapTable {
    fn remove_entries_of(&mut self, krate: CrateId) {
        self.file_stamps.retain(|_, (_, owner)| *owner != krate);
        self.missed_files.retain(|_, owner| *owner != krate);
    }
}

/// Process-scoped store of DefMaps and pending changes
#[derive(Debug)]
pub struct DefMapService {
    table: RwLock<DefMapTable>,

    changed_files: Mutex<HashSet<FileId>>,

    changed_crates: Mutex<HashSet<CrateId>>,

    is_first_time: AtomicBool,

    should_recheck_all_crates: AtomicBool,
}

impl Default for DefMapService {
    fn default() -> Self {
        Self::new()
    }
}

impl DefMapService {
    /// Create an empty service; the next update will be a full build
    pub fn new() -> Self {
        Self {
            table: RwLock::new(DefMapTable::default()),
            changed_files: Mutex::new(HashSet::new()),
            changed_crates: Mutex::new(HashSet::new()),
            is_first_time: AtomicBool::new(true),
            should_recheck_all_crates: AtomicBool::new(false),
        }
    }

    /// Drop every DefMap and pending change and start over
    pub fn clear(&self) {
        *self.table.write() = DefMapTable::default();
        self.changed_files.lock().clear();
        self.changed_crates.lock().clear();
        self.is_first_time.store(true, Ordering::SeqCst);
        self.should_recheck_all_crates.store(false, Ordering::SeqCst);
    }

    /// Store a freshly built DefMap, replacing everything known about its crate
    pub fn commit(&self, def_map: CrateDefMap) -> Arc<CrateDefMap> {
        let def_map = Arc::new(def_map);
        let krate = def_map.krate;

        let mut table = self.table.write();
        table.remove_entries_of(krate);
        for info in def_map.file_infos.values() {
            table
                .file_stamps
                .insert(info.file_id, (info.modification_stamp, krate));
        }
        for path in &def_map.missed_files {
            table.missed_files.insert(path.clone(), krate);
        }
        table
            .states
            .insert(krate, DefMapState::Built(Arc::clone(&def_map)));

        def_map
    }

    /// Record a failed build
    ///
    /// File ownership from the last good build is kept. `files` (usually the
    /// crate root with its current stamp, `0` when it is missing) are claimed
    /// for `krate` unless already owned, so the next event on them dirties it.
    pub fn mark_failed(&self, krate: CrateId, files: impl IntoIterator<Item = (FileId, u64)>) {
        let mut table = self.table.write();
        for (file, stamp) in files {
            table.file_stamps.entry(file).or_insert((stamp, krate));
        }
        table.states.insert(krate, DefMapState::Failed);
    }

    /// Forget the DefMap of `krate` before rebuilding it
    pub fn evict(&self, krate: CrateId) {
        self.table.write().states.remove(&krate);
    }

    pub fn state(&self, krate: CrateId) -> DefMapState {
        self.table
            .read()
            .states
            .get(&krate)
            .cloned()
            .unwrap_or_default()
    }

    pub fn def_map(&self, krate: CrateId) -> Option<Arc<CrateDefMap>> {
        self.table
            .read()
            .states
            .get(&krate)
            .and_then(|state| state.def_map().cloned())
    }

    /// Ids of all crates with a built DefMap, sorted
    pub fn built_crates(&self) -> Vec<CrateId> {
        let mut ids: Vec<CrateId> = self
            .table
            .read()
            .states
            .iter()
            .filter(|(_, state)| state.is_built())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Stamp recorded for `file` at build time and the crate that owns it
    pub fn file_stamp(&self, file: FileId) -> Option<(u64, CrateId)> {
        self.table.read().file_stamps.get(&file).copied()
    }

    pub fn missed_file_owner(&self, path: &Path) -> Option<CrateId> {
        self.table.read().missed_files.get(path).copied()
    }

    /// Drop every entry of crates not in `live`
    pub fn retain_crates(&self, live: &HashSet<CrateId>) {
        let mut table = self.table.write();
        table.states.retain(|id, _| live.contains(id));
        table.file_stamps.retain(|_, (_, owner)| live.contains(owner));
        table.missed_files.retain(|_, owner| live.contains(owner));
    }

    /// A file appeared at `path`; dirties the crate that looked for it
    pub fn on_file_added(&self, path: &Path) {
        let owner = self.missed_file_owner(path);
        if let Some(owner) = owner {
            tracing::debug!(path = %path.display(), krate = %owner, "Missed file appeared");
            self.changed_crates.lock().insert(owner);
        }
    }

    pub fn on_file_changed(&self, file: FileId) {
        self.changed_files.lock().insert(file);
    }

    /// Deleted files go through the changed-file set; the drain notices they are gone
    pub fn on_file_deleted(&self, file: FileId) {
        self.changed_files.lock().insert(file);
    }

    /// Crate graph or other workspace-level input changed
    pub fn on_workspace_changed(&self) {
        self.should_recheck_all_crates.store(true, Ordering::SeqCst);
    }

    pub fn take_changed_files(&self) -> HashSet<FileId> {
        std::mem::take(&mut *self.changed_files.lock())
    }

    pub fn has_changed_files(&self) -> bool {
        !self.changed_files.lock().is_empty()
    }

    pub fn take_changed_crates(&self) -> HashSet<CrateId> {
        std::mem::take(&mut *self.changed_crates.lock())
    }

    pub fn add_changed_crates(&self, crates: impl IntoIterator<Item = CrateId>) {
        self.changed_crates.lock().extend(crates);
    }

    /// Pending changed crates, without draining them
    pub fn changed_crates(&self) -> HashSet<CrateId> {
        self.changed_crates.lock().clone()
    }

    pub fn is_first_time(&self) -> bool {
        self.is_first_time.load(Ordering::SeqCst)
    }

    pub fn reset_is_first_time(&self) {
        self.is_first_time.store(false, Ordering::SeqCst);
    }

    pub fn should_recheck_all_crates(&self) -> bool {
        self.should_recheck_all_crates.load(Ordering::SeqCst)
    }

    pub fn reset_should_recheck_all_crates(&self) {
        self.should_recheck_all_crates.store(false, Ordering::SeqCst);
    }
}
