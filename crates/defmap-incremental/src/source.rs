//! Source provider interface and the in-memory implementation
//!
//! All reads of one update cycle go through a single `SourceSnapshot`, so the
//! tracker and the builders see the same file contents even while edits
//! continue to arrive.

use crate::service::DefMapService;
use defmap_core::{FileId, ItemTree};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Consistent read-only view of the sources
pub trait SourceSnapshot: Send + Sync {
    fn file_exists(&self, file: FileId) -> bool;

    /// Changes whenever the file's content changes
    fn modification_stamp(&self, file: FileId) -> Option<u64>;

    fn item_tree(&self, file: FileId) -> Option<Arc<ItemTree>>;

    fn file_path(&self, file: FileId) -> Option<PathBuf>;

    /// Live file at `path`
    fn file_by_path(&self, path: &Path) -> Option<FileId>;

    /// Excluded files are treated as if they did not exist for crate roots
    fn should_index(&self, file: FileId) -> bool;
}

pub trait SourceProvider: Send + Sync {
    fn snapshot(&self) -> Arc<dyn SourceSnapshot>;
}

#[derive(Debug, Clone)]
struct FileEntry {
    path: PathBuf,
    tree: Arc<ItemTree>,
    stamp: u64,
}

#[derive(Debug, Clone, Default)]
struct SourceState {
    /// Live files
    files: HashMap<FileId, FileEntry>,

    /// Every path ever seen; ids are reused when a path is re-created
    ids: HashMap<PathBuf, FileId>,

    excluded: HashSet<FileId>,
}

impl SourceSnapshot for SourceState {
    fn file_exists(&self, file: FileId) -> bool {
        self.files.contains_key(&file)
    }

    fn modification_stamp(&self, file: FileId) -> Option<u64> {
        self.files.get(&file).map(|entry| entry.stamp)
    }

    fn item_tree(&self, file: FileId) -> Option<Arc<ItemTree>> {
        self.files.get(&file).map(|entry| Arc::clone(&entry.tree))
    }

    fn file_path(&self, file: FileId) -> Option<PathBuf> {
        self.files.get(&file).map(|entry| entry.path.clone())
    }

    fn file_by_path(&self, path: &Path) -> Option<FileId> {
        self.ids
            .get(path)
            .copied()
            .filter(|id| self.files.contains_key(id))
    }

    fn should_index(&self, file: FileId) -> bool {
        !self.excluded.contains(&file)
    }
}

/// In-memory sources with copy-on-write snapshots
///
/// Every mutation happens under the write lock and reports the change to the
/// attached `DefMapService` before the lock is released.
#[derive(Debug, Default)]
pub struct MemorySources {
    state: RwLock<Arc<SourceState>>,
    next_id: AtomicU64,
    next_stamp: AtomicU64,
    listener: Option<Arc<DefMapService>>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources that report every change to `service`
    pub fn with_listener(service: Arc<DefMapService>) -> Self {
        Self {
            listener: Some(service),
            ..Self::default()
        }
    }

    fn next_stamp(&self) -> u64 {
        self.next_stamp.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Create or replace the file at `path`
    pub fn set_file(&self, path: impl Into<PathBuf>, tree: ItemTree) -> FileId {
        let path = path.into();
        let mut guard = self.state.write();
        let state = Arc::make_mut(&mut guard);

        let known = state.ids.get(&path).copied();
        let id = match known {
            Some(id) => id,
            None => {
                let id = FileId::from_raw(self.next_id.fetch_add(1, Ordering::SeqCst) as u32);
                state.ids.insert(path.clone(), id);
                id
            }
        };
        let was_live = state.files.contains_key(&id);

        state.files.insert(
            id,
            FileEntry {
                path: path.clone(),
                tree: Arc::new(tree),
                stamp: self.next_stamp(),
            },
        );

        if let Some(service) = &self.listener {
            if !was_live {
                service.on_file_added(&path);
            }
            if known.is_some() {
                service.on_file_changed(id);
            }
        }

        id
    }

    /// Delete the file at `path`, returning its id if it existed
    pub fn delete_file(&self, path: &Path) -> Option<FileId> {
        let mut guard = self.state.write();
        let state = Arc::make_mut(&mut guard);

        let id = state.ids.get(path).copied()?;
        state.files.remove(&id)?;

        if let Some(service) = &self.listener {
            service.on_file_deleted(id);
        }
        Some(id)
    }

    /// Exclude a file from indexing
    pub fn exclude(&self, path: &Path) {
        let mut guard = self.state.write();
        let state = Arc::make_mut(&mut guard);
        if let Some(&id) = state.ids.get(path) {
            state.excluded.insert(id);
        }
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.state.read().file_by_path(path)
    }

    pub fn item_tree(&self, path: &Path) -> Option<Arc<ItemTree>> {
        let state = self.state.read();
        let id = state.file_by_path(path)?;
        state.item_tree(id)
    }
}

impl SourceProvider for MemorySources {
    fn snapshot(&self) -> Arc<dyn SourceSnapshot> {
        let state: Arc<SourceState> = Arc::clone(&*self.state.read());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use defmap_core::Decl;

    #[test]
    fn stamps_increase_on_every_write() {
        let sources = MemorySources::new();
        let id = sources.set_file("src/lib.rs", ItemTree::default());
        let first = sources.snapshot().modification_stamp(id).unwrap();

        sources.set_file("src/lib.rs", ItemTree::new(vec![Decl::function("f", "")]));
        let second = sources.snapshot().modification_stamp(id).unwrap();
        assert!(second > first);
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let sources = MemorySources::new();
        let id = sources.set_file("src/lib.rs", ItemTree::default());
        let before = sources.snapshot();

        sources.set_file("src/lib.rs", ItemTree::new(vec![Decl::function("f", "")]));
        sources.delete_file(Path::new("src/lib.rs"));

        assert!(before.file_exists(id));
        assert_eq!(before.item_tree(id).unwrap().decls.len(), 0);
        assert!(!sources.snapshot().file_exists(id));
    }

    #[test]
    fn recreated_path_reuses_id() {
        let sources = MemorySources::new();
        let id = sources.set_file("a.rs", ItemTree::default());
        assert_eq!(sources.delete_file(Path::new("a.rs")), Some(id));
        assert_eq!(sources.delete_file(Path::new("a.rs")), None);
        assert_eq!(sources.set_file("a.rs", ItemTree::default()), id);
    }

    #[test]
    fn excluded_files_are_not_indexed() {
        let sources = MemorySources::new();
        let id = sources.set_file("gen/out.rs", ItemTree::default());
        sources.exclude(Path::new("gen/out.rs"));
        let snapshot = sources.snapshot();
        assert!(snapshot.file_exists(id));
        assert!(!snapshot.should_index(id));
    }

    #[test]
    fn changes_are_reported_to_the_service() {
        let service = Arc::new(DefMapService::new());
        let sources = MemorySources::with_listener(Arc::clone(&service));

        let id = sources.set_file("a.rs", ItemTree::default());
        assert!(!service.has_changed_files());

        sources.set_file("a.rs", ItemTree::default());
        assert_eq!(service.take_changed_files(), HashSet::from([id]));

        sources.delete_file(Path::new("a.rs"));
        assert_eq!(service.take_changed_files(), HashSet::from([id]));
    }
}
