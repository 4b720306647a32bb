//! The built per-crate artifact

use crate::hash::HashCode;
use crate::ids::{CrateId, FileId};
use crate::krate::CrateMetaData;
use crate::light::{ImportLight, MacroCallLight, MacroDefLight, VisibilityLight};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TIMESTAMP: AtomicU64 = AtomicU64::new(1);

/// What was known about one file when its crate was built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: FileId,

    /// Structural hash of the file's whole module subtree
    pub hash: HashCode,

    /// Modification stamp of the file observed during the build
    pub modification_stamp: u64,
}

/// Per-namespace visibility of one name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerNs {
    pub types: Option<VisibilityLight>,
    pub values: Option<VisibilityLight>,
}

impl PerNs {
    pub fn is_empty(&self) -> bool {
        self.types.is_none() && self.values.is_none()
    }
}

/// Explicitly declared contents of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModData {
    /// `crate::a::b` style path, `crate` for the root
    pub path: String,

    /// File the module's declarations live in
    pub file: FileId,

    pub visible_items: BTreeMap<String, PerNs>,

    pub imports: Vec<ImportLight>,

    /// Macro calls in item position, not expanded
    pub macro_calls: Vec<MacroCallLight>,

    /// `macro_rules!` definitions in textual order (later ones shadow earlier ones)
    pub legacy_macros: Vec<MacroDefLight>,

    pub children: BTreeMap<String, ModData>,
}

impl ModData {
    pub fn new(path: impl Into<String>, file: FileId) -> Self {
        Self {
            path: path.into(),
            file,
            visible_items: BTreeMap::new(),
            imports: Vec::new(),
            macro_calls: Vec::new(),
            legacy_macros: Vec::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn child_path(&self, name: &str) -> String {
        format!("{}::{}", self.path, name)
    }

    /// Find a module by its path segments relative to this module
    pub fn descendant(&self, segments: &[&str]) -> Option<&ModData> {
        match segments.split_first() {
            None => Some(self),
            Some((first, rest)) => self.children.get(*first)?.descendant(rest),
        }
    }

    /// Number of modules in this subtree, including `self`
    pub fn module_count(&self) -> usize {
        1 + self.children.values().map(ModData::module_count).sum::<usize>()
    }
}

/// The built DefMap of one crate
///
/// Immutable once built. A rebuild produces a new value with a larger
/// `timestamp`; the cache replaces the old one as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrateDefMap {
    pub krate: CrateId,

    pub metadata: CrateMetaData,

    pub root: ModData,

    pub file_infos: HashMap<FileId, FileInfo>,

    /// Paths referenced by `mod` declarations that did not exist at build time
    pub missed_files: HashSet<PathBuf>,

    /// Dependency name → crate id, for dependencies whose DefMap was available
    pub extern_prelude: BTreeMap<String, CrateId>,

    /// Monotonically increasing across all builds of the process
    pub timestamp: u64,
}

impl CrateDefMap {
    pub fn new(
        krate: CrateId,
        metadata: CrateMetaData,
        root: ModData,
        file_infos: HashMap<FileId, FileInfo>,
        missed_files: HashSet<PathBuf>,
        extern_prelude: BTreeMap<String, CrateId>,
    ) -> Self {
        Self {
            krate,
            metadata,
            root,
            file_infos,
            missed_files,
            extern_prelude,
            timestamp: NEXT_TIMESTAMP.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn file_info(&self, file: FileId) -> Option<&FileInfo> {
        self.file_infos.get(&file)
    }
}
