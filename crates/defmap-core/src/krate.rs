//! Crate model and resolution-relevant metadata

use crate::cfg::{CfgAtom, CfgExpr, CfgOptions};
use crate::ids::{CrateId, CrateIdx, FileId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Rust edition of a crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edition {
    #[serde(rename = "2015")]
    Edition2015,

    #[serde(rename = "2018")]
    Edition2018,

    #[serde(rename = "2021")]
    Edition2021,
}

impl Default for Edition {
    fn default() -> Self {
        Self::Edition2021
    }
}

/// Whether a declared cargo feature is turned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureState {
    Enabled,
    Disabled,
}

/// A named dependency edge to another crate of the same graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Name under which the dependency is visible (extern prelude name)
    pub name: String,

    /// Target crate
    pub krate: CrateIdx,
}

/// One compilation unit of the crate graph
///
/// Supplied by the crate graph provider and immutable for the lifetime of a
/// graph snapshot. Reverse dependencies are not stored here; the graph keeps
/// them as an index.
#[derive(Debug, Clone)]
pub struct Crate {
    /// Position in the owning graph (assigned when added to a graph)
    pub idx: CrateIdx,

    /// Persistent id, absent if not assigned yet
    pub id: Option<CrateId>,

    /// Display name
    pub name: String,

    pub edition: Edition,

    pub features: BTreeMap<String, FeatureState>,

    pub cfg_options: CfgOptions,

    pub env: BTreeMap<String, String>,

    pub dependencies: Vec<Dependency>,

    /// Root module file (`lib.rs` / `main.rs`), absent if unknown
    pub root_file: Option<FileId>,
}

impl Crate {
    /// Create a crate with default settings and no dependencies
    pub fn new(name: impl Into<String>, id: Option<CrateId>, root_file: Option<FileId>) -> Self {
        Self {
            idx: CrateIdx::from_raw(0),
            id,
            name: name.into(),
            edition: Edition::default(),
            features: BTreeMap::new(),
            cfg_options: CfgOptions::new(),
            env: BTreeMap::new(),
            dependencies: Vec::new(),
            root_file,
        }
    }

    /// Check whether an atom is enabled, counting enabled features as `feature = "..."`
    pub fn is_cfg_atom_enabled(&self, atom: &CfgAtom) -> bool {
        if self.cfg_options.contains(atom) {
            return true;
        }
        match atom {
            CfgAtom::KeyValue { key, value } if key == "feature" => {
                self.features.get(value) == Some(&FeatureState::Enabled)
            }
            _ => false,
        }
    }

    /// Evaluate an optional cfg predicate; declarations without one are enabled
    pub fn is_enabled_by_cfg(&self, cfg: Option<&CfgExpr>) -> bool {
        match cfg {
            Some(expr) => expr.eval(&|atom| self.is_cfg_atom_enabled(atom)),
            None => true,
        }
    }
}

/// Snapshot of the crate fields that affect name resolution
///
/// Two snapshots are compared to detect configuration-only changes without
/// touching any file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrateMetaData {
    pub edition: Edition,
    features: BTreeMap<String, FeatureState>,
    cfg_options: CfgOptions,
    env: BTreeMap<String, String>,
    dependencies: BTreeSet<CrateId>,
}

impl CrateMetaData {
    /// Capture metadata of `krate`; `dependency_ids` are the persistent ids of its dependencies
    pub fn new(krate: &Crate, dependency_ids: impl IntoIterator<Item = CrateId>) -> Self {
        Self {
            edition: krate.edition,
            features: krate.features.clone(),
            cfg_options: krate.cfg_options.clone(),
            env: krate.env.clone(),
            dependencies: dependency_ids.into_iter().collect(),
        }
    }

    pub fn dependencies(&self) -> &BTreeSet<CrateId> {
        &self.dependencies
    }
}
