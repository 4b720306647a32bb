//! Workspace manifest (JSON) parsing
//!
//! A manifest describes a crate graph together with the item trees of every
//! source file, so that a whole workspace can be loaded without a parser.

use crate::graph::{CrateGraph, CrateGraphBuilder, GraphError};
use defmap_core::{CfgAtom, Crate, CrateId, Edition, FeatureState, FileId, ItemTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Top-level manifest structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceManifest {
    pub crates: Vec<CrateManifest>,

    /// Source files by path
    #[serde(default)]
    pub files: BTreeMap<PathBuf, ItemTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrateManifest {
    pub name: String,

    /// Persistent crate id; crates without one are never cached
    #[serde(default)]
    pub id: Option<CrateId>,

    #[serde(default)]
    pub edition: Edition,

    /// Path of the root module file
    pub root: PathBuf,

    #[serde(default)]
    pub features: BTreeMap<String, FeatureState>,

    #[serde(default)]
    pub cfg: Vec<CfgAtom>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub dependencies: Vec<DependencyManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyManifest {
    /// Extern prelude name
    pub name: String,

    /// Name of the target crate in the same manifest
    #[serde(rename = "crate")]
    pub krate: String,
}

impl WorkspaceManifest {
    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parse manifest from JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json)
            .map_err(|e| ManifestError::ParseError(e.to_string()))
    }

    pub fn get_crate(&self, name: &str) -> Option<&CrateManifest> {
        self.crates.iter().find(|c| c.name == name)
    }

    /// Build the crate graph, resolving root paths through `lookup`
    pub fn into_graph(
        &self,
        lookup: impl Fn(&Path) -> Option<FileId>,
    ) -> Result<CrateGraph, ManifestError> {
        let mut builder = CrateGraphBuilder::new();
        let mut by_name = HashMap::new();

        for manifest in &self.crates {
            let root_file = lookup(&manifest.root).ok_or_else(|| ManifestError::UnknownFile {
                krate: manifest.name.clone(),
                path: manifest.root.display().to_string(),
            })?;

            let mut krate = Crate::new(manifest.name.clone(), manifest.id, Some(root_file));
            krate.edition = manifest.edition;
            krate.features = manifest.features.clone();
            krate.cfg_options = manifest.cfg.iter().cloned().collect();
            krate.env = manifest.env.clone();

            let idx = builder.add_crate(krate);
            if by_name.insert(manifest.name.as_str(), idx).is_some() {
                return Err(ManifestError::DuplicateCrate(manifest.name.clone()));
            }
        }

        for manifest in &self.crates {
            let from = by_name[manifest.name.as_str()];
            for dep in &manifest.dependencies {
                let to = by_name.get(dep.krate.as_str()).copied().ok_or_else(|| {
                    GraphError::UnknownDependency {
                        krate: manifest.name.clone(),
                        dependency: dep.krate.clone(),
                    }
                })?;
                builder.add_dependency(from, dep.name.clone(), to);
            }
        }

        Ok(builder.build()?)
    }
}

/// Manifest error types
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(String),

    #[error("Root file '{path}' of crate '{krate}' is not a known source file")]
    UnknownFile { krate: String, path: String },

    #[error("Crate '{0}' is declared more than once")]
    DuplicateCrate(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
