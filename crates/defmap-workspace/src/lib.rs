//! Crate graph and workspace manifests
//!
//! This crate handles:
//! - Building the crate dependency graph with a reverse-dependency index
//! - Topological ordering and reverse-dependency closure
//! - Parsing JSON workspace manifests into a graph plus per-file item trees

pub mod graph;
pub mod manifest;

pub use graph::{CrateGraph, CrateGraphBuilder, GraphError};
pub use manifest::{CrateManifest, DependencyManifest, ManifestError, WorkspaceManifest};
