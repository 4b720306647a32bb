//! DefMap Core
//!
//! Shared domain model for incremental DefMap maintenance: identifiers, the
//! crate model and its resolution-relevant metadata, the per-file item tree
//! handed out by the source provider, light declaration records, and the
//! built `CrateDefMap` artifact.

pub mod ids;
pub mod cfg;
pub mod krate;
pub mod item_tree;
pub mod light;
pub mod hash;
pub mod def_map;
pub mod config;

pub use ids::{FileId, CrateId, CrateIdx};
pub use cfg::{CfgAtom, CfgExpr, CfgOptions};
pub use krate::{Crate, CrateMetaData, Dependency, Edition, FeatureState};
pub use item_tree::{
    Decl, ExternCrateDecl, ItemDecl, ItemKind, ItemTree, MacroCallDecl, MacroRulesDecl, ModKind,
    StructShape, UseDecl, UseTree, Vis, DOLLAR_CRATE,
};
pub use light::{ImportLight, ItemLight, MacroCallLight, MacroDefLight, Namespace, VisibilityLight};
pub use hash::HashCode;
pub use def_map::{CrateDefMap, FileInfo, ModData, PerNs};
pub use config::{BuildConfig, Config, ConfigError};
