//! Incremental DefMap maintenance
//!
//! This crate keeps one DefMap per crate of the crate graph up to date while
//! sources are edited, rebuilding only what an edit actually invalidates.
//!
//! ## Architecture
//!
//! - **Service**: process-scoped cache of built DefMaps plus pending changed files/crates
//! - **Tracker**: decides whether a crate must be rebuilt (metadata, file hashes, missed files)
//! - **Updater**: full vs targeted rebuild over the reverse-dependency closure
//! - **Scheduler**: dependency-ordered builds on a bounded worker pool
//! - **Providers**: crate graph and source snapshots, with in-memory implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use defmap_incremental::{CancellationToken, DefMapService, DefMapUpdater, ExplicitItemsBuilder};
//!
//! let service = Arc::new(DefMapService::new());
//! let sources = Arc::new(MemorySources::with_listener(Arc::clone(&service)));
//! let graphs = Arc::new(SharedCrateGraph::with_listener(graph, Arc::clone(&service)));
//! let updater = DefMapUpdater::new(service, graphs, sources, Arc::new(ExplicitItemsBuilder));
//!
//! // First call builds everything, later calls rebuild what changed
//! let outcome = updater.update_all(&CancellationToken::new())?;
//! ```

pub mod error;
pub mod cancel;
pub mod service;
pub mod source;
pub mod graph;
pub mod tracker;
pub mod builder;
pub mod scheduler;
pub mod listener;
pub mod updater;

pub use error::BuildError;
pub use cancel::CancellationToken;
pub use service::{DefMapService, DefMapState};
pub use source::{MemorySources, SourceProvider, SourceSnapshot};
pub use graph::{CrateGraphProvider, SharedCrateGraph};
pub use builder::{BuildContext, CrateBuilder, ExplicitItemsBuilder};
pub use scheduler::{BatchContext, BatchReport};
pub use listener::{StructureChangeListener, StructureModificationTracker};
pub use updater::{DefMapUpdater, UpdateOutcome};
