//! Build orchestration
//!
//! `DefMapUpdater::update_all` is called after edits settle. It turns pending
//! file and crate changes into the smallest set of crates to rebuild, extends
//! it with everything depending on them, and rebuilds that closure in
//! dependency order.

use crate::builder::CrateBuilder;
use crate::cancel::CancellationToken;
use crate::error::BuildError;
use crate::graph::CrateGraphProvider;
use crate::listener::StructureChangeListener;
use crate::scheduler::{self, BatchContext, BatchReport};
use crate::service::{DefMapService, DefMapState};
use crate::source::{SourceProvider, SourceSnapshot};
use crate::tracker;
use defmap_core::{BuildConfig, Crate, CrateId, FileId};
use defmap_workspace::CrateGraph;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Result of one `update_all` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The crate graph is empty
    Skipped,

    /// First build of the session; crates committed in order
    FullBuild(Vec<CrateId>),

    /// Targeted rebuild; crates committed in order
    Rebuilt(Vec<CrateId>),

    /// More file changes arrived while this cycle drained them; call again
    Deferred,

    /// Nothing to rebuild
    UpToDate,
}

impl UpdateOutcome {
    pub fn rebuilt(&self) -> &[CrateId] {
        match self {
            Self::FullBuild(crates) | Self::Rebuilt(crates) => crates,
            _ => &[],
        }
    }
}

pub struct DefMapUpdater {
    service: Arc<DefMapService>,
    graphs: Arc<dyn CrateGraphProvider>,
    sources: Arc<dyn SourceProvider>,
    builder: Arc<dyn CrateBuilder>,
    listener: Option<Arc<dyn StructureChangeListener>>,
    config: BuildConfig,
}

impl DefMapUpdater {
    pub fn new(
        service: Arc<DefMapService>,
        graphs: Arc<dyn CrateGraphProvider>,
        sources: Arc<dyn SourceProvider>,
        builder: Arc<dyn CrateBuilder>,
    ) -> Self {
        Self {
            service,
            graphs,
            sources,
            builder,
            listener: None,
            config: BuildConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn StructureChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn service(&self) -> &Arc<DefMapService> {
        &self.service
    }

    /// Bring every DefMap up to date with the current sources and graph
    pub fn update_all(&self, cancel: &CancellationToken) -> Result<UpdateOutcome, BuildError> {
        let graph = self.graphs.crate_graph();
        if graph.is_empty() {
            return Ok(UpdateOutcome::Skipped);
        }

        if self.service.is_first_time() {
            // everything is built from the snapshot below
            self.service.take_changed_files();
            let sources = self.sources.snapshot();
            let built = self.build_all_in(&graph, sources.as_ref(), cancel)?;
            self.service.reset_is_first_time();
            self.service.reset_should_recheck_all_crates();
            return Ok(UpdateOutcome::FullBuild(built));
        }

        // Drain before snapshotting; edits after this point stay pending and defer the cycle
        let recheck_all = self.service.should_recheck_all_crates();
        let changed_files = self.service.take_changed_files();
        let sources = self.sources.snapshot();

        if recheck_all {
            // every crate is checked, per-file events add nothing
            self.recheck_all_crates(&graph, sources.as_ref(), cancel)?;
        } else {
            let dirty = match self.crates_with_changed_files(&changed_files, &graph, sources.as_ref(), cancel) {
                Ok(dirty) => dirty,
                Err(err) => {
                    for file in changed_files {
                        self.service.on_file_changed(file);
                    }
                    return Err(err);
                }
            };
            self.service.add_changed_crates(dirty);
        }

        if self.service.has_changed_files() {
            tracing::debug!("Files changed during the update, deferring rebuild");
            return Ok(UpdateOutcome::Deferred);
        }

        let changed_crates = self.service.take_changed_crates();
        if changed_crates.is_empty() {
            return Ok(UpdateOutcome::UpToDate);
        }

        let rebuilt = self.rebuild(&graph, sources.as_ref(), &changed_crates, cancel)?;
        Ok(UpdateOutcome::Rebuilt(rebuilt))
    }

    /// Rebuild every crate of the current graph
    pub fn build_all(&self, cancel: &CancellationToken) -> Result<Vec<CrateId>, BuildError> {
        let graph = self.graphs.crate_graph();
        let sources = self.sources.snapshot();
        self.build_all_in(&graph, sources.as_ref(), cancel)
    }

    fn build_all_in(
        &self,
        graph: &CrateGraph,
        sources: &dyn SourceSnapshot,
        cancel: &CancellationToken,
    ) -> Result<Vec<CrateId>, BuildError> {
        let start = Instant::now();
        let batch: Vec<Arc<Crate>> = graph
            .top_sorted()
            .filter(|krate| krate.id.is_some())
            .cloned()
            .collect();
        for krate in &batch {
            if let Some(id) = krate.id {
                self.service.evict(id);
            }
        }

        let report = self.run_batch(graph, sources, &batch, self.config.parallel, cancel);
        tracing::info!(
            crates = batch.len(),
            rebuilt = report.rebuilt.len(),
            failed = report.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Full DefMap build finished"
        );

        self.notify(&report.rebuilt);
        if report.cancelled {
            return Err(BuildError::Cancelled);
        }
        Ok(report.rebuilt)
    }

    /// Drop stale cache entries and re-run the tracker on every crate
    fn recheck_all_crates(
        &self,
        graph: &CrateGraph,
        sources: &dyn SourceSnapshot,
        cancel: &CancellationToken,
    ) -> Result<(), BuildError> {
        self.service.retain_crates(&graph.crate_ids());

        let mut changed = Vec::new();
        for krate in graph.top_sorted() {
            if tracker::is_crate_changed(krate, graph, &self.service, sources, cancel)? {
                if let Some(id) = krate.id {
                    changed.push(id);
                }
            }
        }

        tracing::debug!(changed = changed.len(), "Rechecked all crates");
        self.service.add_changed_crates(changed);
        self.service.reset_should_recheck_all_crates();
        Ok(())
    }

    /// Owners of `files` whose DefMap no longer matches the file contents
    fn crates_with_changed_files(
        &self,
        files: &HashSet<FileId>,
        graph: &CrateGraph,
        sources: &dyn SourceSnapshot,
        cancel: &CancellationToken,
    ) -> Result<HashSet<CrateId>, BuildError> {
        let pending = self.service.changed_crates();
        let mut dirty = HashSet::new();

        for &file in files {
            cancel.check()?;

            let Some((stamp, owner)) = self.service.file_stamp(file) else {
                continue;
            };
            if dirty.contains(&owner) || pending.contains(&owner) {
                continue;
            }
            if !sources.file_exists(file) {
                tracing::debug!(?file, krate = %owner, "File deleted");
                dirty.insert(owner);
                continue;
            }
            if sources.modification_stamp(file) == Some(stamp) {
                continue;
            }
            let Some(krate) = graph.find_by_id(owner) else {
                continue;
            };

            let changed = match self.service.state(owner) {
                DefMapState::Built(def_map) => {
                    tracker::is_file_changed(file, &def_map, krate, sources)
                }
                DefMapState::NotBuilt | DefMapState::Failed => true,
            };
            if changed {
                dirty.insert(owner);
            } else {
                tracing::debug!(?file, krate = %krate.name, "File changed without structural change");
            }
        }

        Ok(dirty)
    }

    /// Rebuild `changed` and everything depending on it
    fn rebuild(
        &self,
        graph: &CrateGraph,
        sources: &dyn SourceSnapshot,
        changed: &HashSet<CrateId>,
        cancel: &CancellationToken,
    ) -> Result<Vec<CrateId>, BuildError> {
        let start = Instant::now();
        let batch = graph.with_reverse_dependencies(changed);
        for krate in &batch {
            if let Some(id) = krate.id {
                self.service.evict(id);
            }
        }

        let report = self.run_batch(graph, sources, &batch, self.config.parallel_incremental, cancel);
        tracing::info!(
            changed = changed.len(),
            crates = batch.len(),
            rebuilt = report.rebuilt.len(),
            failed = report.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Incremental DefMap rebuild finished"
        );

        self.notify(&report.rebuilt);
        if report.cancelled {
            self.service.add_changed_crates(report.unfinished.iter().copied());
            return Err(BuildError::Cancelled);
        }
        Ok(report.rebuilt)
    }

    fn run_batch(
        &self,
        graph: &CrateGraph,
        sources: &dyn SourceSnapshot,
        batch: &[Arc<Crate>],
        parallel: bool,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let ctx = BatchContext {
            graph,
            sources,
            service: &self.service,
            builder: self.builder.as_ref(),
            cancel,
        };
        if parallel {
            let workers = self.config.worker_count(batch.len());
            scheduler::build_parallel(batch, &ctx, workers)
        } else {
            scheduler::build_sequential(batch, &ctx)
        }
    }

    fn notify(&self, rebuilt: &[CrateId]) {
        if rebuilt.is_empty() {
            return;
        }
        if let Some(listener) = &self.listener {
            listener.on_structure_changed(rebuilt);
        }
    }
}
