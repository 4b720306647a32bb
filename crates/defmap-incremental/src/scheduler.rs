//! Dependency-ordered batch builds
//!
//! A batch is a top-sorted list of crates. A crate starts once every crate of
//! the same batch it depends on has finished, successfully or not. With more
//! than one worker, ready crates are dispatched over a job channel to scoped
//! worker threads and results come back over a second channel.

use crate::builder::{BuildContext, CrateBuilder};
use crate::cancel::CancellationToken;
use crate::error::BuildError;
use crate::service::DefMapService;
use crate::source::SourceSnapshot;
use crossbeam::channel;
use defmap_core::{Crate, CrateId, FileId};
use defmap_workspace::CrateGraph;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Shared inputs of one batch
#[derive(Clone, Copy)]
pub struct BatchContext<'a> {
    pub graph: &'a CrateGraph,
    pub sources: &'a dyn SourceSnapshot,
    pub service: &'a DefMapService,
    pub builder: &'a dyn CrateBuilder,
    pub cancel: &'a CancellationToken,
}

/// What happened to the crates of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Committed crates in completion order
    pub rebuilt: Vec<CrateId>,

    /// Crates whose builder returned an error
    pub failed: Vec<CrateId>,

    /// Crates not committed because the batch was cancelled
    pub unfinished: Vec<CrateId>,

    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrateOutcome {
    Built,
    Failed,
    Cancelled,
}

/// Build and commit one crate
fn build_crate(krate: &Arc<Crate>, ctx: &BatchContext<'_>) -> CrateOutcome {
    let Some(id) = krate.id else {
        return CrateOutcome::Failed;
    };
    if ctx.cancel.is_cancelled() {
        return CrateOutcome::Cancelled;
    }

    let start = Instant::now();
    let build_ctx = BuildContext {
        krate,
        graph: ctx.graph,
        sources: ctx.sources,
        service: ctx.service,
        cancel: ctx.cancel,
    };

    match ctx.builder.build(&build_ctx) {
        Ok(def_map) => {
            ctx.service.commit(def_map);
            tracing::info!(
                krate = %krate.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Built DefMap"
            );
            CrateOutcome::Built
        }
        Err(BuildError::Cancelled) => {
            ctx.service.mark_failed(id, failed_files(krate, ctx.sources));
            tracing::debug!(krate = %krate.name, "DefMap build cancelled");
            CrateOutcome::Cancelled
        }
        Err(err) => {
            ctx.service.mark_failed(id, failed_files(krate, ctx.sources));
            tracing::warn!(krate = %krate.name, error = %err, "DefMap build failed");
            CrateOutcome::Failed
        }
    }
}

/// Files a failed crate keeps watching: its root, stamped `0` when missing
fn failed_files(krate: &Crate, sources: &dyn SourceSnapshot) -> Option<(FileId, u64)> {
    let root = krate.root_file?;
    Some((root, sources.modification_stamp(root).unwrap_or_default()))
}

fn record(report: &mut BatchReport, krate: &Crate, outcome: CrateOutcome) {
    let Some(id) = krate.id else { return };
    match outcome {
        CrateOutcome::Built => report.rebuilt.push(id),
        CrateOutcome::Failed => report.failed.push(id),
        CrateOutcome::Cancelled => {
            report.cancelled = true;
            report.unfinished.push(id);
        }
    }
}

/// Build `batch` one crate at a time, in order
pub fn build_sequential(batch: &[Arc<Crate>], ctx: &BatchContext<'_>) -> BatchReport {
    let mut report = BatchReport::default();
    for krate in batch {
        let outcome = if report.cancelled {
            CrateOutcome::Cancelled
        } else {
            build_crate(krate, ctx)
        };
        record(&mut report, krate, outcome);
    }
    report
}

/// Build `batch` on up to `workers` threads, respecting in-batch dependencies
pub fn build_parallel(batch: &[Arc<Crate>], ctx: &BatchContext<'_>, workers: usize) -> BatchReport {
    if workers <= 1 || batch.len() <= 1 {
        return build_sequential(batch, ctx);
    }

    // Edges restricted to the batch
    let position: HashMap<_, usize> = batch
        .iter()
        .enumerate()
        .map(|(i, krate)| (krate.idx, i))
        .collect();
    let mut in_degree = vec![0usize; batch.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); batch.len()];
    for (i, krate) in batch.iter().enumerate() {
        let deps: HashSet<usize> = krate
            .dependencies
            .iter()
            .filter_map(|dep| position.get(&dep.krate).copied())
            .collect();
        in_degree[i] = deps.len();
        for dep in deps {
            dependents[dep].push(i);
        }
    }

    let mut ready: Vec<usize> = (0..batch.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut done = vec![false; batch.len()];
    let mut report = BatchReport::default();

    tracing::debug!(crates = batch.len(), workers, "Starting parallel DefMap batch");

    let (job_tx, job_rx) = channel::unbounded::<usize>();
    let (result_tx, result_rx) = channel::unbounded::<(usize, CrateOutcome)>();

    std::thread::scope(|s| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            s.spawn(move || {
                for i in job_rx.iter() {
                    let outcome = build_crate(&batch[i], ctx);
                    if result_tx.send((i, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut in_flight = 0usize;
        loop {
            if !report.cancelled {
                for i in ready.drain(..) {
                    if job_tx.send(i).is_err() {
                        break;
                    }
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                break;
            }

            let Ok((i, outcome)) = result_rx.recv() else {
                break;
            };
            in_flight -= 1;
            done[i] = true;
            record(&mut report, &batch[i], outcome);
            if ctx.cancel.is_cancelled() {
                report.cancelled = true;
            }

            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }

        drop(job_tx);
    });

    for (i, krate) in batch.iter().enumerate() {
        if !done[i] {
            if let Some(id) = krate.id {
                report.unfinished.push(id);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySources, SourceProvider};
    use defmap_core::{CrateDefMap, FileId, ModData};
    use defmap_workspace::CrateGraphBuilder;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    /// Records build order and fails crates named `fail*`
    #[derive(Default)]
    struct RecordingBuilder {
        order: Mutex<Vec<String>>,
        cancel_after: Option<(String, CancellationToken)>,
    }

    impl CrateBuilder for RecordingBuilder {
        fn build(&self, ctx: &BuildContext<'_>) -> Result<CrateDefMap, BuildError> {
            self.order.lock().push(ctx.krate.name.clone());
            if let Some((name, token)) = &self.cancel_after {
                if *name == ctx.krate.name {
                    token.cancel();
                }
            }
            if ctx.krate.name.starts_with("fail") {
                return Err(BuildError::failed(&ctx.krate.name, "boom"));
            }
            let id = ctx.krate.id.unwrap_or(CrateId::from_raw(0));
            Ok(CrateDefMap::new(
                id,
                ctx.graph.metadata(ctx.krate),
                ModData::new("crate", FileId::from_raw(0)),
                HashMap::new(),
                HashSet::new(),
                BTreeMap::new(),
            ))
        }
    }

    /// diamond: base <- (left, right) <- top
    fn diamond(left: &str) -> CrateGraph {
        let mut builder = CrateGraphBuilder::new();
        let krate = |name: &str, id| Crate::new(name, Some(CrateId::from_raw(id)), Some(FileId::from_raw(0)));
        let base = builder.add_crate(krate("base", 1));
        let l = builder.add_crate(krate(left, 2));
        let r = builder.add_crate(krate("right", 3));
        let top = builder.add_crate(krate("top", 4));
        builder.add_dependency(l, "base", base);
        builder.add_dependency(r, "base", base);
        builder.add_dependency(top, "left", l);
        builder.add_dependency(top, "right", r);
        builder.build().unwrap()
    }

    fn run(graph: &CrateGraph, builder: &RecordingBuilder, cancel: &CancellationToken, workers: usize) -> (BatchReport, DefMapService) {
        let service = DefMapService::new();
        let sources = MemorySources::new().snapshot();
        let batch: Vec<Arc<Crate>> = graph.top_sorted().cloned().collect();
        let ctx = BatchContext {
            graph,
            sources: sources.as_ref(),
            service: &service,
            builder,
            cancel,
        };
        let report = build_parallel(&batch, &ctx, workers);
        (report, service)
    }

    #[test]
    fn parallel_respects_dependencies() {
        let graph = diamond("left");
        let builder = RecordingBuilder::default();
        let (report, service) = run(&graph, &builder, &CancellationToken::new(), 4);

        let order = builder.order.lock().clone();
        assert_eq!(order.first().map(String::as_str), Some("base"));
        assert_eq!(order.last().map(String::as_str), Some("top"));
        assert_eq!(report.rebuilt.len(), 4);
        assert_eq!(service.built_crates().len(), 4);
    }

    #[test]
    fn failed_dependency_does_not_block_dependents() {
        let graph = diamond("fail_left");
        let builder = RecordingBuilder::default();
        let (report, service) = run(&graph, &builder, &CancellationToken::new(), 2);

        assert_eq!(report.failed, vec![CrateId::from_raw(2)]);
        assert!(report.rebuilt.contains(&CrateId::from_raw(4)));
        assert!(matches!(
            service.state(CrateId::from_raw(2)),
            crate::service::DefMapState::Failed
        ));
    }

    #[test]
    fn cancellation_stops_dispatch() {
        let graph = diamond("left");
        let cancel = CancellationToken::new();
        let builder = RecordingBuilder {
            cancel_after: Some(("base".to_string(), cancel.clone())),
            ..RecordingBuilder::default()
        };
        let (report, service) = run(&graph, &builder, &cancel, 4);

        assert!(report.cancelled);
        assert_eq!(report.rebuilt, vec![CrateId::from_raw(1)]);
        assert_eq!(report.unfinished.len(), 3);
        assert_eq!(service.built_crates(), vec![CrateId::from_raw(1)]);
    }

    #[test]
    fn sequential_build_keeps_order() {
        let graph = diamond("left");
        let builder = RecordingBuilder::default();
        let (report, _) = run(&graph, &builder, &CancellationToken::new(), 1);

        let order = builder.order.lock().clone();
        assert_eq!(order, vec!["base", "left", "right", "top"]);
        assert_eq!(
            report.rebuilt,
            (1..=4).map(CrateId::from_raw).collect::<Vec<_>>()
        );
    }
}
