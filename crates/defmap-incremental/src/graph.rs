//! Crate graph provider

use crate::service::DefMapService;
use defmap_workspace::CrateGraph;
use parking_lot::RwLock;
use std::sync::Arc;

/// Hands out immutable snapshots of the current crate graph
pub trait CrateGraphProvider: Send + Sync {
    fn crate_graph(&self) -> Arc<CrateGraph>;
}

/// In-memory provider; replacing the graph schedules a recheck of all crates
#[derive(Debug, Default)]
pub struct SharedCrateGraph {
    graph: RwLock<Arc<CrateGraph>>,
    listener: Option<Arc<DefMapService>>,
}

impl SharedCrateGraph {
    pub fn new(graph: CrateGraph) -> Self {
        Self {
            graph: RwLock::new(Arc::new(graph)),
            listener: None,
        }
    }

    pub fn with_listener(graph: CrateGraph, service: Arc<DefMapService>) -> Self {
        Self {
            graph: RwLock::new(Arc::new(graph)),
            listener: Some(service),
        }
    }

    pub fn replace(&self, graph: CrateGraph) {
        *self.graph.write() = Arc::new(graph);
        if let Some(service) = &self.listener {
            service.on_workspace_changed();
        }
    }
}

impl CrateGraphProvider for SharedCrateGraph {
    fn crate_graph(&self) -> Arc<CrateGraph> {
        Arc::clone(&*self.graph.read())
    }
}
