//! Crate dependency graph
//!
//! Forward edges live on each `Crate` as named dependencies. The graph adds a
//! reverse-dependency index and a topological order, both computed once when
//! the graph is built.

use defmap_core::{Crate, CrateId, CrateIdx, CrateMetaData, Dependency};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Errors raised while assembling a graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Crate '{krate}' depends on unknown crate '{dependency}'")]
    UnknownDependency { krate: String, dependency: String },

    #[error("Dependency cycle through crate '{krate}'")]
    Cycle { krate: String },

    #[error("Crate id {0} is used by more than one crate")]
    DuplicateCrateId(CrateId),
}

/// Incrementally assembles a `CrateGraph`
#[derive(Debug, Default)]
pub struct CrateGraphBuilder {
    crates: Vec<Crate>,

    /// Edges whose target index was out of range, reported by `build`
    dangling: Vec<(CrateIdx, String)>,
}

impl CrateGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a crate and return its index; any existing `idx` is overwritten
    pub fn add_crate(&mut self, mut krate: Crate) -> CrateIdx {
        let idx = CrateIdx::from_raw(self.crates.len() as u32);
        krate.idx = idx;
        self.crates.push(krate);
        idx
    }

    /// Add a dependency edge `from -> to`, visible in `from` as `name`
    pub fn add_dependency(&mut self, from: CrateIdx, name: impl Into<String>, to: CrateIdx) {
        let name = name.into();
        if to.index() >= self.crates.len() {
            self.dangling.push((from, name));
            return;
        }
        if let Some(krate) = self.crates.get_mut(from.index()) {
            krate.dependencies.push(Dependency { name, krate: to });
        }
    }

    pub fn build(self) -> Result<CrateGraph, GraphError> {
        if let Some((from, dependency)) = self.dangling.into_iter().next() {
            let krate = self
                .crates
                .get(from.index())
                .map(|c| c.name.clone())
                .unwrap_or_default();
            return Err(GraphError::UnknownDependency { krate, dependency });
        }

        let mut by_id = HashMap::new();
        for krate in &self.crates {
            if let Some(id) = krate.id {
                if by_id.insert(id, krate.idx).is_some() {
                    return Err(GraphError::DuplicateCrateId(id));
                }
            }
        }

        let mut reverse_deps: Vec<Vec<CrateIdx>> = vec![Vec::new(); self.crates.len()];
        for krate in &self.crates {
            for dep in &krate.dependencies {
                let dependents = &mut reverse_deps[dep.krate.index()];
                if !dependents.contains(&krate.idx) {
                    dependents.push(krate.idx);
                }
            }
        }

        let topo = topological_order(&self.crates, &reverse_deps)?;

        Ok(CrateGraph {
            crates: self.crates.into_iter().map(Arc::new).collect(),
            topo,
            reverse_deps,
            by_id,
        })
    }
}

/// Kahn's algorithm; ties are broken by crate index so the order is stable
fn topological_order(
    crates: &[Crate],
    reverse_deps: &[Vec<CrateIdx>],
) -> Result<Vec<CrateIdx>, GraphError> {
    let mut in_degree: Vec<usize> = crates
        .iter()
        .map(|krate| {
            let unique: HashSet<CrateIdx> = krate.dependencies.iter().map(|d| d.krate).collect();
            unique.len()
        })
        .collect();

    let mut queue: VecDeque<CrateIdx> = crates
        .iter()
        .filter(|krate| in_degree[krate.idx.index()] == 0)
        .map(|krate| krate.idx)
        .collect();

    let mut result = Vec::with_capacity(crates.len());
    while let Some(idx) = queue.pop_front() {
        result.push(idx);
        for &dependent in &reverse_deps[idx.index()] {
            let degree = &mut in_degree[dependent.index()];
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if result.len() == crates.len() {
        Ok(result)
    } else {
        let krate = crates
            .iter()
            .find(|krate| in_degree[krate.idx.index()] > 0)
            .map(|krate| krate.name.clone())
            .unwrap_or_default();
        Err(GraphError::Cycle { krate })
    }
}

/// Immutable snapshot of the crate graph
#[derive(Debug, Clone, Default)]
pub struct CrateGraph {
    crates: Vec<Arc<Crate>>,

    /// Dependencies before dependents
    topo: Vec<CrateIdx>,

    /// crate -> crates that depend on it directly
    reverse_deps: Vec<Vec<CrateIdx>>,

    by_id: HashMap<CrateId, CrateIdx>,
}

impl CrateGraph {
    pub fn is_empty(&self) -> bool {
        self.crates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.crates.len()
    }

    pub fn get(&self, idx: CrateIdx) -> Option<&Arc<Crate>> {
        self.crates.get(idx.index())
    }

    pub fn find_by_id(&self, id: CrateId) -> Option<&Arc<Crate>> {
        self.by_id.get(&id).and_then(|&idx| self.get(idx))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Arc<Crate>> {
        self.crates.iter().find(|krate| krate.name == name)
    }

    /// All crates, dependencies before dependents
    pub fn top_sorted(&self) -> impl Iterator<Item = &Arc<Crate>> + '_ {
        self.topo.iter().map(move |idx| &self.crates[idx.index()])
    }

    /// Persistent ids of all crates that have one
    pub fn crate_ids(&self) -> HashSet<CrateId> {
        self.by_id.keys().copied().collect()
    }

    /// Direct dependencies of `krate` with the names they are visible under
    pub fn dependencies<'a>(
        &'a self,
        krate: &'a Crate,
    ) -> impl Iterator<Item = (&'a str, &'a Arc<Crate>)> + 'a {
        krate
            .dependencies
            .iter()
            .filter_map(move |dep| Some((dep.name.as_str(), self.get(dep.krate)?)))
    }

    /// Crates that depend on `krate` directly
    pub fn reverse_dependencies(&self, krate: &Crate) -> impl Iterator<Item = &Arc<Crate>> + '_ {
        self.reverse_deps
            .get(krate.idx.index())
            .into_iter()
            .flatten()
            .map(move |idx| &self.crates[idx.index()])
    }

    /// Resolution-relevant metadata of `krate` in this graph
    pub fn metadata(&self, krate: &Crate) -> CrateMetaData {
        CrateMetaData::new(
            krate,
            self.dependencies(krate).filter_map(|(_, dep)| dep.id),
        )
    }

    /// `ids` plus everything that transitively depends on them, top-sorted
    ///
    /// Unknown ids are ignored. Crates without a persistent id are left out of
    /// the result but still propagate to their dependents.
    pub fn with_reverse_dependencies(&self, ids: &HashSet<CrateId>) -> Vec<Arc<Crate>> {
        let mut visited = vec![false; self.crates.len()];
        let mut queue: VecDeque<CrateIdx> = ids
            .iter()
            .filter_map(|id| self.by_id.get(id).copied())
            .collect();

        while let Some(idx) = queue.pop_front() {
            if visited[idx.index()] {
                continue;
            }
            visited[idx.index()] = true;
            for &dependent in &self.reverse_deps[idx.index()] {
                if !visited[dependent.index()] {
                    queue.push_back(dependent);
                }
            }
        }

        self.topo
            .iter()
            .filter(|idx| visited[idx.index()])
            .map(|idx| Arc::clone(&self.crates[idx.index()]))
            .filter(|krate| krate.id.is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use defmap_core::FileId;

    fn krate(name: &str, id: u32) -> Crate {
        Crate::new(name, Some(CrateId::from_raw(id)), Some(FileId::from_raw(id)))
    }

    #[test]
    fn topo_order_puts_dependencies_first() {
        let mut builder = CrateGraphBuilder::new();
        let app = builder.add_crate(krate("app", 1));
        let lib = builder.add_crate(krate("lib", 2));
        let std = builder.add_crate(krate("std", 3));
        builder.add_dependency(app, "lib", lib);
        builder.add_dependency(app, "std", std);
        builder.add_dependency(lib, "std", std);
        let graph = builder.build().unwrap();

        let order: Vec<&str> = graph.top_sorted().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["std", "lib", "app"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut builder = CrateGraphBuilder::new();
        let a = builder.add_crate(krate("a", 1));
        let b = builder.add_crate(krate("b", 2));
        builder.add_dependency(a, "b", b);
        builder.add_dependency(b, "a", a);

        assert!(matches!(builder.build(), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut builder = CrateGraphBuilder::new();
        builder.add_crate(krate("a", 1));
        builder.add_crate(krate("b", 1));

        assert_eq!(
            builder.build().unwrap_err(),
            GraphError::DuplicateCrateId(CrateId::from_raw(1))
        );
    }

    #[test]
    fn dangling_edge_is_unknown_dependency() {
        let mut builder = CrateGraphBuilder::new();
        let a = builder.add_crate(krate("a", 1));
        builder.add_dependency(a, "ghost", CrateIdx::from_raw(7));

        assert!(matches!(
            builder.build(),
            Err(GraphError::UnknownDependency { ref dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn metadata_uses_dependency_ids() {
        let mut builder = CrateGraphBuilder::new();
        let a = builder.add_crate(krate("a", 1));
        let b = builder.add_crate(krate("b", 2));
        builder.add_dependency(a, "b", b);
        let graph = builder.build().unwrap();

        let a = graph.get(a).unwrap();
        let ids: Vec<CrateId> = graph.metadata(a).dependencies().iter().copied().collect();
        assert_eq!(ids, vec![CrateId::from_raw(2)]);
    }
}
