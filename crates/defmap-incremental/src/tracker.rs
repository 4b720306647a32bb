//! Change tracker: does a crate need a new DefMap?

use crate::cancel::CancellationToken;
use crate::error::BuildError;
use crate::service::{DefMapService, DefMapState};
use crate::source::SourceSnapshot;
use defmap_collect::hash_file;
use defmap_core::{Crate, CrateDefMap, FileId};
use defmap_workspace::CrateGraph;

/// Check whether the cached DefMap of `krate` is stale
///
/// Crates that cannot be built at all (no persistent id, no root file, root
/// excluded or missing) are reported as unchanged.
pub fn is_crate_changed(
    krate: &Crate,
    graph: &CrateGraph,
    service: &DefMapService,
    sources: &dyn SourceSnapshot,
    cancel: &CancellationToken,
) -> Result<bool, BuildError> {
    cancel.check()?;

    let (Some(id), Some(root)) = (krate.id, krate.root_file) else {
        return Ok(false);
    };
    if !sources.should_index(root) || !sources.file_exists(root) {
        return Ok(false);
    }

    let def_map = match service.state(id) {
        DefMapState::Built(def_map) => def_map,
        DefMapState::NotBuilt | DefMapState::Failed => return Ok(true),
    };

    if graph.metadata(krate) != def_map.metadata {
        tracing::debug!(krate = %krate.name, "Crate metadata changed");
        return Ok(true);
    }

    if def_map
        .file_infos
        .keys()
        .any(|&file| !sources.file_exists(file))
    {
        tracing::debug!(krate = %krate.name, "File of crate was deleted");
        return Ok(true);
    }

    for &file in def_map.file_infos.keys() {
        cancel.check()?;
        if is_file_changed(file, &def_map, krate, sources) {
            tracing::debug!(krate = %krate.name, ?file, "File hash changed");
            return Ok(true);
        }
    }

    let missed_file_appeared = def_map
        .missed_files
        .iter()
        .any(|path| sources.file_by_path(path).is_some());
    if missed_file_appeared {
        tracing::debug!(krate = %krate.name, "Missed file appeared");
        return Ok(true);
    }

    Ok(false)
}

/// Recompute the structural hash of `file` and compare with the one in `def_map`
///
/// Files unknown to the DefMap or unreadable in the snapshot are not changed.
pub fn is_file_changed(
    file: FileId,
    def_map: &CrateDefMap,
    krate: &Crate,
    sources: &dyn SourceSnapshot,
) -> bool {
    let Some(info) = def_map.file_info(file) else {
        return false;
    };
    let Some(tree) = sources.item_tree(file) else {
        return false;
    };
    hash_file(krate, &tree) != info.hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildContext, CrateBuilder, ExplicitItemsBuilder};
    use crate::source::{MemorySources, SourceProvider};
    use defmap_core::{CrateId, Decl, FeatureState, ItemTree};
    use defmap_workspace::CrateGraphBuilder;
    use std::path::Path;
    use std::sync::Arc;

    struct Fixture {
        sources: MemorySources,
        service: DefMapService,
        graph: CrateGraph,
    }

    impl Fixture {
        fn new(configure: impl FnOnce(&mut Crate)) -> Self {
            let sources = MemorySources::new();
            let root = sources.set_file(
                "src/lib.rs",
                ItemTree::new(vec![Decl::function("foo", "1"), Decl::file_mod("bar")]),
            );
            let mut krate = Crate::new("lib", Some(CrateId::from_raw(1)), Some(root));
            configure(&mut krate);
            let mut builder = CrateGraphBuilder::new();
            builder.add_crate(krate);
            Self {
                sources,
                service: DefMapService::new(),
                graph: builder.build().unwrap(),
            }
        }

        fn krate(&self) -> Arc<Crate> {
            Arc::clone(self.graph.find_by_name("lib").unwrap())
        }

        fn build(&self) {
            let snapshot = self.sources.snapshot();
            let krate = self.krate();
            let cancel = CancellationToken::new();
            let ctx = BuildContext {
                krate: &krate,
                graph: &self.graph,
                sources: snapshot.as_ref(),
                service: &self.service,
                cancel: &cancel,
            };
            let def_map = ExplicitItemsBuilder.build(&ctx).unwrap();
            self.service.commit(def_map);
        }

        fn is_changed(&self) -> bool {
            let snapshot = self.sources.snapshot();
            is_crate_changed(
                &self.krate(),
                &self.graph,
                &self.service,
                snapshot.as_ref(),
                &CancellationToken::new(),
            )
            .unwrap()
        }
    }

    #[test]
    fn not_built_is_changed() {
        let fixture = Fixture::new(|_| {});
        assert!(fixture.is_changed());
        fixture.build();
        assert!(!fixture.is_changed());
    }

    #[test]
    fn failed_is_changed() {
        let fixture = Fixture::new(|_| {});
        fixture.build();
        fixture.service.mark_failed(CrateId::from_raw(1), []);
        assert!(fixture.is_changed());
    }

    #[test]
    fn crate_without_id_is_unchanged() {
        let fixture = Fixture::new(|krate| krate.id = None);
        assert!(!fixture.is_changed());
    }

    #[test]
    fn excluded_root_is_unchanged() {
        let fixture = Fixture::new(|_| {});
        fixture.sources.exclude(Path::new("src/lib.rs"));
        assert!(!fixture.is_changed());
    }

    #[test]
    fn body_edit_is_not_a_change() {
        let fixture = Fixture::new(|_| {});
        fixture.build();
        fixture.sources.set_file(
            "src/lib.rs",
            ItemTree::new(vec![Decl::function("foo", "2 + 2"), Decl::file_mod("bar")]),
        );
        assert!(!fixture.is_changed());
    }

    #[test]
    fn rename_is_a_change() {
        let fixture = Fixture::new(|_| {});
        fixture.build();
        fixture.sources.set_file(
            "src/lib.rs",
            ItemTree::new(vec![Decl::function("baz", "1"), Decl::file_mod("bar")]),
        );
        assert!(fixture.is_changed());
    }

    #[test]
    fn missed_file_appearing_is_a_change() {
        let fixture = Fixture::new(|_| {});
        fixture.build();
        assert!(!fixture.is_changed());

        fixture.sources.set_file("src/bar/mod.rs", ItemTree::default());
        assert!(fixture.is_changed());
    }

    #[test]
    fn metadata_change_is_detected() {
        let fixture = Fixture::new(|_| {});
        fixture.build();

        let changed = Fixture::new(|krate| {
            krate.features.insert("std".to_string(), FeatureState::Enabled);
        });
        let snapshot = fixture.sources.snapshot();
        let changed_crate = changed.krate();
        let result = is_crate_changed(
            &changed_crate,
            &changed.graph,
            &fixture.service,
            snapshot.as_ref(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(result);
    }

    #[test]
    fn cancelled_tracker_reports_cancellation() {
        let fixture = Fixture::new(|_| {});
        let snapshot = fixture.sources.snapshot();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = is_crate_changed(
            &fixture.krate(),
            &fixture.graph,
            &fixture.service,
            snapshot.as_ref(),
            &cancel,
        );
        assert_eq!(result, Err(BuildError::Cancelled));
    }

    #[test]
    fn unknown_file_is_not_changed() {
        let fixture = Fixture::new(|_| {});
        fixture.build();
        let def_map = fixture.service.def_map(CrateId::from_raw(1)).unwrap();
        let snapshot = fixture.sources.snapshot();
        assert!(!is_file_changed(
            FileId::from_raw(999),
            &def_map,
            &fixture.krate(),
            snapshot.as_ref()
        ));
    }
}
