//! Per-crate DefMap builders
//!
//! `CrateBuilder` is the seam to the real name-resolution algorithm. The
//! bundled `ExplicitItemsBuilder` records only what is explicitly declared:
//! it walks the module tree from the crate root, hashes every file with the
//! same records it collects, and leaves macros unexpanded.

use crate::cancel::CancellationToken;
use crate::error::BuildError;
use crate::service::DefMapService;
use crate::source::SourceSnapshot;
use defmap_collect::{CompositeVisitor, FileHashCalculator, ModCollector, ModLightCollector, ModVisitor};
use defmap_core::{
    Crate, CrateDefMap, FileId, FileInfo, ImportLight, ItemDecl, ItemKind, ItemLight,
    MacroCallDecl, MacroCallLight, MacroDefLight, MacroRulesDecl, ModData, ModKind, Namespace,
};
use defmap_workspace::CrateGraph;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a builder may read while building one crate
pub struct BuildContext<'a> {
    pub krate: &'a Arc<Crate>,
    pub graph: &'a CrateGraph,
    pub sources: &'a dyn SourceSnapshot,
    pub service: &'a DefMapService,
    pub cancel: &'a CancellationToken,
}

pub trait CrateBuilder: Send + Sync {
    /// Build the DefMap of `ctx.krate`; must poll `ctx.cancel` between files
    fn build(&self, ctx: &BuildContext<'_>) -> Result<CrateDefMap, BuildError>;
}

/// Reference builder collecting explicitly declared items only
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitItemsBuilder;

impl CrateBuilder for ExplicitItemsBuilder {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<CrateDefMap, BuildError> {
        ctx.cancel.check()?;

        let krate: &Crate = ctx.krate;
        let id = krate
            .id
            .ok_or_else(|| BuildError::failed(&krate.name, "crate has no persistent id"))?;
        let root = krate
            .root_file
            .ok_or_else(|| BuildError::failed(&krate.name, "crate has no root file"))?;
        let root_path = ctx
            .sources
            .file_path(root)
            .ok_or_else(|| BuildError::failed(&krate.name, "root file does not exist"))?;
        let root_dir = root_path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut state = BuildState {
            krate,
            sources: ctx.sources,
            cancel: ctx.cancel,
            file_infos: HashMap::new(),
            missed_files: HashSet::new(),
            visited: HashSet::new(),
            error: None,
        };
        let root_module = state.collect_file(root, "crate".to_string(), root_dir)?;

        let extern_prelude: BTreeMap<String, _> = ctx
            .graph
            .dependencies(krate)
            .filter_map(|(name, dep)| {
                let dep_id = dep.id?;
                ctx.service.def_map(dep_id)?;
                Some((name.to_string(), dep_id))
            })
            .collect();

        Ok(CrateDefMap::new(
            id,
            ctx.graph.metadata(krate),
            root_module,
            state.file_infos,
            state.missed_files,
            extern_prelude,
        ))
    }
}

struct BuildState<'a> {
    krate: &'a Crate,
    sources: &'a dyn SourceSnapshot,
    cancel: &'a CancellationToken,
    file_infos: HashMap<FileId, FileInfo>,
    missed_files: HashSet<PathBuf>,
    visited: HashSet<FileId>,

    /// First error raised inside a visitor; later events are ignored
    error: Option<BuildError>,
}

impl<'a> BuildState<'a> {
    /// Collect the module rooted at `file`; `dir` is where its child module files live
    fn collect_file(
        &mut self,
        file: FileId,
        mod_path: String,
        dir: PathBuf,
    ) -> Result<ModData, BuildError> {
        self.cancel.check()?;

        if !self.visited.insert(file) {
            tracing::debug!(path = %mod_path, "File already included by another module");
            return Ok(ModData::new(mod_path, file));
        }

        let tree = self.sources.item_tree(file).ok_or_else(|| {
            BuildError::failed(&self.krate.name, format!("can't read file of module {}", mod_path))
        })?;
        let stamp = self.sources.modification_stamp(file).unwrap_or_default();

        let calculator = FileHashCalculator::new();
        let collector = ModCollector::new(self.krate);
        let file_dir = self
            .sources
            .file_path(file)
            .and_then(|path| path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| dir.clone());

        let module = {
            let light = ModLightCollector::new(&calculator, collector, String::new(), false);
            let data = ModDataCollector {
                state: &mut *self,
                calculator: &calculator,
                collector,
                data: ModData::new(mod_path, file),
                hash_path: String::new(),
                dir,
                path_attr_dir: file_dir,
            };
            let mut visitor = CompositeVisitor::new(light, data);
            collector.collect(&tree.decls, &mut visitor);
            visitor.second.data
        };

        if let Some(err) = self.error.take() {
            return Err(err);
        }

        self.file_infos.insert(
            file,
            FileInfo {
                file_id: file,
                hash: calculator.file_hash(),
                modification_stamp: stamp,
            },
        );
        Ok(module)
    }

    /// Resolve `mod name;` and collect the file it points to
    fn collect_file_module(
        &mut self,
        name: &str,
        path_attr: Option<&str>,
        mod_path: String,
        dir: &Path,
        path_attr_dir: &Path,
    ) -> Option<ModData> {
        let candidates = match path_attr {
            Some(path) => vec![path_attr_dir.join(path)],
            None => vec![
                dir.join(format!("{}.rs", name)),
                dir.join(name).join("mod.rs"),
            ],
        };

        let found = candidates.iter().find_map(|path| {
            let file = self.sources.file_by_path(path)?;
            self.sources.should_index(file).then(|| (file, path.clone()))
        });

        let Some((file, path)) = found else {
            tracing::debug!(module = %mod_path, "Module file not found");
            self.missed_files.extend(candidates);
            return None;
        };

        match self.collect_file(file, mod_path, owned_dir(&path)) {
            Ok(module) => Some(module),
            Err(err) => {
                self.error.get_or_insert(err);
                None
            }
        }
    }
}

/// Directory holding the child module files of the module in `path`
fn owned_dir(path: &Path) -> PathBuf {
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    match path.file_stem().and_then(|stem| stem.to_str()) {
        Some("mod") | None => parent,
        Some(stem) => parent.join(stem),
    }
}

/// Builder-side visitor filling one `ModData`
struct ModDataCollector<'s, 'a> {
    state: &'s mut BuildState<'a>,
    calculator: &'s FileHashCalculator,
    collector: ModCollector<'s>,
    data: ModData,

    /// File-relative module path used by the hasher
    hash_path: String,

    dir: PathBuf,
    path_attr_dir: PathBuf,
}

impl ModDataCollector<'_, '_> {
    fn collect_inline_module(&mut self, item: &ItemLight, decls: &[defmap_core::Decl]) {
        let collector = self.collector.for_child(item);
        let hash_path = format!("{}::{}", self.hash_path, item.name);
        let dir = self.dir.join(&item.name);

        let light = ModLightCollector::new(self.calculator, collector, hash_path.clone(), false);
        let data = ModDataCollector {
            state: &mut *self.state,
            calculator: self.calculator,
            collector,
            data: ModData::new(self.data.child_path(&item.name), self.data.file),
            hash_path,
            path_attr_dir: dir.clone(),
            dir,
        };
        let mut visitor = CompositeVisitor::new(light, data);
        collector.collect(decls, &mut visitor);
        let child = visitor.second.data;

        if item.is_enabled_by_cfg {
            self.data.children.insert(item.name.clone(), child);
        }
    }
}

impl ModVisitor for ModDataCollector<'_, '_> {
    fn collect_item(&mut self, item: ItemLight, decl: &ItemDecl) {
        if let ItemKind::Mod(kind) = &decl.kind {
            match kind {
                ModKind::Inline(decls) => self.collect_inline_module(&item, decls),
                ModKind::File { path_attr } => {
                    if item.is_enabled_by_cfg && self.state.error.is_none() {
                        let mod_path = self.data.child_path(&item.name);
                        let child = self.state.collect_file_module(
                            &item.name,
                            path_attr.as_deref(),
                            mod_path,
                            &self.dir,
                            &self.path_attr_dir,
                        );
                        if let Some(child) = child {
                            self.data.children.insert(item.name.clone(), child);
                        }
                    }
                }
            }
        }

        if !item.is_enabled_by_cfg {
            return;
        }
        let entry = self.data.visible_items.entry(item.name.clone()).or_default();
        if item.is_in(Namespace::Types) {
            entry.types = Some(item.visibility.clone());
        }
        if item.is_in(Namespace::Values) {
            entry.values = Some(item.visibility);
        }
    }

    fn collect_import(&mut self, import: ImportLight) {
        self.data.imports.push(import);
    }

    fn collect_macro_call(&mut self, call: MacroCallLight, _decl: &MacroCallDecl) {
        self.data.macro_calls.push(call);
    }

    fn collect_macro_def(&mut self, def: MacroDefLight, _decl: &MacroRulesDecl) {
        self.data.legacy_macros.push(def);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySources, SourceProvider};
    use defmap_collect::hash_file;
    use defmap_core::{CfgAtom, CfgExpr, CrateId, Decl, ItemTree, StructShape, VisibilityLight, Vis};
    use defmap_workspace::CrateGraphBuilder;
    use pretty_assertions::assert_eq;

    fn build(sources: &MemorySources, root: &str) -> Result<CrateDefMap, BuildError> {
        let root = sources.file_id(Path::new(root));
        let mut builder = CrateGraphBuilder::new();
        builder.add_crate(Crate::new("test", Some(CrateId::from_raw(1)), root));
        let graph = builder.build().unwrap();
        let krate = Arc::clone(graph.find_by_name("test").unwrap());
        let snapshot = sources.snapshot();
        let service = DefMapService::new();
        let cancel = CancellationToken::new();

        ExplicitItemsBuilder.build(&BuildContext {
            krate: &krate,
            graph: &graph,
            sources: snapshot.as_ref(),
            service: &service,
            cancel: &cancel,
        })
    }

    #[test]
    fn collects_module_tree_across_files() {
        let sources = MemorySources::new();
        sources.set_file(
            "src/lib.rs",
            ItemTree::new(vec![
                Decl::file_mod("a"),
                Decl::file_mod("b"),
                Decl::inline_mod("c", vec![Decl::file_mod("d")]),
            ]),
        );
        sources.set_file("src/a.rs", ItemTree::new(vec![Decl::file_mod("inner")]));
        sources.set_file("src/a/inner.rs", ItemTree::new(vec![Decl::function("f", "")]));
        sources.set_file("src/b/mod.rs", ItemTree::default());
        sources.set_file("src/c/d.rs", ItemTree::default());

        let def_map = build(&sources, "src/lib.rs").unwrap();
        assert_eq!(def_map.root.module_count(), 6);
        assert_eq!(
            def_map.root.descendant(&["a", "inner"]).map(|m| m.path.as_str()),
            Some("crate::a::inner")
        );
        assert!(def_map.root.descendant(&["c", "d"]).is_some());
        assert_eq!(def_map.file_infos.len(), 5);
        assert!(def_map.missed_files.is_empty());
    }

    #[test]
    fn missing_module_records_both_candidates() {
        let sources = MemorySources::new();
        sources.set_file("src/lib.rs", ItemTree::new(vec![Decl::file_mod("gone")]));

        let def_map = build(&sources, "src/lib.rs").unwrap();
        let mut missed: Vec<PathBuf> = def_map.missed_files.into_iter().collect();
        missed.sort();
        assert_eq!(
            missed,
            vec![PathBuf::from("src/gone.rs"), PathBuf::from("src/gone/mod.rs")]
        );
    }

    #[test]
    fn path_attribute_is_relative_to_the_file() {
        let sources = MemorySources::new();
        sources.set_file(
            "src/lib.rs",
            ItemTree::new(vec![Decl::Item(ItemDecl::new(
                "imp",
                ItemKind::Mod(ModKind::File { path_attr: Some("sys/unix.rs".into()) }),
            ))]),
        );
        sources.set_file("src/sys/unix.rs", ItemTree::new(vec![Decl::function("open", "")]));

        let def_map = build(&sources, "src/lib.rs").unwrap();
        let imp = def_map.root.descendant(&["imp"]).unwrap();
        assert!(imp.visible_items.contains_key("open"));
    }

    #[test]
    fn file_hashes_match_the_tracker() {
        let sources = MemorySources::new();
        let tree = ItemTree::new(vec![
            Decl::function("f", ""),
            Decl::inline_mod("m", vec![Decl::inline_mod("n", vec![Decl::use_path("a::b")])]),
            Decl::macro_call("foo", "x"),
        ]);
        let root = sources.set_file("src/lib.rs", tree.clone());

        let def_map = build(&sources, "src/lib.rs").unwrap();
        let krate = Crate::new("test", Some(CrateId::from_raw(1)), Some(root));
        assert_eq!(def_map.file_info(root).unwrap().hash, hash_file(&krate, &tree));
    }

    #[test]
    fn namespaces_and_cfg() {
        let sources = MemorySources::new();
        sources.set_file(
            "src/lib.rs",
            ItemTree::new(vec![
                Decl::Item(ItemDecl::new("S", ItemKind::Struct { shape: StructShape::Unit }).with_vis(Vis::Pub)),
                Decl::Item(
                    ItemDecl::new("win", ItemKind::Fn { body: String::new(), proc_macro: false })
                        .with_cfg(CfgExpr::Atom(CfgAtom::flag("windows"))),
                ),
                Decl::macro_rules("m", "() => {}"),
                Decl::use_path("std::fmt"),
            ]),
        );

        let def_map = build(&sources, "src/lib.rs").unwrap();
        let s = &def_map.root.visible_items["S"];
        assert_eq!(s.types, Some(VisibilityLight::Public));
        assert_eq!(s.values, Some(VisibilityLight::Public));
        assert!(!def_map.root.visible_items.contains_key("win"));
        assert_eq!(def_map.root.legacy_macros.len(), 1);
        assert_eq!(def_map.root.imports[0].name_in_scope, "fmt");
    }

    #[test]
    fn self_including_module_is_visited_once() {
        let sources = MemorySources::new();
        sources.set_file(
            "src/lib.rs",
            ItemTree::new(vec![Decl::Item(ItemDecl::new(
                "again",
                ItemKind::Mod(ModKind::File { path_attr: Some("lib.rs".into()) }),
            ))]),
        );

        let def_map = build(&sources, "src/lib.rs").unwrap();
        assert_eq!(def_map.file_infos.len(), 1);
        assert!(def_map.root.children["again"].visible_items.is_empty());
    }

    #[test]
    fn missing_root_fails() {
        let sources = MemorySources::new();
        let result = build(&sources, "src/lib.rs");
        assert!(matches!(result, Err(BuildError::Failed { .. })));
    }
}
