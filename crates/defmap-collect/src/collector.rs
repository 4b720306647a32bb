//! Module light-collector
//!
//! Walks the declarations of one module and reports every name-resolution
//! relevant declaration to a `ModVisitor` as a light record. `extern crate`
//! declarations are hoisted and reported before everything else. Impls and
//! attributes are skipped, foreign-module contents are reported in place.
//! Inline child modules are reported as items; a visitor that wants their
//! contents recurses with a nested collector.

use defmap_core::{
    Crate, Decl, ExternCrateDecl, ImportLight, ItemDecl, ItemKind, ItemLight, MacroCallDecl,
    MacroCallLight, MacroDefLight, MacroRulesDecl, Namespace, StructShape, UseDecl, UseTree,
    VisibilityLight, DOLLAR_CRATE,
};
use std::collections::BTreeSet;

/// Sink for the events of one module traversal
pub trait ModVisitor {
    fn collect_item(&mut self, item: ItemLight, decl: &ItemDecl);

    fn collect_import(&mut self, import: ImportLight);

    fn collect_macro_call(&mut self, call: MacroCallLight, decl: &MacroCallDecl);

    fn collect_macro_def(&mut self, def: MacroDefLight, decl: &MacroRulesDecl);

    /// Called once after the last declaration of the module
    fn after_collect_mod(&mut self) {}
}

/// Forwards every event to two visitors, `first` before `second`
#[derive(Debug)]
pub struct CompositeVisitor<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: ModVisitor, B: ModVisitor> CompositeVisitor<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: ModVisitor, B: ModVisitor> ModVisitor for CompositeVisitor<A, B> {
    fn collect_item(&mut self, item: ItemLight, decl: &ItemDecl) {
        self.first.collect_item(item.clone(), decl);
        self.second.collect_item(item, decl);
    }

    fn collect_import(&mut self, import: ImportLight) {
        self.first.collect_import(import.clone());
        self.second.collect_import(import);
    }

    fn collect_macro_call(&mut self, call: MacroCallLight, decl: &MacroCallDecl) {
        self.first.collect_macro_call(call.clone(), decl);
        self.second.collect_macro_call(call, decl);
    }

    fn collect_macro_def(&mut self, def: MacroDefLight, decl: &MacroRulesDecl) {
        self.first.collect_macro_def(def.clone(), decl);
        self.second.collect_macro_def(def, decl);
    }

    fn after_collect_mod(&mut self) {
        self.first.after_collect_mod();
        self.second.after_collect_mod();
    }
}

/// Traverses one module's declarations for one crate
///
/// `mod_enabled` is the cfg state of the enclosing inline modules within the
/// same file; it is combined with each declaration's own predicate. Every
/// file starts from an enabled module so a file's records do not depend on
/// where the file is mounted.
#[derive(Debug, Clone, Copy)]
pub struct ModCollector<'a> {
    krate: &'a Crate,
    mod_enabled: bool,
}

impl<'a> ModCollector<'a> {
    /// Collector for the top-level module of a file
    pub fn new(krate: &'a Crate) -> Self {
        Self {
            krate,
            mod_enabled: true,
        }
    }

    /// Collector for an inline child module described by `item`
    pub fn for_child(&self, item: &ItemLight) -> Self {
        Self {
            krate: self.krate,
            mod_enabled: item.is_enabled_by_cfg,
        }
    }

    pub fn collect<V: ModVisitor + ?Sized>(&self, decls: &[Decl], visitor: &mut V) {
        for decl in decls {
            if let Decl::ExternCrate(extern_crate) = decl {
                visitor.collect_import(self.extern_crate_import(extern_crate));
            }
        }

        self.collect_regular(decls, visitor);
        visitor.after_collect_mod();
    }

    fn collect_regular<V: ModVisitor + ?Sized>(&self, decls: &[Decl], visitor: &mut V) {
        for decl in decls {
            match decl {
                Decl::Item(item) => {
                    if let Some(light) = self.item_light(item) {
                        visitor.collect_item(light, item);
                    }
                }
                Decl::Use(use_decl) => {
                    for import in self.use_imports(use_decl) {
                        visitor.collect_import(import);
                    }
                }
                Decl::MacroCall(call) => {
                    visitor.collect_macro_call(self.macro_call_light(call), call);
                }
                Decl::MacroRules(def) => {
                    if let Some(light) = self.macro_def_light(def) {
                        visitor.collect_macro_def(light, def);
                    }
                }
                Decl::ForeignMod { decls } => self.collect_regular(decls, visitor),
                Decl::ExternCrate(_) | Decl::Impl | Decl::Attr { .. } => {}
            }
        }
    }

    fn is_enabled(&self, cfg: Option<&defmap_core::CfgExpr>) -> bool {
        self.mod_enabled && self.krate.is_enabled_by_cfg(cfg)
    }

    fn item_light(&self, item: &ItemDecl) -> Option<ItemLight> {
        let name = item.name.as_ref()?;
        let namespaces: BTreeSet<Namespace> = match &item.kind {
            ItemKind::Fn { proc_macro: true, .. } => return None,
            ItemKind::Fn { .. } | ItemKind::Const | ItemKind::Static => {
                BTreeSet::from([Namespace::Values])
            }
            ItemKind::Struct { shape: StructShape::Named } => BTreeSet::from([Namespace::Types]),
            ItemKind::Struct { .. } => BTreeSet::from([Namespace::Types, Namespace::Values]),
            ItemKind::Union
            | ItemKind::Enum
            | ItemKind::Trait
            | ItemKind::TypeAlias
            | ItemKind::Mod(_) => BTreeSet::from([Namespace::Types]),
        };

        Some(ItemLight {
            name: name.clone(),
            visibility: VisibilityLight::from_vis(&item.vis),
            is_enabled_by_cfg: self.is_enabled(item.cfg.as_ref()),
            namespaces,
        })
    }

    fn extern_crate_import(&self, decl: &ExternCrateDecl) -> ImportLight {
        ImportLight {
            use_path: decl.name.clone(),
            name_in_scope: decl.alias.clone().unwrap_or_else(|| decl.name.clone()),
            visibility: VisibilityLight::from_vis(&decl.vis),
            is_enabled_by_cfg: self.is_enabled(decl.cfg.as_ref()),
            is_glob: false,
            is_extern_crate: true,
            is_macro_use: decl.macro_use,
            is_prelude: false,
        }
    }

    fn use_imports(&self, decl: &UseDecl) -> Vec<ImportLight> {
        let visibility = VisibilityLight::from_vis(&decl.vis);
        let is_enabled_by_cfg = self.is_enabled(decl.cfg.as_ref());

        flatten_use_tree(&decl.tree)
            .into_iter()
            .map(|use_item| ImportLight {
                use_path: adjust_dollar_crate(&use_item.path, decl.dollar_crate),
                name_in_scope: use_item.name,
                visibility: visibility.clone(),
                is_enabled_by_cfg,
                is_glob: use_item.is_glob,
                is_extern_crate: false,
                is_macro_use: false,
                is_prelude: decl.prelude_import,
            })
            .collect()
    }

    fn macro_call_light(&self, call: &MacroCallDecl) -> MacroCallLight {
        MacroCallLight {
            path: adjust_dollar_crate(&call.path, call.dollar_crate),
            body: call.body.clone(),
            is_enabled_by_cfg: self.is_enabled(call.cfg.as_ref()),
        }
    }

    fn macro_def_light(&self, def: &MacroRulesDecl) -> Option<MacroDefLight> {
        Some(MacroDefLight {
            name: def.name.clone()?,
            body: def.body.clone()?,
            has_macro_export: def.macro_export,
            is_enabled_by_cfg: self.is_enabled(def.cfg.as_ref()),
        })
    }
}

/// One leaf of a flattened use tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseItem {
    pub path: String,

    /// Bound name, `_` for globs
    pub name: String,

    pub is_glob: bool,
}

/// Flatten a use tree into its leaves, prefixes prepended
pub fn flatten_use_tree(tree: &UseTree) -> Vec<UseItem> {
    let mut out = Vec::new();
    flatten_into(tree, None, &mut out);
    out
}

fn flatten_into(tree: &UseTree, prefix: Option<&str>, out: &mut Vec<UseItem>) {
    match tree {
        UseTree::Path { path, alias } => {
            // `use foo::{self}` binds `foo`
            let full = match prefix {
                Some(prefix) if path == "self" => prefix.to_string(),
                _ => join_path(prefix, Some(path)),
            };
            let name = alias.clone().unwrap_or_else(|| last_segment(&full).to_string());
            out.push(UseItem {
                path: full,
                name,
                is_glob: false,
            });
        }
        UseTree::Glob { prefix: own } => {
            let mut path = join_path(prefix, own.as_deref());
            if path.is_empty() {
                path = "crate".to_string();
            }
            out.push(UseItem {
                path,
                name: "_".to_string(),
                is_glob: true,
            });
        }
        UseTree::Group { prefix: own, items } => {
            let group_prefix = join_path(prefix, own.as_deref());
            let group_prefix = (!group_prefix.is_empty()).then_some(group_prefix.as_str());
            for item in items {
                flatten_into(item, group_prefix, out);
            }
        }
    }
}

fn join_path(prefix: Option<&str>, path: Option<&str>) -> String {
    let prefix = prefix.map(|p| p.trim_end_matches("::")).filter(|p| !p.is_empty());
    let path = path.filter(|p| !p.is_empty());
    match (prefix, path) {
        (Some(prefix), Some(path)) => format!("{}::{}", prefix, path),
        (Some(single), None) | (None, Some(single)) => single.to_string(),
        (None, None) => String::new(),
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Rewrite `$crate::a::b` to `$crate::<id>::a::b` for the crate the macro came from
fn adjust_dollar_crate(path: &str, origin: Option<defmap_core::CrateId>) -> String {
    let rest = match path.strip_prefix(DOLLAR_CRATE) {
        Some(rest) if rest.is_empty() || rest.starts_with("::") => rest,
        _ => return path.to_string(),
    };

    match origin {
        Some(id) => format!("{}::{}{}", DOLLAR_CRATE, id, rest),
        None => {
            tracing::error!(path, "Can't find crate for path starting with $crate");
            path.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use defmap_core::{CfgAtom, CfgExpr, CrateId, FileId, ModKind, Vis};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ModVisitor for Recorder {
        fn collect_item(&mut self, item: ItemLight, _decl: &ItemDecl) {
            self.events.push(format!("item {} {:?}", item.name, item.namespaces));
        }

        fn collect_import(&mut self, import: ImportLight) {
            self.events
                .push(format!("import {} as {}", import.use_path, import.name_in_scope));
        }

        fn collect_macro_call(&mut self, call: MacroCallLight, _decl: &MacroCallDecl) {
            self.events.push(format!("call {}", call.path));
        }

        fn collect_macro_def(&mut self, def: MacroDefLight, _decl: &MacroRulesDecl) {
            self.events.push(format!("def {}", def.name));
        }

        fn after_collect_mod(&mut self) {
            self.events.push("end".to_string());
        }
    }

    fn krate() -> Crate {
        Crate::new("test", Some(CrateId::from_raw(1)), Some(FileId::from_raw(0)))
    }

    fn collect(decls: &[Decl]) -> Vec<String> {
        let krate = krate();
        let mut recorder = Recorder::default();
        ModCollector::new(&krate).collect(decls, &mut recorder);
        recorder.events
    }

    fn group(prefix: Option<&str>, items: Vec<UseTree>) -> UseTree {
        UseTree::Group {
            prefix: prefix.map(str::to_string),
            items,
        }
    }

    fn path(p: &str) -> UseTree {
        UseTree::Path {
            path: p.to_string(),
            alias: None,
        }
    }

    #[test]
    fn extern_crates_are_hoisted() {
        let events = collect(&[
            Decl::function("foo", ""),
            Decl::extern_crate("std"),
            Decl::Impl,
        ]);
        assert_eq!(
            events,
            vec!["import std as std", "item foo {Values}", "end"]
        );
    }

    #[test]
    fn foreign_mod_items_are_flattened() {
        let events = collect(&[Decl::ForeignMod {
            decls: vec![Decl::item("ERRNO", ItemKind::Static)],
        }]);
        assert_eq!(events, vec!["item ERRNO {Values}", "end"]);
    }

    #[test]
    fn unnamed_and_proc_macro_items_are_skipped() {
        let mut unnamed = ItemDecl::new("x", ItemKind::Enum);
        unnamed.name = None;
        let events = collect(&[
            Decl::Item(unnamed),
            Decl::item("derive_it", ItemKind::Fn { body: String::new(), proc_macro: true }),
            Decl::MacroRules(MacroRulesDecl {
                name: Some("m".into()),
                body: None,
                macro_export: false,
                cfg: None,
            }),
        ]);
        assert_eq!(events, vec!["end"]);
    }

    #[test]
    fn struct_shapes_pick_namespaces() {
        let events = collect(&[
            Decl::item("A", ItemKind::Struct { shape: StructShape::Named }),
            Decl::item("B", ItemKind::Struct { shape: StructShape::Tuple }),
            Decl::item("m", ItemKind::Mod(ModKind::File { path_attr: None })),
        ]);
        assert_eq!(
            events,
            vec!["item A {Types}", "item B {Types, Values}", "item m {Types}", "end"]
        );
    }

    #[test]
    fn use_tree_flattening() {
        let tree = group(
            Some("foo"),
            vec![
                path("self"),
                path("bar"),
                UseTree::Path { path: "baz::qux".into(), alias: Some("q".into()) },
                group(Some("inner"), vec![UseTree::Glob { prefix: None }]),
            ],
        );
        let items: Vec<(String, String, bool)> = flatten_use_tree(&tree)
            .into_iter()
            .map(|i| (i.path, i.name, i.is_glob))
            .collect();

        assert_eq!(
            items,
            vec![
                ("foo".to_string(), "foo".to_string(), false),
                ("foo::bar".to_string(), "bar".to_string(), false),
                ("foo::baz::qux".to_string(), "q".to_string(), false),
                ("foo::inner".to_string(), "_".to_string(), true),
            ]
        );
    }

    #[test]
    fn top_level_glob_is_crate() {
        let items = flatten_use_tree(&UseTree::Glob { prefix: None });
        assert_eq!(items[0].path, "crate");
        assert!(items[0].is_glob);
    }

    #[test]
    fn dollar_crate_paths_are_qualified() {
        assert_eq!(
            adjust_dollar_crate("$crate::foo::bar", Some(CrateId::from_raw(7))),
            "$crate::7::foo::bar"
        );
        assert_eq!(adjust_dollar_crate("$crate::foo", None), "$crate::foo");
        assert_eq!(adjust_dollar_crate("$crated::foo", Some(CrateId::from_raw(7))), "$crated::foo");
        assert_eq!(adjust_dollar_crate("foo::bar", Some(CrateId::from_raw(7))), "foo::bar");
    }

    #[test]
    fn cfg_disabled_module_disables_children() {
        let krate = krate();
        let disabled = ItemDecl::new("m", ItemKind::Mod(ModKind::Inline(vec![])))
            .with_cfg(CfgExpr::Atom(CfgAtom::flag("windows")));
        let collector = ModCollector::new(&krate);
        let light = collector.item_light(&disabled).unwrap();
        assert!(!light.is_enabled_by_cfg);

        let child = collector.for_child(&light);
        let inner = child.item_light(&ItemDecl::new("f", ItemKind::Const)).unwrap();
        assert!(!inner.is_enabled_by_cfg);
    }

    #[test]
    fn extern_crate_alias_and_visibility() {
        let krate = krate();
        let decl = ExternCrateDecl {
            name: "alloc".into(),
            alias: Some("a".into()),
            vis: Vis::Pub,
            cfg: None,
            macro_use: true,
        };
        let import = ModCollector::new(&krate).extern_crate_import(&decl);
        assert_eq!(import.use_path, "alloc");
        assert_eq!(import.name_in_scope, "a");
        assert_eq!(import.visibility, VisibilityLight::Public);
        assert!(import.is_extern_crate && import.is_macro_use);
    }
}
