//! Structural content hasher
//!
//! Every module is reduced to its light records, which are sorted where the
//! order is not observable and then written into a SHA-256 digest with a
//! length-prefixed encoding. A file hash combines the hashes of all modules
//! declared in the file (the file's top-level module plus inline modules),
//! children before their parents.

use crate::collector::{ModCollector, ModVisitor};
use defmap_core::{
    Crate, HashCode, ImportLight, ItemDecl, ItemLight, ItemTree, MacroCallDecl, MacroCallLight,
    MacroDefLight, MacroRulesDecl, Namespace, VisibilityLight,
};
use sha2::{Digest, Sha256};
use std::cell::RefCell;

/// Record marker; `0` terminates a group
const RECORD: u8 = 1;
const GROUP_END: u8 = 0;

trait WriteLight {
    fn write_to(&self, hasher: &mut Sha256);
}

fn write_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u32).to_be_bytes());
    hasher.update(s.as_bytes());
}

fn write_bool(hasher: &mut Sha256, b: bool) {
    hasher.update([b as u8]);
}

impl WriteLight for VisibilityLight {
    fn write_to(&self, hasher: &mut Sha256) {
        match self {
            VisibilityLight::Public => hasher.update([0u8]),
            VisibilityLight::Restricted(path) => {
                hasher.update([1u8]);
                write_str(hasher, path);
            }
        }
    }
}

impl WriteLight for ItemLight {
    fn write_to(&self, hasher: &mut Sha256) {
        write_str(hasher, &self.name);
        self.visibility.write_to(hasher);
        write_bool(hasher, self.is_enabled_by_cfg);
        write_bool(hasher, self.is_in(Namespace::Types));
        write_bool(hasher, self.is_in(Namespace::Values));
        write_bool(hasher, self.is_in(Namespace::Macros));
    }
}

impl WriteLight for ImportLight {
    fn write_to(&self, hasher: &mut Sha256) {
        write_str(hasher, &self.use_path);
        write_str(hasher, &self.name_in_scope);
        self.visibility.write_to(hasher);
        write_bool(hasher, self.is_enabled_by_cfg);
        write_bool(hasher, self.is_glob);
        write_bool(hasher, self.is_extern_crate);
        write_bool(hasher, self.is_macro_use);
        write_bool(hasher, self.is_prelude);
    }
}

impl WriteLight for MacroCallLight {
    fn write_to(&self, hasher: &mut Sha256) {
        write_str(hasher, &self.path);
        write_str(hasher, &self.body);
        write_bool(hasher, self.is_enabled_by_cfg);
    }
}

impl WriteLight for MacroDefLight {
    fn write_to(&self, hasher: &mut Sha256) {
        write_str(hasher, &self.name);
        write_str(hasher, &self.body);
        write_bool(hasher, self.has_macro_export);
        write_bool(hasher, self.is_enabled_by_cfg);
    }
}

fn write_group<T: WriteLight>(hasher: &mut Sha256, records: &[T]) {
    for record in records {
        hasher.update([RECORD]);
        record.write_to(hasher);
    }
    hasher.update([GROUP_END]);
}

/// Light records of one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModDataLight {
    pub items: Vec<ItemLight>,
    pub imports: Vec<ImportLight>,
    pub macro_calls: Vec<MacroCallLight>,
    pub macro_defs: Vec<MacroDefLight>,
}

impl ModDataLight {
    /// Sort the order-independent groups and hash the module
    pub fn sort_and_hash(mut self) -> HashCode {
        self.items.sort();
        self.imports.sort();

        let mut hasher = Sha256::new();
        write_group(&mut hasher, &self.items);
        write_group(&mut hasher, &self.imports);
        write_group(&mut hasher, &self.macro_calls);
        write_group(&mut hasher, &self.macro_defs);
        HashCode::from_array(hasher.finalize().into())
    }
}

/// Accumulates `(module path, module hash)` pairs of one file
#[derive(Debug, Default)]
pub struct FileHashCalculator {
    modules: RefCell<Vec<(String, HashCode)>>,
}

impl FileHashCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&self, path: String, hash: HashCode) {
        self.modules.borrow_mut().push((path, hash));
    }

    pub fn module_count(&self) -> usize {
        self.modules.borrow().len()
    }

    pub fn file_hash(self) -> HashCode {
        let mut hasher = Sha256::new();
        for (path, hash) in self.modules.into_inner() {
            write_str(&mut hasher, &path);
            hasher.update(hash.as_bytes());
        }
        HashCode::from_array(hasher.finalize().into())
    }
}

/// Hash visitor for one module
///
/// Module paths are relative to the file: the file's top-level module is
/// `""`, an inline module `a` inside it is `::a`.
pub struct ModLightCollector<'a> {
    calculator: &'a FileHashCalculator,
    collector: ModCollector<'a>,
    path: String,
    collect_child_modules: bool,
    data: ModDataLight,
}

impl<'a> ModLightCollector<'a> {
    pub fn new(
        calculator: &'a FileHashCalculator,
        collector: ModCollector<'a>,
        path: String,
        collect_child_modules: bool,
    ) -> Self {
        Self {
            calculator,
            collector,
            path,
            collect_child_modules,
            data: ModDataLight::default(),
        }
    }
}

impl ModVisitor for ModLightCollector<'_> {
    fn collect_item(&mut self, item: ItemLight, decl: &ItemDecl) {
        if self.collect_child_modules {
            if let Some(decls) = decl.inline_module() {
                let path = format!("{}::{}", self.path, item.name);
                let collector = self.collector.for_child(&item);
                let mut child = ModLightCollector::new(self.calculator, collector, path, true);
                collector.collect(decls, &mut child);
            }
        }
        self.data.items.push(item);
    }

    fn collect_import(&mut self, import: ImportLight) {
        self.data.imports.push(import);
    }

    fn collect_macro_call(&mut self, call: MacroCallLight, _decl: &MacroCallDecl) {
        self.data.macro_calls.push(call);
    }

    fn collect_macro_def(&mut self, def: MacroDefLight, _decl: &MacroRulesDecl) {
        self.data.macro_defs.push(def);
    }

    fn after_collect_mod(&mut self) {
        let hash = std::mem::take(&mut self.data).sort_and_hash();
        self.calculator.add_module(std::mem::take(&mut self.path), hash);
    }
}

/// Structural hash of one file as seen by `krate`
pub fn hash_file(krate: &Crate, tree: &ItemTree) -> HashCode {
    let calculator = FileHashCalculator::new();
    let collector = ModCollector::new(krate);
    let mut visitor = ModLightCollector::new(&calculator, collector, String::new(), true);
    collector.collect(&tree.decls, &mut visitor);
    calculator.file_hash()
}
