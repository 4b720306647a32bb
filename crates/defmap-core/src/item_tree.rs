//! Item tree: the declarations of one source file, in source order
//!
//! Parsing is done by the host. What reaches this workspace is a structural
//! summary per file: every top-level declaration with just enough syntax to
//! decide name-resolution relevance (names, visibility, cfg predicates, use
//! trees, raw macro text). Function bodies are kept as opaque text so that
//! edits inside them can be observed and ignored.

use crate::cfg::CfgExpr;
use crate::ids::CrateId;
use serde::{Deserialize, Serialize};

/// Placeholder token standing in for the defining crate inside macro expansions
pub const DOLLAR_CRATE: &str = "$crate";

/// All declarations of one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemTree {
    pub decls: Vec<Decl>,
}

impl ItemTree {
    pub fn new(decls: Vec<Decl>) -> Self {
        Self { decls }
    }
}

/// One declaration of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum Decl {
    /// Named item: fn, struct, enum, mod, ...
    Item(ItemDecl),

    /// `use` declaration
    Use(UseDecl),

    /// `extern crate` declaration
    ExternCrate(ExternCrateDecl),

    /// Macro invocation in item position
    MacroCall(MacroCallDecl),

    /// `macro_rules!` definition
    MacroRules(MacroRulesDecl),

    /// `impl` block (not a named element)
    Impl,

    /// `extern "C" { ... }` block; its items belong to the enclosing module
    ForeignMod { decls: Vec<Decl> },

    /// Inner attribute or other module-level metadata
    Attr { text: String },
}

/// Syntactic visibility as written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vis {
    /// No visibility modifier
    #[default]
    Private,

    /// `pub`
    Pub,

    /// `pub(crate)`
    Crate,

    /// `pub(self)`, `pub(super)`, `pub(in path)`; holds the path text
    Restricted(String),
}

/// Shape of a struct, which decides the namespaces it occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructShape {
    Named,
    Tuple,
    Unit,
}

/// How a module's contents are provided
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModKind {
    /// `mod foo { ... }`
    Inline(Vec<Decl>),

    /// `mod foo;` with an optional `#[path = "..."]`
    File {
        #[serde(default)]
        path_attr: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Fn {
        /// Raw body text; never part of the structural hash
        #[serde(default)]
        body: String,

        /// `#[proc_macro]`-style definitions are not collected
        #[serde(default)]
        proc_macro: bool,
    },
    Struct {
        shape: StructShape,
    },
    Union,
    Enum,
    Trait,
    TypeAlias,
    Const,
    Static,
    Mod(ModKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDecl {
    /// Absent for items whose name failed to parse
    pub name: Option<String>,

    pub kind: ItemKind,

    #[serde(default)]
    pub vis: Vis,

    #[serde(default)]
    pub cfg: Option<CfgExpr>,
}

impl ItemDecl {
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            name: Some(name.into()),
            kind,
            vis: Vis::Private,
            cfg: None,
        }
    }

    pub fn with_vis(mut self, vis: Vis) -> Self {
        self.vis = vis;
        self
    }

    pub fn with_cfg(mut self, cfg: CfgExpr) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Child declarations of an inline module
    pub fn inline_module(&self) -> Option<&[Decl]> {
        match &self.kind {
            ItemKind::Mod(ModKind::Inline(decls)) => Some(decls),
            _ => None,
        }
    }
}

/// A use tree: `a::b`, `a::b as c`, `a::*`, `a::{b, c::*}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseTree {
    Path {
        path: String,
        #[serde(default)]
        alias: Option<String>,
    },
    Glob {
        #[serde(default)]
        prefix: Option<String>,
    },
    Group {
        #[serde(default)]
        prefix: Option<String>,
        items: Vec<UseTree>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseDecl {
    #[serde(default)]
    pub vis: Vis,

    #[serde(default)]
    pub cfg: Option<CfgExpr>,

    pub tree: UseTree,

    /// `#[prelude_import]`
    #[serde(default)]
    pub prelude_import: bool,

    /// Crate that defined the macro this `use` was expanded from (for `$crate::` paths)
    #[serde(default)]
    pub dollar_crate: Option<CrateId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternCrateDecl {
    pub name: String,

    #[serde(default)]
    pub alias: Option<String>,

    #[serde(default)]
    pub vis: Vis,

    #[serde(default)]
    pub cfg: Option<CfgExpr>,

    #[serde(default)]
    pub macro_use: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroCallDecl {
    pub path: String,

    /// Raw token text between the delimiters
    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub cfg: Option<CfgExpr>,

    #[serde(default)]
    pub dollar_crate: Option<CrateId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroRulesDecl {
    pub name: Option<String>,

    pub body: Option<String>,

    #[serde(default)]
    pub macro_export: bool,

    #[serde(default)]
    pub cfg: Option<CfgExpr>,
}

impl Decl {
    pub fn function(name: &str, body: &str) -> Self {
        Self::Item(ItemDecl::new(
            name,
            ItemKind::Fn {
                body: body.to_string(),
                proc_macro: false,
            },
        ))
    }

    pub fn item(name: &str, kind: ItemKind) -> Self {
        Self::Item(ItemDecl::new(name, kind))
    }

    pub fn inline_mod(name: &str, decls: Vec<Decl>) -> Self {
        Self::Item(ItemDecl::new(name, ItemKind::Mod(ModKind::Inline(decls))))
    }

    pub fn file_mod(name: &str) -> Self {
        Self::Item(ItemDecl::new(name, ItemKind::Mod(ModKind::File { path_attr: None })))
    }

    pub fn use_tree(tree: UseTree) -> Self {
        Self::Use(UseDecl {
            vis: Vis::Private,
            cfg: None,
            tree,
            prelude_import: false,
            dollar_crate: None,
        })
    }

    pub fn use_path(path: &str) -> Self {
        Self::use_tree(UseTree::Path {
            path: path.to_string(),
            alias: None,
        })
    }

    pub fn extern_crate(name: &str) -> Self {
        Self::ExternCrate(ExternCrateDecl {
            name: name.to_string(),
            alias: None,
            vis: Vis::Private,
            cfg: None,
            macro_use: false,
        })
    }

    pub fn macro_call(path: &str, body: &str) -> Self {
        Self::MacroCall(MacroCallDecl {
            path: path.to_string(),
            body: body.to_string(),
            cfg: None,
            dollar_crate: None,
        })
    }

    pub fn macro_rules(name: &str, body: &str) -> Self {
        Self::MacroRules(MacroRulesDecl {
            name: Some(name.to_string()),
            body: Some(body.to_string()),
            macro_export: false,
            cfg: None,
        })
    }
}
