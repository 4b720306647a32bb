//! Light declaration records
//!
//! A light record is the minimal structural summary of one declaration that
//! still captures everything name resolution depends on. They are produced by
//! the module collector and consumed either by the content hasher or by a
//! DefMap builder. Field order matters: the derived `Ord` is the sort order
//! used before hashing.

use crate::item_tree::Vis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resolution namespace an item occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Types,
    Values,
    Macros,
}

/// Normalized visibility
///
/// Equivalent spellings collapse to one value: `pub(crate)` and
/// `pub(in crate)` are both `Restricted("crate")`, no modifier and
/// `pub(self)` are both `Restricted("self")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityLight {
    Public,
    Restricted(String),
}

impl VisibilityLight {
    pub fn crate_visible() -> Self {
        Self::Restricted("crate".to_string())
    }

    pub fn private() -> Self {
        Self::Restricted("self".to_string())
    }

    pub fn from_vis(vis: &Vis) -> Self {
        match vis {
            Vis::Private => Self::private(),
            Vis::Pub => Self::Public,
            Vis::Crate => Self::crate_visible(),
            Vis::Restricted(path) => {
                // 2015 edition absolute paths
                let path = path.trim().trim_start_matches("::");
                if path.is_empty() || path == "crate" {
                    Self::crate_visible()
                } else {
                    Self::Restricted(path.to_string())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemLight {
    pub name: String,
    pub visibility: VisibilityLight,
    pub is_enabled_by_cfg: bool,
    pub namespaces: BTreeSet<Namespace>,
}

impl ItemLight {
    pub fn is_in(&self, ns: Namespace) -> bool {
        self.namespaces.contains(&ns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImportLight {
    /// Full path, e.g. `foo::bar::baz`
    pub use_path: String,

    /// Name bound into scope; `_` for glob imports
    pub name_in_scope: String,

    pub visibility: VisibilityLight,
    pub is_enabled_by_cfg: bool,
    pub is_glob: bool,
    pub is_extern_crate: bool,
    pub is_macro_use: bool,

    /// `#[prelude_import]`
    pub is_prelude: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroCallLight {
    pub path: String,
    pub body: String,
    pub is_enabled_by_cfg: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDefLight {
    pub name: String,
    pub body: String,
    pub has_macro_export: bool,
    pub is_enabled_by_cfg: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_spellings_normalize() {
        assert_eq!(VisibilityLight::from_vis(&Vis::Crate), VisibilityLight::crate_visible());
        assert_eq!(
            VisibilityLight::from_vis(&Vis::Restricted("crate".into())),
            VisibilityLight::crate_visible()
        );
        assert_eq!(
            VisibilityLight::from_vis(&Vis::Restricted("::crate".into())),
            VisibilityLight::crate_visible()
        );
        assert_eq!(
            VisibilityLight::from_vis(&Vis::Restricted("self".into())),
            VisibilityLight::from_vis(&Vis::Private)
        );
        assert_eq!(
            VisibilityLight::from_vis(&Vis::Restricted("::foo::bar".into())),
            VisibilityLight::Restricted("foo::bar".into())
        );
    }

    #[test]
    fn public_differs_from_crate() {
        assert_ne!(VisibilityLight::from_vis(&Vis::Pub), VisibilityLight::from_vis(&Vis::Crate));
    }

    #[test]
    fn items_sort_by_name_first() {
        let item = |name: &str, vis: VisibilityLight| ItemLight {
            name: name.to_string(),
            visibility: vis,
            is_enabled_by_cfg: true,
            namespaces: BTreeSet::from([Namespace::Values]),
        };
        let mut items = vec![item("b", VisibilityLight::Public), item("a", VisibilityLight::private())];
        items.sort();
        assert_eq!(items[0].name, "a");
    }
}
