//! Conditional compilation options and expressions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single cfg atom: `unix` or `target_os = "linux"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfgAtom {
    /// Bare flag, e.g. `test`
    Flag(String),

    /// Key-value pair, e.g. `feature = "std"`
    KeyValue { key: String, value: String },
}

impl CfgAtom {
    pub fn flag(name: impl Into<String>) -> Self {
        Self::Flag(name.into())
    }

    pub fn key_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The set of cfg atoms enabled for a crate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CfgOptions {
    atoms: BTreeSet<CfgAtom>,
}

impl CfgOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, atom: CfgAtom) {
        self.atoms.insert(atom);
    }

    pub fn contains(&self, atom: &CfgAtom) -> bool {
        self.atoms.contains(atom)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CfgAtom> {
        self.atoms.iter()
    }
}

impl FromIterator<CfgAtom> for CfgOptions {
    fn from_iter<T: IntoIterator<Item = CfgAtom>>(iter: T) -> Self {
        Self {
            atoms: iter.into_iter().collect(),
        }
    }
}

/// A `#[cfg(...)]` predicate attached to a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfgExpr {
    Atom(CfgAtom),
    All(Vec<CfgExpr>),
    Any(Vec<CfgExpr>),
    Not(Box<CfgExpr>),
}

impl CfgExpr {
    /// Evaluate against a predicate deciding whether one atom is enabled
    pub fn eval(&self, is_enabled: &impl Fn(&CfgAtom) -> bool) -> bool {
        match self {
            Self::Atom(atom) => is_enabled(atom),
            Self::All(exprs) => exprs.iter().all(|e| e.eval(is_enabled)),
            Self::Any(exprs) => exprs.iter().any(|e| e.eval(is_enabled)),
            Self::Not(expr) => !expr.eval(is_enabled),
        }
    }
}
