//! Opaque identifiers for files and crates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a source file, assigned by the source provider.
///
/// A `FileId` stays the same for the lifetime of a session even when the
/// file's content changes. Deleting and re-creating a file at the same path
/// may yield a new id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct FileId(u32);

impl FileId {
    /// Creates a `FileId` from a raw `u32` value
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` value
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// Persistent crate identifier, stable across crate graph snapshots
///
/// This is the key of every cache entry. Crates that were not assigned a
/// persistent id yet are never cached.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct CrateId(u32);

impl CrateId {
    /// Creates a `CrateId` from a raw `u32` value
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` value
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CrateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a crate inside one crate graph snapshot
///
/// Only meaningful together with the graph that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct CrateIdx(u32);

impl CrateIdx {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_id_display() {
        assert_eq!(CrateId::from_raw(42).to_string(), "42");
    }

    #[test]
    fn file_id_serializes_transparently() {
        let json = serde_json::to_string(&FileId::from_raw(7)).unwrap();
        assert_eq!(json, "7");
    }
}
