//! Structural content hashes

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 256-bit SHA-256 digest
///
/// Used for per-file structural hashes stored in `FileInfo`. Two files with
/// the same `HashCode` are assumed to declare the same names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashCode([u8; 32]);

impl HashCode {
    pub fn from_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash an arbitrary byte slice
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashCode({}..)", hex::encode(&self.0[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(HashCode::of_bytes(b"mod foo;"), HashCode::of_bytes(b"mod foo;"));
        assert_ne!(HashCode::of_bytes(b"mod foo;"), HashCode::of_bytes(b"mod bar;"));
    }

    #[test]
    fn display_is_full_hex() {
        let s = HashCode::of_bytes(b"x").to_string();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_is_abbreviated() {
        let s = format!("{:?}", HashCode::of_bytes(b"x"));
        assert!(s.starts_with("HashCode("));
        assert!(s.len() < 20);
    }
}
