//! Module light-collection and structural content hashing
//!
//! One traversal of a module's declarations produces a stream of light
//! records. The stream is consumed either by the hasher, which turns it into
//! an order-independent digest per file, or by a DefMap builder, or by both at
//! once through `CompositeVisitor`.

pub mod collector;
pub mod hasher;

pub use collector::{flatten_use_tree, CompositeVisitor, ModCollector, ModVisitor, UseItem};
pub use hasher::{hash_file, FileHashCalculator, ModDataLight, ModLightCollector};
