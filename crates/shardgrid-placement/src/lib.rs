//! ShardGrid segment placement — pure replica-set selection.
//!
//! This crate decides which instances host a new segment. It performs no
//! I/O and holds no state: callers hand it the candidate pool, the
//! replication factor and fresh placement counts, and commit the result
//! themselves (that's `shardgrid-controller`).
//!
//! # Components
//!
//! - **`strategy`** — Random and BalanceNumSegment placers
//! - **`counts`** — Placement count map derived from placement maps

pub mod counts;
pub mod error;
pub mod strategy;

pub use counts::PlacementCounts;
pub use error::{PlacementError, PlacementResult};
pub use strategy::Placer;
