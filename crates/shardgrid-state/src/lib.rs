//! shardgrid-state — coordination store for ShardGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the versioned source of truth
//! the controller places segments against: instances and their tenant tags,
//! tenants, table configs, per-resource placement maps, and segment metadata.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Every mutable document carries a [`Version`] drawn from one store-wide
//! clock; mutations are conditional on the version the caller read, which
//! is the only concurrency control the controller relies on.
//!
//! The controller consumes the store through the [`CoordinationStore`]
//! trait. [`StateStore`] is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod coordination;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use coordination::CoordinationStore;
pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
