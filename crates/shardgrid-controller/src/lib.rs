//! ShardGrid controller — tenants, tables and online segment assignment.
//!
//! Sits on top of a [`CoordinationStore`](shardgrid_state::CoordinationStore)
//! and turns operator requests into versioned, conditional writes. Several
//! controllers may share one store: every mutation is a read-decide-commit
//! attempt that is discarded and retried when another writer got there
//! first.
//!
//! # Components
//!
//! - **`manager`** — ResourceManager: tenant/table/segment entry points
//! - **`coordinator`** — AssignmentCoordinator: the placement retry loop
//! - **`instance_pool`** — Tag queries and atomic tenant claims
//! - **`retry`** — Bounded retry with jittered exponential backoff
//! - **`config`** — TOML configuration

pub mod config;
pub mod coordinator;
pub mod error;
pub mod instance_pool;
pub mod manager;
pub mod retry;

pub use config::ControllerConfig;
pub use coordinator::{Assignment, AssignmentCoordinator, DeleteOutcome};
pub use error::{ControllerError, ControllerResult};
pub use instance_pool::InstancePool;
pub use manager::{ClusterStatus, ResourceManager, ServerTenantRequest, TableRequest, TableStatus};
pub use retry::RetryPolicy;
