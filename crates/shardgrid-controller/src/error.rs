//! Controller error types.

use thiserror::Error;

use shardgrid_placement::PlacementError;
use shardgrid_state::{AssignmentStrategy, Role, StateError, UnknownStrategy};

/// Terminal outcomes of controller operations.
///
/// Version conflicts from the store are retried internally and only show up
/// here once the retry bound is exhausted.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("insufficient untagged {role} instances: requested {requested}, available {available}")]
    InsufficientUntaggedInstances {
        role: Role,
        requested: u32,
        available: usize,
    },

    #[error("insufficient capacity: need {required} instances, pool has {available}")]
    InsufficientCapacity { required: usize, available: usize },

    #[error("unknown {role} tenant: {name}")]
    UnknownTenant { role: Role, name: String },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("replication {replication} exceeds the {capacity} instances tagged {tag}")]
    ReplicationExceedsCapacity {
        replication: u32,
        capacity: usize,
        tag: String,
    },

    #[error("assignment of segment {segment} to {resource} failed after {attempts} attempts")]
    AssignmentFailed {
        resource: String,
        segment: String,
        attempts: u32,
    },

    #[error("gave up on {key} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted { key: String, attempts: u32 },

    #[error("segment assignment strategy not implemented: {0}")]
    NotImplemented(AssignmentStrategy),

    #[error("{role} tenant already exists: {name}")]
    TenantAlreadyExists { role: Role, name: String },

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl ControllerError {
    /// Whether this wraps a store version conflict that may be retried.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::State(e) if e.is_conflict())
    }
}

impl From<PlacementError> for ControllerError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::InsufficientCapacity {
                required,
                available,
            } => ControllerError::InsufficientCapacity {
                required,
                available,
            },
            PlacementError::NotImplemented(strategy) => ControllerError::NotImplemented(strategy),
        }
    }
}

impl From<UnknownStrategy> for ControllerError {
    fn from(err: UnknownStrategy) -> Self {
        ControllerError::InvalidRequest(err.to_string())
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
