//! Placement error types.

use thiserror::Error;

use shardgrid_state::AssignmentStrategy;

/// Errors a placement decision can end in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// The candidate pool holds fewer instances than the replication factor.
    #[error("insufficient capacity: need {required} instances, pool has {available}")]
    InsufficientCapacity { required: usize, available: usize },

    #[error("segment assignment strategy not implemented: {0}")]
    NotImplemented(AssignmentStrategy),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
