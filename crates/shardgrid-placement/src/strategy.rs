//! Segment assignment strategies.
//!
//! A [`Placer`] is resolved from a table's [`AssignmentStrategy`] once, when
//! the table is created, and then picks the replica set for each new
//! segment. Selection is a pure function of the candidate pool, the
//! replication factor and the current [`PlacementCounts`]:
//!
//! - **Random** draws `R` distinct instances uniformly, ignoring counts.
//! - **BalanceNumSegment** takes the `R` least-loaded instances, ties broken
//!   by instance id so equal counts always yield the same choice.
//!
//! Bucketized placement is a known strategy name with no defined behavior;
//! resolving it fails with [`PlacementError::NotImplemented`].

use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use shardgrid_state::{AssignmentStrategy, InstanceId};

use crate::counts::PlacementCounts;
use crate::error::{PlacementError, PlacementResult};

/// An executable placement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placer {
    Random,
    BalanceNumSegment,
}

impl Placer {
    /// Resolve the strategy a table was configured with.
    pub fn for_strategy(strategy: AssignmentStrategy) -> PlacementResult<Self> {
        match strategy {
            AssignmentStrategy::Random => Ok(Placer::Random),
            AssignmentStrategy::BalanceNumSegment => Ok(Placer::BalanceNumSegment),
            AssignmentStrategy::BucketizedSegment => Err(PlacementError::NotImplemented(strategy)),
        }
    }

    pub fn strategy(&self) -> AssignmentStrategy {
        match self {
            Placer::Random => AssignmentStrategy::Random,
            Placer::BalanceNumSegment => AssignmentStrategy::BalanceNumSegment,
        }
    }

    /// Choose `replication` distinct instances from `candidates`.
    pub fn select(
        &self,
        candidates: &BTreeSet<InstanceId>,
        replication: usize,
        counts: &PlacementCounts,
    ) -> PlacementResult<Vec<InstanceId>> {
        self.select_with_rng(candidates, replication, counts, &mut rand::rng())
    }

    /// [`select`](Self::select) with a caller-provided random source.
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        candidates: &BTreeSet<InstanceId>,
        replication: usize,
        counts: &PlacementCounts,
        rng: &mut R,
    ) -> PlacementResult<Vec<InstanceId>> {
        if candidates.len() < replication {
            return Err(PlacementError::InsufficientCapacity {
                required: replication,
                available: candidates.len(),
            });
        }

        let selected = match self {
            Placer::Random => {
                let mut pool: Vec<InstanceId> = candidates.iter().cloned().collect();
                pool.shuffle(rng);
                pool.truncate(replication);
                pool
            }
            Placer::BalanceNumSegment => {
                let mut ranked: Vec<(u32, &InstanceId)> = candidates
                    .iter()
                    .map(|id| (counts.get(id), id))
                    .collect();
                ranked.sort();
                ranked
                    .into_iter()
                    .take(replication)
                    .map(|(_, id)| id.clone())
                    .collect()
            }
        };

        debug!(
            strategy = %self.strategy(),
            pool = candidates.len(),
            replication,
            ?selected,
            "selected replica set"
        );
        Ok(selected)
    }
}
