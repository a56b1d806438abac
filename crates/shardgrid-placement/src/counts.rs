//! Placement count map — segments hosted per instance of a tag pool.
//!
//! Derived from placement maps on every decision, never stored. Counts span
//! every resource that shares the pool, so two tables on one tenant balance
//! against each other.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use shardgrid_state::{InstanceId, PlacementMap};

/// Number of segment replicas assigned to each instance of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlacementCounts {
    counts: BTreeMap<InstanceId, u32>,
}

impl PlacementCounts {
    /// Count replicas on `pool` across `placements`.
    ///
    /// Every pool member appears with at least zero. Replicas on instances
    /// outside the pool are ignored.
    pub fn for_pool<'a>(
        pool: &BTreeSet<InstanceId>,
        placements: impl IntoIterator<Item = &'a PlacementMap>,
    ) -> Self {
        let mut counts: BTreeMap<InstanceId, u32> =
            pool.iter().map(|id| (id.clone(), 0)).collect();
        for placement in placements {
            for (_, instance) in placement.replica_pairs() {
                if let Some(count) = counts.get_mut(instance) {
                    *count += 1;
                }
            }
        }
        Self { counts }
    }

    /// Count for `instance`; zero for instances the map does not know.
    pub fn get(&self, instance: &str) -> u32 {
        self.counts.get(instance).copied().unwrap_or(0)
    }

    /// Record one more replica on `instance`.
    pub fn increment(&mut self, instance: &str) {
        *self.counts.entry(instance.to_string()).or_insert(0) += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(id, count)| (id.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Max minus min count across the pool. Zero for an empty pool.
    pub fn spread(&self) -> u32 {
        let max = self.counts.values().max().copied().unwrap_or(0);
        let min = self.counts.values().min().copied().unwrap_or(0);
        max - min
    }
}
