//! Assignment coordinator: the read-decide-commit loop.
//!
//! Each segment operation reads the table's placement together with its
//! version, decides locally, and commits with a write conditioned on that
//! version. A new segment is decided from counts across the whole server
//! pool, so its commit is also conditioned on the pool version read in the
//! same snapshot. A lost race discards the decision and starts over from a
//! fresh read, so every committed placement was decided against the exact
//! state it replaced. Placement counts are recomputed from the store on every
//! attempt and never cached.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info};

use shardgrid_placement::{PlacementCounts, Placer};
use shardgrid_state::{
    CoordinationStore, InstanceId, PlacementMap, SegmentChange, SegmentMetadata, StateError,
    TableConfig, Version, Versioned,
};

use crate::error::{ControllerError, ControllerResult};
use crate::retry::{RetryPolicy, retry_on_conflict};

/// Result of a committed segment assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub resource: String,
    pub segment: String,
    /// Replica set, in the order the strategy chose it.
    pub replicas: Vec<InstanceId>,
    /// Placement version produced by the commit.
    pub version: Version,
    /// True when the segment already existed and only its metadata changed.
    pub refreshed: bool,
}

/// Outcome of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Places, refreshes and removes segments under optimistic concurrency.
///
/// Cheap to clone; any number of coordinators may share one store.
#[derive(Clone)]
pub struct AssignmentCoordinator {
    store: Arc<dyn CoordinationStore>,
    retry: RetryPolicy,
}

impl AssignmentCoordinator {
    pub fn new(store: Arc<dyn CoordinationStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Place `segment` on the table `resource`, or refresh it if it is
    /// already placed.
    ///
    /// A new segment gets exactly `replication` distinct instances from the
    /// table's server pool. An existing segment keeps its replicas; only its
    /// download location and refresh time are updated.
    pub async fn assign_segment(
        &self,
        resource: &str,
        segment: &str,
        download_url: &str,
    ) -> ControllerResult<Assignment> {
        let key = format!("{resource}/{segment}");
        retry_on_conflict(&self.retry, &key, |attempt| {
            self.try_assign(resource, segment, download_url, attempt)
        })
        .await
        .map_err(|err| match err {
            ControllerError::ConflictRetriesExhausted { attempts, .. } => {
                ControllerError::AssignmentFailed {
                    resource: resource.to_string(),
                    segment: segment.to_string(),
                    attempts,
                }
            }
            other => other,
        })
    }

    /// One read-decide-commit attempt.
    fn try_assign(
        &self,
        resource: &str,
        segment: &str,
        download_url: &str,
        attempt: u32,
    ) -> ControllerResult<Assignment> {
        let table = self.table(resource)?;
        let placer = Placer::for_strategy(table.strategy)?;
        let now = epoch_secs();
        let tag = table.server_tag();

        // The table's own version, the counts across its pool and the pool
        // version all come from one snapshot.
        let snapshot = self.store.read_pool_placements(&tag)?;
        let current = snapshot
            .value
            .get(resource)
            .ok_or_else(|| ControllerError::UnknownTable(resource.to_string()))?;

        if let Some(replicas) = current.value.replicas(segment) {
            let metadata = match self.store.get_segment(resource, segment)? {
                Some(mut existing) => {
                    existing.download_url = download_url.to_string();
                    existing.refreshed_at = Some(now);
                    existing
                }
                None => new_metadata(resource, segment, download_url, now),
            };
            let version = self.commit(
                resource,
                &current.value,
                SegmentChange::Put(metadata),
                current.version,
                None,
            )?;
            info!(%resource, %segment, %version, ?replicas, "segment refreshed");
            return Ok(Assignment {
                resource: resource.to_string(),
                segment: segment.to_string(),
                replicas,
                version,
                refreshed: true,
            });
        }

        let pool = self.pool_for(&tag)?;
        let counts = PlacementCounts::for_pool(&pool, snapshot.value.values().map(|p| &p.value));
        let replicas = placer.select(&pool, table.replication as usize, &counts)?;

        let mut next = current.value.clone();
        next.insert(segment, &replicas);
        let metadata = new_metadata(resource, segment, download_url, now);
        let version = self.commit(
            resource,
            &next,
            SegmentChange::Put(metadata),
            current.version,
            Some(snapshot.version),
        )?;

        info!(
            %resource,
            %segment,
            strategy = %table.strategy,
            attempt,
            %version,
            ?replicas,
            "segment assigned"
        );
        Ok(Assignment {
            resource: resource.to_string(),
            segment: segment.to_string(),
            replicas,
            version,
            refreshed: false,
        })
    }

    /// Remove `segment` from `resource`. Absent segments report `NotFound`.
    pub async fn delete_segment(&self, resource: &str, segment: &str) -> ControllerResult<DeleteOutcome> {
        let key = format!("{resource}/{segment}");
        retry_on_conflict(&self.retry, &key, |_| {
            let current = self.placement(resource)?;
            if !current.value.contains(segment) {
                debug!(%resource, %segment, "segment not placed, nothing to delete");
                return Ok(DeleteOutcome::NotFound);
            }

            let mut next = current.value.clone();
            next.remove(segment);
            let version = self.commit(
                resource,
                &next,
                SegmentChange::Remove(segment.to_string()),
                current.version,
                None,
            )?;
            info!(%resource, %segment, %version, "segment deleted");
            Ok(DeleteOutcome::Deleted)
        })
        .await
    }

    /// Remove a table with its placement and segment metadata.
    pub async fn delete_table(&self, resource: &str) -> ControllerResult<DeleteOutcome> {
        retry_on_conflict(&self.retry, resource, |_| {
            let Some(current) = self.store.read_placement(resource)? else {
                debug!(%resource, "table not found, nothing to delete");
                return Ok(DeleteOutcome::NotFound);
            };
            match self.store.delete_table_if_version(resource, current.version) {
                Ok(()) => {
                    info!(%resource, segments = current.value.len(), "table deleted");
                    Ok(DeleteOutcome::Deleted)
                }
                Err(StateError::NotFound(_)) => Ok(DeleteOutcome::NotFound),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Current placement of `resource`.
    pub fn placement(&self, resource: &str) -> ControllerResult<Versioned<PlacementMap>> {
        self.store
            .read_placement(resource)?
            .ok_or_else(|| ControllerError::UnknownTable(resource.to_string()))
    }

    /// Placement counts for every instance tagged `tag`, across all tables
    /// placed on that pool.
    pub fn placement_counts(&self, tag: &str) -> ControllerResult<PlacementCounts> {
        let pool = self.pool_for(tag)?;
        let snapshot = self.store.read_pool_placements(tag)?;
        Ok(PlacementCounts::for_pool(
            &pool,
            snapshot.value.values().map(|p| &p.value),
        ))
    }

    fn table(&self, resource: &str) -> ControllerResult<TableConfig> {
        self.store
            .get_table(resource)?
            .ok_or_else(|| ControllerError::UnknownTable(resource.to_string()))
    }

    fn pool_for(&self, tag: &str) -> ControllerResult<BTreeSet<InstanceId>> {
        Ok(self
            .store
            .read_instances()?
            .value
            .into_iter()
            .filter(|i| i.has_tag(tag))
            .map(|i| i.id)
            .collect())
    }

    /// Conditional placement write, optionally also conditioned on the
    /// server pool version. A table deleted since the read surfaces as
    /// `UnknownTable`.
    fn commit(
        &self,
        resource: &str,
        placement: &PlacementMap,
        change: SegmentChange,
        expected: Version,
        pool: Option<Version>,
    ) -> ControllerResult<Version> {
        match self
            .store
            .write_placement_if_version(resource, placement, &[change], expected, pool)
        {
            Ok(version) => Ok(version),
            Err(StateError::NotFound(_)) => Err(ControllerError::UnknownTable(resource.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

fn new_metadata(resource: &str, segment: &str, download_url: &str, now: u64) -> SegmentMetadata {
    SegmentMetadata {
        resource: resource.to_string(),
        name: segment.to_string(),
        download_url: download_url.to_string(),
        pushed_at: now,
        refreshed_at: None,
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
