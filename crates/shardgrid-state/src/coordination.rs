//! The coordination-store contract consumed by the controller.
//!
//! Every mutation of shared state goes through a conditional write keyed on
//! a [`Version`] read earlier. A write whose expected version no longer
//! matches fails with [`StateError::VersionConflict`] and leaves the store
//! untouched; callers re-read and retry.
//!
//! [`StateError::VersionConflict`]: crate::StateError::VersionConflict

use std::collections::BTreeMap;

use crate::error::StateResult;
use crate::types::*;

/// Versioned read/write access to instances, tenants, tables and placements.
///
/// Implementations must be safe to share across tasks; the controller holds
/// one behind an `Arc` and calls it from concurrent requests.
pub trait CoordinationStore: Send + Sync {
    // ── Instances and tags ─────────────────────────────────────────

    /// Read every instance together with the tag document's version.
    fn read_instances(&self) -> StateResult<Versioned<Vec<InstanceConfig>>>;

    /// Add an instance to the cluster. Returns false if the id already exists,
    /// in which case the stored instance (and its tags) is left as is.
    fn register_instance(&self, instance: &InstanceConfig) -> StateResult<bool>;

    /// Add each `(instance, tag)` pair and optionally record a tenant, all in
    /// one write, provided the tag document is still at `expected`.
    ///
    /// Fails with `NotFound` for an unknown instance and `AlreadyExists` for
    /// a duplicate tenant; neither failure mutates anything.
    fn write_tags_if_version(
        &self,
        tags: &[(InstanceId, String)],
        tenant: Option<&TenantRecord>,
        expected: Version,
    ) -> StateResult<Version>;

    fn get_tenant(&self, role: Role, name: &str) -> StateResult<Option<TenantRecord>>;

    fn list_tenants(&self) -> StateResult<Vec<TenantRecord>>;

    // ── Tables ─────────────────────────────────────────────────────

    /// Store a table config with an empty placement entry. Fails with
    /// `AlreadyExists` if the resource is already present.
    fn create_table(&self, config: &TableConfig) -> StateResult<Version>;

    fn get_table(&self, resource: &str) -> StateResult<Option<TableConfig>>;

    fn list_tables(&self) -> StateResult<Vec<TableConfig>>;

    /// Remove a table config, its placement entry and all of its segment
    /// metadata, provided the placement entry is still at `expected`. Advances
    /// the version of the table's server pool.
    fn delete_table_if_version(&self, resource: &str, expected: Version) -> StateResult<()>;

    // ── Placements ─────────────────────────────────────────────────

    /// Read one resource's placement map and version. `None` if the resource
    /// does not exist.
    fn read_placement(&self, resource: &str) -> StateResult<Option<Versioned<PlacementMap>>>;

    /// Read every resource's placement map, keyed by resource name.
    fn read_all_placements(&self) -> StateResult<BTreeMap<String, Versioned<PlacementMap>>>;

    /// Read, from one snapshot, the placement of every table placed on the
    /// server pool `tag` together with the pool's version.
    fn read_pool_placements(
        &self,
        tag: &str,
    ) -> StateResult<Versioned<BTreeMap<String, Versioned<PlacementMap>>>>;

    /// Replace a resource's placement map and apply segment metadata changes
    /// in one write, provided the entry is still at `expected`. Returns the
    /// new version.
    ///
    /// With `pool` set, the write also requires the resource's server pool to
    /// still be at that version. A decision taken from pool-wide counts is
    /// rejected once any table on the pool has changed. Every placement write
    /// advances the pool version, conditioned or not.
    fn write_placement_if_version(
        &self,
        resource: &str,
        placement: &PlacementMap,
        changes: &[SegmentChange],
        expected: Version,
        pool: Option<Version>,
    ) -> StateResult<Version>;

    fn get_segment(&self, resource: &str, segment: &str) -> StateResult<Option<SegmentMetadata>>;

    fn list_segments(&self, resource: &str) -> StateResult<Vec<SegmentMetadata>>;
}
