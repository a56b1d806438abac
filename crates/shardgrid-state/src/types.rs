//! Domain types for the ShardGrid coordination store.
//!
//! These types represent the persisted cluster state: instances and their
//! tenant tags, tenants, table configs, versioned placement maps, and
//! segment metadata. All types are serializable to/from JSON for storage
//! in redb tables.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for an instance (worker machine) in the cluster.
pub type InstanceId = String;

/// Segment name, unique within a resource.
pub type SegmentName = String;

/// Tag suffix for offline server pools.
pub const OFFLINE_SUFFIX: &str = "OFFLINE";

/// Tag suffix for realtime server pools.
pub const REALTIME_SUFFIX: &str = "REALTIME";

/// Tag suffix for broker pools.
pub const BROKER_SUFFIX: &str = "BROKER";

// ── Versions ──────────────────────────────────────────────────────

/// Opaque version token used for conditional writes.
///
/// Tokens are drawn from one store-wide clock, so a token never repeats
/// even across delete/re-create of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// Version reported for documents that have never been written.
    pub const INITIAL: Version = Version(0);
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value together with the version token it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

// ── Instances ─────────────────────────────────────────────────────

/// Role an instance (and a tenant) plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Server,
    Broker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Broker => "broker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker machine and the tenant tags it currently carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub id: InstanceId,
    pub role: Role,
    pub host: String,
    pub port: u16,
    /// Tenant tags. Empty means the instance is untagged and claimable.
    pub tags: BTreeSet<String>,
}

impl InstanceConfig {
    /// An untagged server instance named `Server_{host}_{port}`.
    pub fn server(host: &str, port: u16) -> Self {
        Self {
            id: format!("Server_{host}_{port}"),
            role: Role::Server,
            host: host.to_string(),
            port,
            tags: BTreeSet::new(),
        }
    }

    /// An untagged broker instance named `Broker_{host}_{port}`.
    pub fn broker(host: &str, port: u16) -> Self {
        Self {
            id: format!("Broker_{host}_{port}"),
            role: Role::Broker,
            host: host.to_string(),
            port,
            tags: BTreeSet::new(),
        }
    }

    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

// ── Tenants ───────────────────────────────────────────────────────

/// A named claim on a subset of instances for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub role: Role,
    pub name: String,
    pub instance_count: u32,
    /// Instances tagged for offline tables (server tenants only).
    pub offline_instances: u32,
    /// Instances tagged for realtime tables (server tenants only).
    pub realtime_instances: u32,
    /// Instances claimed by this tenant, in id order.
    pub instances: Vec<InstanceId>,
    /// Unix timestamp (seconds) when the tenant was created.
    pub created_at: u64,
}

impl TenantRecord {
    /// Build the composite key for the tenants table.
    pub fn table_key(&self) -> String {
        tenant_key(self.role, &self.name)
    }
}

/// Composite key `{role}/{name}` for a tenant.
pub fn tenant_key(role: Role, name: &str) -> String {
    format!("{role}/{name}")
}

/// Tag carried by server instances serving `table_type` tables of `tenant`.
pub fn server_tag(tenant: &str, table_type: TableType) -> String {
    format!("{tenant}_{}", table_type.suffix())
}

/// Tag carried by broker instances of `tenant`.
pub fn broker_tag(tenant: &str) -> String {
    format!("{tenant}_{BROKER_SUFFIX}")
}

// ── Tables ────────────────────────────────────────────────────────

/// Whether a table holds batch-pushed or stream-built segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Offline,
    Realtime,
}

impl TableType {
    pub fn suffix(&self) -> &'static str {
        match self {
            TableType::Offline => OFFLINE_SUFFIX,
            TableType::Realtime => REALTIME_SUFFIX,
        }
    }
}

/// Identifier of the placement strategy a table was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    Random,
    BalanceNumSegment,
    BucketizedSegment,
}

impl AssignmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStrategy::Random => "random",
            AssignmentStrategy::BalanceNumSegment => "balance_num_segment",
            AssignmentStrategy::BucketizedSegment => "bucketized_segment",
        }
    }
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a strategy name matches no known strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown segment assignment strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for AssignmentStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" | "RandomAssignmentStrategy" => Ok(AssignmentStrategy::Random),
            "balance_num_segment" | "BalanceNumSegmentAssignmentStrategy" => {
                Ok(AssignmentStrategy::BalanceNumSegment)
            }
            "bucketized_segment" | "BucketizedSegmentAssignmentStrategy" => {
                Ok(AssignmentStrategy::BucketizedSegment)
            }
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// Persisted configuration of one table resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Logical table name, without the type suffix.
    pub name: String,
    pub table_type: TableType,
    /// Number of replicas every segment is placed on.
    pub replication: u32,
    pub server_tenant: String,
    pub broker_tenant: String,
    pub strategy: AssignmentStrategy,
    /// Unix timestamp (seconds) when the table was created.
    pub created_at: u64,
}

impl TableConfig {
    /// Resource name under which placements are stored.
    pub fn resource_name(&self) -> String {
        resource_name(&self.name, self.table_type)
    }

    /// Tag of the server pool this table's segments are placed on.
    pub fn server_tag(&self) -> String {
        server_tag(&self.server_tenant, self.table_type)
    }
}

/// Resource name `{table}_{TYPE}` for a logical table.
pub fn resource_name(table: &str, table_type: TableType) -> String {
    format!("{table}_{}", table_type.suffix())
}

// ── Placement ─────────────────────────────────────────────────────

/// State of one replica in the placement map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentState {
    Online,
}

/// Segment → instance → state mapping for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementMap {
    pub segments: BTreeMap<SegmentName, BTreeMap<InstanceId, SegmentState>>,
}

impl PlacementMap {
    pub fn contains(&self, segment: &str) -> bool {
        self.segments.contains_key(segment)
    }

    /// Instances hosting `segment`, in id order.
    pub fn replicas(&self, segment: &str) -> Option<Vec<InstanceId>> {
        self.segments
            .get(segment)
            .map(|replicas| replicas.keys().cloned().collect())
    }

    /// Record a full replica set for `segment`, replacing any previous one.
    pub fn insert(&mut self, segment: &str, replicas: &[InstanceId]) {
        let states = replicas
            .iter()
            .map(|id| (id.clone(), SegmentState::Online))
            .collect();
        self.segments.insert(segment.to_string(), states);
    }

    /// Remove `segment`. Returns true if it was present.
    pub fn remove(&mut self, segment: &str) -> bool {
        self.segments.remove(segment).is_some()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate every (segment, instance) replica pair.
    pub fn replica_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.segments.iter().flat_map(|(segment, replicas)| {
            replicas
                .keys()
                .map(move |instance| (segment.as_str(), instance.as_str()))
        })
    }
}

// ── Segments ──────────────────────────────────────────────────────

/// Metadata recorded for an uploaded segment. The download location is
/// opaque to placement and only passed through to the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub resource: String,
    pub name: SegmentName,
    pub download_url: String,
    /// Unix timestamp (seconds) of the first upload.
    pub pushed_at: u64,
    /// Unix timestamp (seconds) of the latest refresh, if any.
    pub refreshed_at: Option<u64>,
}

impl SegmentMetadata {
    /// Build the composite key for the segments table.
    pub fn table_key(&self) -> String {
        segment_key(&self.resource, &self.name)
    }
}

/// Composite key `{resource}/{segment}` for segment metadata.
pub fn segment_key(resource: &str, segment: &str) -> String {
    format!("{resource}/{segment}")
}

/// Segment metadata side effect committed together with a placement write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentChange {
    Put(SegmentMetadata),
    Remove(SegmentName),
}
