//! redb table definitions for the ShardGrid coordination store.
//!
//! Document tables use `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow `{role}/{name}` or `{resource}/{segment}`.

use redb::TableDefinition;

/// Instance configs (id, role, tags) keyed by `{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Tenant records keyed by `{role}/{name}`.
pub const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");

/// Table configs keyed by resource name (`{table}_OFFLINE`, `{table}_REALTIME`).
pub const TABLE_CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("table_configs");

/// Versioned placement maps keyed by resource name.
pub const PLACEMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("placements");

/// Segment metadata keyed by `{resource}/{segment}`.
pub const SEGMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("segments");

/// Counters: the store-wide version clock, the instance document version and
/// one version per server pool.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key of the monotonically increasing version clock in [`META`].
pub const CLOCK_KEY: &str = "clock";

/// Key of the instance/tag document version in [`META`].
pub const INSTANCES_VERSION_KEY: &str = "instances_version";

/// Key of a server pool's version in [`META`]. Every placement write for a
/// table placed on the pool advances it.
pub fn pool_version_key(tag: &str) -> String {
    format!("pool/{tag}")
}
