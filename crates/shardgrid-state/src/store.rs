//! StateStore — redb-backed coordination store for ShardGrid.
//!
//! Implements [`CoordinationStore`] on top of redb. All documents are
//! JSON-serialized into `&[u8]` value columns. Conditional writes compare
//! the caller's version token inside a redb write transaction; since redb
//! serializes write transactions, compare and write are atomic. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::coordination::CoordinationStore;
use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A JSON document table.
type DocumentTable = TableDefinition<'static, &'static str, &'static [u8]>;

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Thread-safe coordination store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(TENANTS).map_err(map_err!(Table))?;
        txn.open_table(TABLE_CONFIGS).map_err(map_err!(Table))?;
        txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
        txn.open_table(SEGMENTS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read every value of a document table.
    fn list_all<T: DeserializeOwned>(
        &self,
        definition: DocumentTable,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(definition).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Read one value of a document table.
    fn get_one<T: DeserializeOwned>(
        &self,
        definition: DocumentTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(definition).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }
}

// ── Write-transaction helpers ──────────────────────────────────────

fn read_meta(txn: &WriteTransaction, key: &str) -> StateResult<u64> {
    let table = txn.open_table(META).map_err(map_err!(Table))?;
    let value = table.get(key).map_err(map_err!(Read))?.map(|g| g.value());
    Ok(value.unwrap_or(0))
}

fn write_meta(txn: &WriteTransaction, key: &str, value: u64) -> StateResult<()> {
    let mut table = txn.open_table(META).map_err(map_err!(Table))?;
    table.insert(key, value).map_err(map_err!(Write))?;
    Ok(())
}

/// Advance the store-wide clock and return the new version token.
fn next_version(txn: &WriteTransaction) -> StateResult<Version> {
    let next = read_meta(txn, CLOCK_KEY)? + 1;
    write_meta(txn, CLOCK_KEY, next)?;
    Ok(Version(next))
}

/// Fail with `VersionConflict` unless `resource`'s placement is at `expected`.
fn check_placement_version(
    txn: &WriteTransaction,
    resource: &str,
    expected: Version,
) -> StateResult<()> {
    let table = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
    let current: Versioned<PlacementMap> = match table.get(resource).map_err(map_err!(Read))? {
        Some(guard) => decode(guard.value())?,
        None => return Err(StateError::NotFound(format!("resource {resource}"))),
    };
    if current.version != expected {
        return Err(StateError::VersionConflict {
            key: resource.to_string(),
            expected,
            actual: current.version,
        });
    }
    Ok(())
}

/// Server pool tag of a stored table.
fn table_pool_tag(txn: &WriteTransaction, resource: &str) -> StateResult<String> {
    let table = txn.open_table(TABLE_CONFIGS).map_err(map_err!(Table))?;
    let config: TableConfig = match table.get(resource).map_err(map_err!(Read))? {
        Some(guard) => decode(guard.value())?,
        None => return Err(StateError::NotFound(format!("resource {resource}"))),
    };
    Ok(config.server_tag())
}

impl CoordinationStore for StateStore {
    // ── Instances and tags ─────────────────────────────────────────

    fn read_instances(&self) -> StateResult<Versioned<Vec<InstanceConfig>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let mut instances = Vec::new();
        {
            let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                instances.push(decode(value.value())?);
            }
        }
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        let version = meta
            .get(INSTANCES_VERSION_KEY)
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .unwrap_or(0);
        Ok(Versioned {
            value: instances,
            version: Version(version),
        })
    }

    fn register_instance(&self, instance: &InstanceConfig) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            if table
                .get(instance.id.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                debug!(instance = %instance.id, "instance already registered");
                return Ok(false);
            }
            let value = encode(instance)?;
            table
                .insert(instance.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        let version = next_version(&txn)?;
        write_meta(&txn, INSTANCES_VERSION_KEY, version.0)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(instance = %instance.id, role = %instance.role, %version, "instance registered");
        Ok(true)
    }

    fn write_tags_if_version(
        &self,
        tags: &[(InstanceId, String)],
        tenant: Option<&TenantRecord>,
        expected: Version,
    ) -> StateResult<Version> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let actual = Version(read_meta(&txn, INSTANCES_VERSION_KEY)?);
        if actual != expected {
            return Err(StateError::VersionConflict {
                key: "instances".to_string(),
                expected,
                actual,
            });
        }
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            for (id, tag) in tags {
                let mut instance: InstanceConfig =
                    match table.get(id.as_str()).map_err(map_err!(Read))? {
                        Some(guard) => decode(guard.value())?,
                        None => return Err(StateError::NotFound(format!("instance {id}"))),
                    };
                if !instance.tags.insert(tag.clone()) {
                    continue;
                }
                let value = encode(&instance)?;
                table
                    .insert(id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        if let Some(tenant) = tenant {
            let key = tenant.table_key();
            let mut table = txn.open_table(TENANTS).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(format!("tenant {key}")));
            }
            let value = encode(tenant)?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        let version = next_version(&txn)?;
        write_meta(&txn, INSTANCES_VERSION_KEY, version.0)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(tags = tags.len(), %version, "instance tags committed");
        Ok(version)
    }

    fn get_tenant(&self, role: Role, name: &str) -> StateResult<Option<TenantRecord>> {
        self.get_one(TENANTS, &tenant_key(role, name))
    }

    fn list_tenants(&self) -> StateResult<Vec<TenantRecord>> {
        self.list_all(TENANTS)
    }

    // ── Tables ─────────────────────────────────────────────────────

    fn create_table(&self, config: &TableConfig) -> StateResult<Version> {
        let resource = config.resource_name();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TABLE_CONFIGS).map_err(map_err!(Table))?;
            if table
                .get(resource.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Err(StateError::AlreadyExists(format!("resource {resource}")));
            }
            let value = encode(config)?;
            table
                .insert(resource.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        let version = next_version(&txn)?;
        {
            let placement = Versioned {
                value: PlacementMap::default(),
                version,
            };
            let value = encode(&placement)?;
            let mut table = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
            table
                .insert(resource.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%resource, %version, "table stored");
        Ok(version)
    }

    fn get_table(&self, resource: &str) -> StateResult<Option<TableConfig>> {
        self.get_one(TABLE_CONFIGS, resource)
    }

    fn list_tables(&self) -> StateResult<Vec<TableConfig>> {
        self.list_all(TABLE_CONFIGS)
    }

    fn delete_table_if_version(&self, resource: &str, expected: Version) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        check_placement_version(&txn, resource, expected)?;
        let pool_key = pool_version_key(&table_pool_tag(&txn, resource)?);
        {
            let mut table = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
            table.remove(resource).map_err(map_err!(Write))?;
        }
        {
            let mut table = txn.open_table(TABLE_CONFIGS).map_err(map_err!(Table))?;
            table.remove(resource).map_err(map_err!(Write))?;
        }
        let removed = {
            let prefix = format!("{resource}/");
            let mut table = txn.open_table(SEGMENTS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                if key.value().starts_with(&prefix) {
                    keys.push(key.value().to_string());
                }
            }
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            keys.len()
        };
        let version = next_version(&txn)?;
        write_meta(&txn, &pool_key, version.0)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%resource, segments_removed = removed, "table deleted");
        Ok(())
    }

    // ── Placements ─────────────────────────────────────────────────

    fn read_placement(&self, resource: &str) -> StateResult<Option<Versioned<PlacementMap>>> {
        self.get_one(PLACEMENTS, resource)
    }

    fn read_all_placements(&self) -> StateResult<BTreeMap<String, Versioned<PlacementMap>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
        let mut results = BTreeMap::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            results.insert(key.value().to_string(), decode(value.value())?);
        }
        Ok(results)
    }

    fn read_pool_placements(
        &self,
        tag: &str,
    ) -> StateResult<Versioned<BTreeMap<String, Versioned<PlacementMap>>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let configs = txn.open_table(TABLE_CONFIGS).map_err(map_err!(Table))?;
        let placements = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
        let mut results = BTreeMap::new();
        for entry in configs.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let config: TableConfig = decode(value.value())?;
            if config.server_tag() != tag {
                continue;
            }
            if let Some(guard) = placements.get(key.value()).map_err(map_err!(Read))? {
                results.insert(key.value().to_string(), decode(guard.value())?);
            }
        }
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        let version = meta
            .get(pool_version_key(tag).as_str())
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .unwrap_or(0);
        Ok(Versioned {
            value: results,
            version: Version(version),
        })
    }

    fn write_placement_if_version(
        &self,
        resource: &str,
        placement: &PlacementMap,
        changes: &[SegmentChange],
        expected: Version,
        pool: Option<Version>,
    ) -> StateResult<Version> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        check_placement_version(&txn, resource, expected)?;
        let pool_key = pool_version_key(&table_pool_tag(&txn, resource)?);
        if let Some(expected_pool) = pool {
            let actual = Version(read_meta(&txn, &pool_key)?);
            if actual != expected_pool {
                return Err(StateError::VersionConflict {
                    key: pool_key,
                    expected: expected_pool,
                    actual,
                });
            }
        }
        let version = next_version(&txn)?;
        write_meta(&txn, &pool_key, version.0)?;
        {
            let value = encode(&Versioned {
                value: placement,
                version,
            })?;
            let mut table = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
            table
                .insert(resource, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        {
            let mut table = txn.open_table(SEGMENTS).map_err(map_err!(Table))?;
            for change in changes {
                match change {
                    SegmentChange::Put(metadata) => {
                        let key = metadata.table_key();
                        let value = encode(metadata)?;
                        table
                            .insert(key.as_str(), value.as_slice())
                            .map_err(map_err!(Write))?;
                    }
                    SegmentChange::Remove(segment) => {
                        let key = segment_key(resource, segment);
                        table.remove(key.as_str()).map_err(map_err!(Write))?;
                    }
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%resource, %expected, %version, segments = placement.len(), "placement committed");
        Ok(version)
    }

    fn get_segment(&self, resource: &str, segment: &str) -> StateResult<Option<SegmentMetadata>> {
        self.get_one(SEGMENTS, &segment_key(resource, segment))
    }

    fn list_segments(&self, resource: &str) -> StateResult<Vec<SegmentMetadata>> {
        let prefix = format!("{resource}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SEGMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                results.push(decode(value.value())?);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_table(name: &str) -> TableConfig {
        TableConfig {
            name: name.to_string(),
            table_type: TableType::Offline,
            replication: 2,
            server_tenant: "srv".to_string(),
            broker_tenant: "brk".to_string(),
            strategy: AssignmentStrategy::BalanceNumSegment,
            created_at: 1000,
        }
    }

    fn test_segment(resource: &str, name: &str) -> SegmentMetadata {
        SegmentMetadata {
            resource: resource.to_string(),
            name: name.to_string(),
            download_url: format!("http://store/{name}.tar.gz"),
            pushed_at: 1000,
            refreshed_at: None,
        }
    }

    fn test_tenant(name: &str) -> TenantRecord {
        TenantRecord {
            role: Role::Server,
            name: name.to_string(),
            instance_count: 1,
            offline_instances: 1,
            realtime_instances: 1,
            instances: vec!["Server_h1_8000".to_string()],
            created_at: 1000,
        }
    }

    // ── Instances and tags ─────────────────────────────────────────

    #[test]
    fn register_instance_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        let instance = InstanceConfig::server("h1", 8000);

        assert!(store.register_instance(&instance).unwrap());
        assert!(!store.register_instance(&instance).unwrap());

        let read = store.read_instances().unwrap();
        assert_eq!(read.value.len(), 1);
        assert!(read.value[0].is_untagged());
    }

    #[test]
    fn registration_bumps_instance_version() {
        let store = StateStore::open_in_memory().unwrap();
        let before = store.read_instances().unwrap().version;
        store.register_instance(&InstanceConfig::server("h1", 8000)).unwrap();
        let after = store.read_instances().unwrap().version;
        assert!(after > before);
    }

    #[test]
    fn tag_write_with_current_version_commits() {
        let store = StateStore::open_in_memory().unwrap();
        store.register_instance(&InstanceConfig::server("h1", 8000)).unwrap();
        let read = store.read_instances().unwrap();

        let tags = vec![("Server_h1_8000".to_string(), "t_OFFLINE".to_string())];
        let tenant = test_tenant("t");
        let version = store
            .write_tags_if_version(&tags, Some(&tenant), read.version)
            .unwrap();

        let after = store.read_instances().unwrap();
        assert_eq!(after.version, version);
        assert!(after.value[0].has_tag("t_OFFLINE"));
        assert_eq!(store.get_tenant(Role::Server, "t").unwrap(), Some(tenant));
    }

    #[test]
    fn tag_write_with_stale_version_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        store.register_instance(&InstanceConfig::server("h1", 8000)).unwrap();
        let stale = store.read_instances().unwrap().version;
        store.register_instance(&InstanceConfig::server("h2", 8000)).unwrap();

        let tags = vec![("Server_h1_8000".to_string(), "t_OFFLINE".to_string())];
        let err = store.write_tags_if_version(&tags, None, stale).unwrap_err();
        assert!(err.is_conflict());

        let after = store.read_instances().unwrap();
        assert!(after.value.iter().all(|i| i.is_untagged()));
    }

    #[test]
    fn tag_write_for_unknown_instance_mutates_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        store.register_instance(&InstanceConfig::server("h1", 8000)).unwrap();
        let read = store.read_instances().unwrap();

        let tags = vec![
            ("Server_h1_8000".to_string(), "t_OFFLINE".to_string()),
            ("Server_ghost_1".to_string(), "t_OFFLINE".to_string()),
        ];
        let err = store
            .write_tags_if_version(&tags, None, read.version)
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));

        let after = store.read_instances().unwrap();
        assert_eq!(after.version, read.version);
        assert!(after.value[0].is_untagged());
    }

    #[test]
    fn duplicate_tenant_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        store.register_instance(&InstanceConfig::server("h1", 8000)).unwrap();
        let v1 = store.read_instances().unwrap().version;
        let v2 = store
            .write_tags_if_version(&[], Some(&test_tenant("t")), v1)
            .unwrap();

        let err = store
            .write_tags_if_version(&[], Some(&test_tenant("t")), v2)
            .unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
        assert_eq!(store.list_tenants().unwrap().len(), 1);
    }

    // ── Tables and placements ──────────────────────────────────────

    #[test]
    fn create_table_stores_empty_placement() {
        let store = StateStore::open_in_memory().unwrap();
        let version = store.create_table(&test_table("events")).unwrap();

        let placement = store.read_placement("events_OFFLINE").unwrap().unwrap();
        assert!(placement.value.is_empty());
        assert_eq!(placement.version, version);
        assert_eq!(store.list_tables().unwrap().len(), 1);
    }

    #[test]
    fn create_table_twice_fails() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_table(&test_table("events")).unwrap();
        let err = store.create_table(&test_table("events")).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
    }

    #[test]
    fn placement_write_with_current_version_commits() {
        let store = StateStore::open_in_memory().unwrap();
        let v1 = store.create_table(&test_table("events")).unwrap();

        let mut map = PlacementMap::default();
        map.insert("seg-0", &["a".to_string(), "b".to_string()]);
        let changes = vec![SegmentChange::Put(test_segment("events_OFFLINE", "seg-0"))];
        let v2 = store
            .write_placement_if_version("events_OFFLINE", &map, &changes, v1, None)
            .unwrap();

        assert!(v2 > v1);
        let read = store.read_placement("events_OFFLINE").unwrap().unwrap();
        assert_eq!(read.value, map);
        assert_eq!(read.version, v2);
        assert!(store.get_segment("events_OFFLINE", "seg-0").unwrap().is_some());
    }

    #[test]
    fn placement_write_with_stale_version_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let v1 = store.create_table(&test_table("events")).unwrap();

        let mut first = PlacementMap::default();
        first.insert("seg-0", &["a".to_string()]);
        store
            .write_placement_if_version("events_OFFLINE", &first, &[], v1, None)
            .unwrap();

        let mut second = PlacementMap::default();
        second.insert("seg-1", &["b".to_string()]);
        let changes = vec![SegmentChange::Put(test_segment("events_OFFLINE", "seg-1"))];
        let err = store
            .write_placement_if_version("events_OFFLINE", &second, &changes, v1, None)
            .unwrap_err();

        assert!(err.is_conflict());
        let read = store.read_placement("events_OFFLINE").unwrap().unwrap();
        assert_eq!(read.value, first);
        assert!(store.get_segment("events_OFFLINE", "seg-1").unwrap().is_none());
    }

    #[test]
    fn placement_write_for_missing_resource_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .write_placement_if_version("nope_OFFLINE", &PlacementMap::default(), &[], Version(1), None)
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn segment_removal_applies_with_placement() {
        let store = StateStore::open_in_memory().unwrap();
        let v1 = store.create_table(&test_table("events")).unwrap();
        let mut map = PlacementMap::default();
        map.insert("seg-0", &["a".to_string()]);
        let v2 = store
            .write_placement_if_version(
                "events_OFFLINE",
                &map,
                &[SegmentChange::Put(test_segment("events_OFFLINE", "seg-0"))],
                v1,
                None,
            )
            .unwrap();

        map.remove("seg-0");
        store
            .write_placement_if_version(
                "events_OFFLINE",
                &map,
                &[SegmentChange::Remove("seg-0".to_string())],
                v2,
                None,
            )
            .unwrap();

        assert!(store.list_segments("events_OFFLINE").unwrap().is_empty());
    }

    #[test]
    fn delete_table_cascades_to_segments() {
        let store = StateStore::open_in_memory().unwrap();
        let v1 = store.create_table(&test_table("events")).unwrap();
        store.create_table(&test_table("clicks")).unwrap();
        let mut map = PlacementMap::default();
        map.insert("seg-0", &["a".to_string()]);
        let v2 = store
            .write_placement_if_version(
                "events_OFFLINE",
                &map,
                &[SegmentChange::Put(test_segment("events_OFFLINE", "seg-0"))],
                v1,
                None,
            )
            .unwrap();

        assert!(store.delete_table_if_version("events_OFFLINE", v1).unwrap_err().is_conflict());
        store.delete_table_if_version("events_OFFLINE", v2).unwrap();

        assert!(store.get_table("events_OFFLINE").unwrap().is_none());
        assert!(store.read_placement("events_OFFLINE").unwrap().is_none());
        assert!(store.list_segments("events_OFFLINE").unwrap().is_empty());
        assert!(store.get_table("clicks_OFFLINE").unwrap().is_some());
    }

    #[test]
    fn delete_table_removes_every_segment_of_its_resource() {
        let store = StateStore::open_in_memory().unwrap();
        let mut version = store.create_table(&test_table("events")).unwrap();
        let other = store.create_table(&test_table("events2")).unwrap();

        let mut map = PlacementMap::default();
        for i in 0..5 {
            let name = format!("seg-{i}");
            map.insert(&name, &["a".to_string()]);
            version = store
                .write_placement_if_version(
                    "events_OFFLINE",
                    &map,
                    &[SegmentChange::Put(test_segment("events_OFFLINE", &name))],
                    version,
                    None,
                )
                .unwrap();
        }
        let mut sibling = PlacementMap::default();
        sibling.insert("seg-0", &["a".to_string()]);
        store
            .write_placement_if_version(
                "events2_OFFLINE",
                &sibling,
                &[SegmentChange::Put(test_segment("events2_OFFLINE", "seg-0"))],
                other,
                None,
            )
            .unwrap();

        store.delete_table_if_version("events_OFFLINE", version).unwrap();

        assert!(store.list_segments("events_OFFLINE").unwrap().is_empty());
        for i in 0..5 {
            assert!(store.get_segment("events_OFFLINE", &format!("seg-{i}")).unwrap().is_none());
        }
        assert_eq!(store.list_segments("events2_OFFLINE").unwrap().len(), 1);
    }

    #[test]
    fn pool_snapshot_covers_tables_sharing_a_tag() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_table(&test_table("events")).unwrap();
        store.create_table(&test_table("clicks")).unwrap();
        let mut elsewhere = test_table("logs");
        elsewhere.server_tenant = "other".to_string();
        store.create_table(&elsewhere).unwrap();

        let snapshot = store.read_pool_placements("srv_OFFLINE").unwrap();
        let resources: Vec<&str> = snapshot.value.keys().map(String::as_str).collect();
        assert_eq!(resources, vec!["clicks_OFFLINE", "events_OFFLINE"]);
        assert_eq!(snapshot.version, Version::INITIAL);
    }

    #[test]
    fn write_on_one_table_invalidates_pool_snapshot() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_table(&test_table("events")).unwrap();
        store.create_table(&test_table("clicks")).unwrap();
        let snapshot = store.read_pool_placements("srv_OFFLINE").unwrap();
        let events = snapshot.value["events_OFFLINE"].version;
        let clicks = snapshot.value["clicks_OFFLINE"].version;

        let mut map = PlacementMap::default();
        map.insert("seg-0", &["a".to_string()]);
        store
            .write_placement_if_version("clicks_OFFLINE", &map, &[], clicks, Some(snapshot.version))
            .unwrap();

        // events itself is unchanged, but the pool it shares with clicks is not.
        let err = store
            .write_placement_if_version("events_OFFLINE", &map, &[], events, Some(snapshot.version))
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(store.read_placement("events_OFFLINE").unwrap().unwrap().value.is_empty());

        let fresh = store.read_pool_placements("srv_OFFLINE").unwrap();
        assert!(fresh.version > snapshot.version);
        store
            .write_placement_if_version("events_OFFLINE", &map, &[], events, Some(fresh.version))
            .unwrap();
    }

    #[test]
    fn pools_on_other_tags_are_independent() {
        let store = StateStore::open_in_memory().unwrap();
        let events = store.create_table(&test_table("events")).unwrap();
        let mut elsewhere = test_table("logs");
        elsewhere.server_tenant = "other".to_string();
        let logs = store.create_table(&elsewhere).unwrap();
        let snapshot = store.read_pool_placements("srv_OFFLINE").unwrap();

        store
            .write_placement_if_version("logs_OFFLINE", &PlacementMap::default(), &[], logs, None)
            .unwrap();
        store
            .write_placement_if_version(
                "events_OFFLINE",
                &PlacementMap::default(),
                &[],
                events,
                Some(snapshot.version),
            )
            .unwrap();
    }

    #[test]
    fn delete_table_advances_pool_version() {
        let store = StateStore::open_in_memory().unwrap();
        let events = store.create_table(&test_table("events")).unwrap();
        store.create_table(&test_table("clicks")).unwrap();
        let before = store.read_pool_placements("srv_OFFLINE").unwrap();

        store.delete_table_if_version("events_OFFLINE", events).unwrap();

        let after = store.read_pool_placements("srv_OFFLINE").unwrap();
        assert!(after.version > before.version);
        assert_eq!(after.value.len(), 1);
    }

    #[test]
    fn recreated_table_never_reuses_a_version() {
        let store = StateStore::open_in_memory().unwrap();
        let v1 = store.create_table(&test_table("events")).unwrap();
        store.delete_table_if_version("events_OFFLINE", v1).unwrap();
        let v2 = store.create_table(&test_table("events")).unwrap();
        assert!(v2 > v1);
    }

    #[test]
    fn read_all_placements_lists_every_resource() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_table(&test_table("events")).unwrap();
        store.create_table(&test_table("clicks")).unwrap();

        let all = store.read_all_placements().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("events_OFFLINE"));
        assert!(all.contains_key("clicks_OFFLINE"));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        let version = {
            let store = StateStore::open(&db_path).unwrap();
            store.register_instance(&InstanceConfig::server("h1", 8000)).unwrap();
            store.create_table(&test_table("events")).unwrap()
        };

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.read_instances().unwrap().value.len(), 1);
        let placement = store.read_placement("events_OFFLINE").unwrap().unwrap();
        assert_eq!(placement.version, version);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        let instances = store.read_instances().unwrap();
        assert!(instances.value.is_empty());
        assert_eq!(instances.version, Version::INITIAL);
        assert!(store.list_tenants().unwrap().is_empty());
        assert!(store.list_tables().unwrap().is_empty());
        assert!(store.read_all_placements().unwrap().is_empty());
        assert!(store.read_placement("any").unwrap().is_none());
        assert!(store.list_segments("any").unwrap().is_empty());
    }
}
