//! Tenant and resource manager, the public surface of the controller.
//!
//! Validates requests, turns tenant requests into atomic tag claims, and
//! routes segment operations to the [`AssignmentCoordinator`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use shardgrid_placement::{PlacementCounts, Placer};
use shardgrid_state::{
    AssignmentStrategy, CoordinationStore, InstanceConfig, InstanceId, PlacementMap, Role,
    SegmentMetadata, StateError, TableConfig, TableType, TenantRecord, Version, Versioned,
    broker_tag, resource_name, server_tag,
};

use crate::config::ControllerConfig;
use crate::coordinator::{Assignment, AssignmentCoordinator, DeleteOutcome, epoch_secs};
use crate::error::{ControllerError, ControllerResult};
use crate::instance_pool::InstancePool;

/// Request to create a server tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTenantRequest {
    pub name: String,
    pub instance_count: u32,
    /// Claimed instances tagged for offline tables.
    pub offline_instances: u32,
    /// Claimed instances tagged for realtime tables.
    pub realtime_instances: u32,
}

impl ServerTenantRequest {
    /// A co-located tenant: every claimed instance serves both table types.
    pub fn new(name: &str, instance_count: u32) -> Self {
        Self {
            name: name.to_string(),
            instance_count,
            offline_instances: instance_count,
            realtime_instances: instance_count,
        }
    }

    pub fn with_split(mut self, offline_instances: u32, realtime_instances: u32) -> Self {
        self.offline_instances = offline_instances;
        self.realtime_instances = realtime_instances;
        self
    }

    fn validate(&self) -> ControllerResult<()> {
        validate_name("tenant", &self.name)?;
        let (count, offline, realtime) = (
            self.instance_count,
            self.offline_instances,
            self.realtime_instances,
        );
        if count == 0 {
            return Err(ControllerError::InvalidRequest(
                "instance count must be at least 1".to_string(),
            ));
        }
        if offline > count || realtime > count {
            return Err(ControllerError::InvalidRequest(format!(
                "offline ({offline}) and realtime ({realtime}) instances may not exceed the instance count ({count})"
            )));
        }
        if offline + realtime < count {
            return Err(ControllerError::InvalidRequest(format!(
                "offline ({offline}) + realtime ({realtime}) instances leave part of the {count} claimed instances untagged"
            )));
        }
        Ok(())
    }
}

/// Request to create one table resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRequest {
    pub name: String,
    pub table_type: TableType,
    pub replication: u32,
    pub server_tenant: String,
    pub broker_tenant: String,
    /// Falls back to the configured default strategy.
    pub strategy: Option<AssignmentStrategy>,
}

impl TableRequest {
    /// An offline table request using the default strategy.
    pub fn new(name: &str, replication: u32, server_tenant: &str, broker_tenant: &str) -> Self {
        Self {
            name: name.to_string(),
            table_type: TableType::Offline,
            replication,
            server_tenant: server_tenant.to_string(),
            broker_tenant: broker_tenant.to_string(),
            strategy: None,
        }
    }

    pub fn with_type(mut self, table_type: TableType) -> Self {
        self.table_type = table_type;
        self
    }

    pub fn with_strategy(mut self, strategy: AssignmentStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn resource_name(&self) -> String {
        resource_name(&self.name, self.table_type)
    }
}

/// One table in a [`ClusterStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub resource: String,
    pub config: TableConfig,
    pub segments: usize,
    pub version: Version,
}

/// Snapshot of tenants, tables and per-pool placement counts.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub instances: Vec<InstanceConfig>,
    pub tenants: Vec<TenantRecord>,
    pub tables: Vec<TableStatus>,
    /// Placement counts keyed by server tag.
    pub pools: BTreeMap<String, PlacementCounts>,
}

/// Creates tenants and tables and accepts segment uploads.
#[derive(Clone)]
pub struct ResourceManager {
    store: Arc<dyn CoordinationStore>,
    pool: InstancePool,
    coordinator: AssignmentCoordinator,
    default_strategy: AssignmentStrategy,
}

impl ResourceManager {
    pub fn new(store: Arc<dyn CoordinationStore>, config: &ControllerConfig) -> Self {
        Self {
            pool: InstancePool::new(store.clone(), config.retry.clone()),
            coordinator: AssignmentCoordinator::new(store.clone(), config.retry.clone()),
            store,
            default_strategy: config.default_strategy,
        }
    }

    pub fn instance_pool(&self) -> &InstancePool {
        &self.pool
    }

    pub fn coordinator(&self) -> &AssignmentCoordinator {
        &self.coordinator
    }

    // ── Instances and tenants ──────────────────────────────────────

    pub fn register_instance(&self, instance: &InstanceConfig) -> ControllerResult<bool> {
        self.pool.register(instance)
    }

    /// Claim untagged server instances for a new tenant.
    ///
    /// All claimed instances are tagged in one conditional write together
    /// with the tenant record. With too few untagged servers nothing is
    /// tagged.
    pub async fn create_server_tenant(
        &self,
        request: ServerTenantRequest,
    ) -> ControllerResult<TenantRecord> {
        request.validate()?;
        self.ensure_new_tenant(Role::Server, &request.name)?;

        let offline_tag = server_tag(&request.name, TableType::Offline);
        let realtime_tag = server_tag(&request.name, TableType::Realtime);
        let record = self
            .pool
            .claim(Role::Server, request.instance_count, |claimed| {
                let count = claimed.len();
                let offline = request.offline_instances as usize;
                let realtime = request.realtime_instances as usize;
                let mut tags = Vec::with_capacity(offline + realtime);
                for id in &claimed[..offline] {
                    tags.push((id.clone(), offline_tag.clone()));
                }
                for id in &claimed[count - realtime..] {
                    tags.push((id.clone(), realtime_tag.clone()));
                }
                let record = TenantRecord {
                    role: Role::Server,
                    name: request.name.clone(),
                    instance_count: request.instance_count,
                    offline_instances: request.offline_instances,
                    realtime_instances: request.realtime_instances,
                    instances: claimed.to_vec(),
                    created_at: epoch_secs(),
                };
                (tags, record)
            })
            .await?;

        info!(
            tenant = %record.name,
            instances = record.instance_count,
            offline = record.offline_instances,
            realtime = record.realtime_instances,
            "server tenant created"
        );
        Ok(record)
    }

    /// Claim `instance_count` untagged broker instances for a new tenant.
    pub async fn create_broker_tenant(
        &self,
        name: &str,
        instance_count: u32,
    ) -> ControllerResult<TenantRecord> {
        validate_name("tenant", name)?;
        if instance_count == 0 {
            return Err(ControllerError::InvalidRequest(
                "instance count must be at least 1".to_string(),
            ));
        }
        self.ensure_new_tenant(Role::Broker, name)?;

        let tag = broker_tag(name);
        let record = self
            .pool
            .claim(Role::Broker, instance_count, |claimed| {
                let tags = claimed.iter().map(|id| (id.clone(), tag.clone())).collect();
                let record = TenantRecord {
                    role: Role::Broker,
                    name: name.to_string(),
                    instance_count,
                    offline_instances: 0,
                    realtime_instances: 0,
                    instances: claimed.to_vec(),
                    created_at: epoch_secs(),
                };
                (tags, record)
            })
            .await?;

        info!(tenant = %record.name, instances = record.instance_count, "broker tenant created");
        Ok(record)
    }

    pub fn list_tenants(&self) -> ControllerResult<Vec<TenantRecord>> {
        Ok(self.store.list_tenants()?)
    }

    fn ensure_new_tenant(&self, role: Role, name: &str) -> ControllerResult<()> {
        if self.store.get_tenant(role, name)?.is_some() {
            return Err(ControllerError::TenantAlreadyExists {
                role,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn require_tenant(&self, role: Role, name: &str) -> ControllerResult<TenantRecord> {
        self.store
            .get_tenant(role, name)?
            .ok_or_else(|| ControllerError::UnknownTenant {
                role,
                name: name.to_string(),
            })
    }

    // ── Tables ─────────────────────────────────────────────────────

    /// Register a table with an empty placement.
    ///
    /// Both tenants must exist, the strategy must be implemented, and the
    /// server pool must hold at least `replication` instances.
    pub fn create_table(&self, request: TableRequest) -> ControllerResult<TableConfig> {
        validate_name("table", &request.name)?;
        if request.replication == 0 {
            return Err(ControllerError::InvalidRequest(
                "replication must be at least 1".to_string(),
            ));
        }
        self.require_tenant(Role::Server, &request.server_tenant)?;
        self.require_tenant(Role::Broker, &request.broker_tenant)?;

        let strategy = request.strategy.unwrap_or(self.default_strategy);
        Placer::for_strategy(strategy)?;

        let tag = server_tag(&request.server_tenant, request.table_type);
        let capacity = self.pool.tagged_instances(&tag)?.len();
        if request.replication as usize > capacity {
            return Err(ControllerError::ReplicationExceedsCapacity {
                replication: request.replication,
                capacity,
                tag,
            });
        }

        let config = TableConfig {
            name: request.name.clone(),
            table_type: request.table_type,
            replication: request.replication,
            server_tenant: request.server_tenant.clone(),
            broker_tenant: request.broker_tenant.clone(),
            strategy,
            created_at: epoch_secs(),
        };
        let resource = config.resource_name();
        match self.store.create_table(&config) {
            Ok(version) => {
                info!(
                    %resource,
                    replication = config.replication,
                    %strategy,
                    pool = %tag,
                    %version,
                    "table created"
                );
                Ok(config)
            }
            Err(StateError::AlreadyExists(_)) => Err(ControllerError::TableAlreadyExists(resource)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a table and everything placed for it.
    pub async fn delete_table(&self, resource: &str) -> ControllerResult<DeleteOutcome> {
        self.coordinator.delete_table(resource).await
    }

    pub fn get_table(&self, resource: &str) -> ControllerResult<Option<TableConfig>> {
        Ok(self.store.get_table(resource)?)
    }

    pub fn list_tables(&self) -> ControllerResult<Vec<TableConfig>> {
        Ok(self.store.list_tables()?)
    }

    // ── Segments ───────────────────────────────────────────────────

    /// Accept an uploaded segment: place it, or refresh it if it exists.
    pub async fn add_segment(
        &self,
        resource: &str,
        segment: &str,
        download_url: &str,
    ) -> ControllerResult<Assignment> {
        if segment.is_empty() {
            return Err(ControllerError::InvalidRequest(
                "segment name must not be empty".to_string(),
            ));
        }
        self.coordinator
            .assign_segment(resource, segment, download_url)
            .await
    }

    pub async fn delete_segment(
        &self,
        resource: &str,
        segment: &str,
    ) -> ControllerResult<DeleteOutcome> {
        self.coordinator.delete_segment(resource, segment).await
    }

    pub fn segment_metadata(
        &self,
        resource: &str,
        segment: &str,
    ) -> ControllerResult<Option<SegmentMetadata>> {
        Ok(self.store.get_segment(resource, segment)?)
    }

    pub fn list_segments(&self, resource: &str) -> ControllerResult<Vec<SegmentMetadata>> {
        Ok(self.store.list_segments(resource)?)
    }

    pub fn placement(&self, resource: &str) -> ControllerResult<Versioned<PlacementMap>> {
        self.coordinator.placement(resource)
    }

    /// Replica set of one segment, in id order.
    pub fn replicas(&self, resource: &str, segment: &str) -> ControllerResult<Option<Vec<InstanceId>>> {
        Ok(self.placement(resource)?.value.replicas(segment))
    }

    pub fn placement_counts(&self, tag: &str) -> ControllerResult<PlacementCounts> {
        self.coordinator.placement_counts(tag)
    }

    // ── Diagnostics ────────────────────────────────────────────────

    pub fn status(&self) -> ControllerResult<ClusterStatus> {
        let instances = self.pool.instances()?;
        let tenants = self.store.list_tenants()?;
        let placements = self.store.read_all_placements()?;

        let mut tables = Vec::new();
        let mut pools = BTreeMap::new();
        for config in self.store.list_tables()? {
            let resource = config.resource_name();
            let (segments, version) = placements
                .get(&resource)
                .map(|p| (p.value.len(), p.version))
                .unwrap_or((0, Version::INITIAL));
            let tag = config.server_tag();
            if !pools.contains_key(&tag) {
                let counts = self.coordinator.placement_counts(&tag)?;
                pools.insert(tag, counts);
            }
            tables.push(TableStatus {
                resource,
                config,
                segments,
                version,
            });
        }

        Ok(ClusterStatus {
            instances,
            tenants,
            tables,
            pools,
        })
    }
}

/// Names end up inside tags and store keys; `/` separates key parts.
fn validate_name(kind: &str, name: &str) -> ControllerResult<()> {
    if name.is_empty() {
        return Err(ControllerError::InvalidRequest(format!("{kind} name must not be empty")));
    }
    if name.contains('/') {
        return Err(ControllerError::InvalidRequest(format!(
            "{kind} name may not contain '/': {name}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use shardgrid_state::StateStore;

    fn manager(servers: u16, brokers: u16) -> ResourceManager {
        let store = StateStore::open_in_memory().unwrap();
        let config = ControllerConfig {
            retry: RetryPolicy::immediate(5),
            ..ControllerConfig::default()
        };
        let manager = ResourceManager::new(Arc::new(store), &config);
        for port in 0..servers {
            manager
                .register_instance(&InstanceConfig::server("srv", 8000 + port))
                .unwrap();
        }
        for port in 0..brokers {
            manager
                .register_instance(&InstanceConfig::broker("brk", 9000 + port))
                .unwrap();
        }
        manager
    }

    async fn with_tenants(servers: u16, tenant_size: u32) -> ResourceManager {
        let manager = manager(servers, 1);
        manager
            .create_server_tenant(ServerTenantRequest::new("acme", tenant_size))
            .await
            .unwrap();
        manager.create_broker_tenant("acme", 1).await.unwrap();
        manager
    }

    #[tokio::test]
    async fn colocated_tenant_carries_both_tags() {
        let manager = manager(3, 0);
        let tenant = manager
            .create_server_tenant(ServerTenantRequest::new("acme", 3))
            .await
            .unwrap();

        assert_eq!(tenant.instances.len(), 3);
        let pool = manager.instance_pool();
        assert_eq!(pool.tagged_instances("acme_OFFLINE").unwrap().len(), 3);
        assert_eq!(pool.tagged_instances("acme_REALTIME").unwrap().len(), 3);
        assert_eq!(manager.list_tenants().unwrap(), vec![tenant]);
    }

    #[tokio::test]
    async fn split_tenant_tags_disjoint_groups() {
        let manager = manager(6, 0);
        manager
            .create_server_tenant(ServerTenantRequest::new("acme", 6).with_split(3, 3))
            .await
            .unwrap();

        let pool = manager.instance_pool();
        let offline: Vec<InstanceId> = pool.tagged_instances("acme_OFFLINE").unwrap().into_iter().collect();
        let realtime: Vec<InstanceId> = pool.tagged_instances("acme_REALTIME").unwrap().into_iter().collect();
        assert_eq!(offline, vec!["Server_srv_8000", "Server_srv_8001", "Server_srv_8002"]);
        assert_eq!(realtime, vec!["Server_srv_8003", "Server_srv_8004", "Server_srv_8005"]);
    }

    #[tokio::test]
    async fn invalid_split_is_rejected_before_tagging() {
        let manager = manager(4, 0);
        for request in [
            ServerTenantRequest::new("acme", 0),
            ServerTenantRequest::new("acme", 4).with_split(5, 1),
            ServerTenantRequest::new("acme", 4).with_split(1, 1),
            ServerTenantRequest::new("", 2),
        ] {
            let err = manager.create_server_tenant(request).await.unwrap_err();
            assert!(matches!(err, ControllerError::InvalidRequest(_)), "{err:?}");
        }
        assert_eq!(manager.instance_pool().untagged_instances().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn short_tenant_claim_leaves_everything_untagged() {
        let manager = manager(5, 0);
        let err = manager
            .create_server_tenant(ServerTenantRequest::new("acme", 6))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InsufficientUntaggedInstances {
                requested: 6,
                available: 5,
                ..
            }
        ));
        assert_eq!(manager.instance_pool().untagged_instances().unwrap().len(), 5);
        assert!(manager.list_tenants().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_tenant_is_rejected() {
        let manager = manager(4, 0);
        manager
            .create_server_tenant(ServerTenantRequest::new("acme", 2))
            .await
            .unwrap();
        let err = manager
            .create_server_tenant(ServerTenantRequest::new("acme", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::TenantAlreadyExists { .. }));
        assert_eq!(manager.instance_pool().untagged_instances().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn broker_tenant_only_claims_brokers() {
        let manager = manager(3, 2);
        let tenant = manager.create_broker_tenant("acme", 2).await.unwrap();
        assert!(tenant.instances.iter().all(|id| id.starts_with("Broker_")));
        assert_eq!(manager.instance_pool().tagged_instances("acme_BROKER").unwrap().len(), 2);

        let err = manager.create_broker_tenant("other", 1).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InsufficientUntaggedInstances {
                role: Role::Broker,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn table_creation_checks_capacity() {
        let manager = with_tenants(6, 6).await;
        let config = manager
            .create_table(TableRequest::new("events", 3, "acme", "acme"))
            .unwrap();
        assert_eq!(config.resource_name(), "events_OFFLINE");
        assert_eq!(config.strategy, AssignmentStrategy::BalanceNumSegment);
        assert!(manager.placement("events_OFFLINE").unwrap().value.is_empty());

        let err = manager
            .create_table(TableRequest::new("clicks", 7, "acme", "acme"))
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::ReplicationExceedsCapacity {
                replication: 7,
                capacity: 6,
                ..
            }
        ));
        assert!(manager.get_table("clicks_OFFLINE").unwrap().is_none());
    }

    #[tokio::test]
    async fn table_creation_requires_tenants() {
        let manager = with_tenants(2, 2).await;
        let err = manager
            .create_table(TableRequest::new("events", 1, "nobody", "acme"))
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::UnknownTenant {
                role: Role::Server,
                ..
            }
        ));
        let err = manager
            .create_table(TableRequest::new("events", 1, "acme", "nobody"))
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::UnknownTenant {
                role: Role::Broker,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn table_creation_rejects_bucketized_and_duplicates() {
        let manager = with_tenants(3, 3).await;
        let err = manager
            .create_table(
                TableRequest::new("events", 1, "acme", "acme")
                    .with_strategy(AssignmentStrategy::BucketizedSegment),
            )
            .unwrap_err();
        assert!(matches!(err, ControllerError::NotImplemented(_)));

        manager
            .create_table(TableRequest::new("events", 1, "acme", "acme"))
            .unwrap();
        let err = manager
            .create_table(TableRequest::new("events", 1, "acme", "acme"))
            .unwrap_err();
        assert!(matches!(err, ControllerError::TableAlreadyExists(name) if name == "events_OFFLINE"));

        // The realtime resource of the same table is independent.
        manager
            .create_table(TableRequest::new("events", 1, "acme", "acme").with_type(TableType::Realtime))
            .unwrap();
        assert_eq!(manager.list_tables().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn add_segment_records_metadata() {
        let manager = with_tenants(4, 4).await;
        manager
            .create_table(TableRequest::new("events", 2, "acme", "acme"))
            .unwrap();

        let assignment = manager
            .add_segment("events_OFFLINE", "events_0", "s3://bucket/events_0")
            .await
            .unwrap();
        assert_eq!(assignment.replicas.len(), 2);

        let metadata = manager
            .segment_metadata("events_OFFLINE", "events_0")
            .unwrap()
            .unwrap();
        assert_eq!(metadata.download_url, "s3://bucket/events_0");
        assert_eq!(metadata.refreshed_at, None);
        assert_eq!(manager.list_segments("events_OFFLINE").unwrap().len(), 1);

        let mut replicas = assignment.replicas.clone();
        replicas.sort();
        assert_eq!(
            manager.replicas("events_OFFLINE", "events_0").unwrap(),
            Some(replicas)
        );
    }

    #[tokio::test]
    async fn empty_segment_name_is_rejected() {
        let manager = with_tenants(2, 2).await;
        manager
            .create_table(TableRequest::new("events", 1, "acme", "acme"))
            .unwrap();
        let err = manager.add_segment("events_OFFLINE", "", "url").await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn status_reports_pools_and_tables() {
        let manager = with_tenants(3, 3).await;
        manager
            .create_table(TableRequest::new("events", 2, "acme", "acme"))
            .unwrap();
        manager.add_segment("events_OFFLINE", "s0", "url").await.unwrap();

        let status = manager.status().unwrap();
        assert_eq!(status.instances.len(), 4);
        assert_eq!(status.tenants.len(), 2);
        assert_eq!(status.tables.len(), 1);
        assert_eq!(status.tables[0].segments, 1);
        assert_eq!(status.pools["acme_OFFLINE"].total(), 2);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["tables"][0]["resource"], "events_OFFLINE");
    }
}
