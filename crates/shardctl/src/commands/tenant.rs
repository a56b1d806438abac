use shardgrid_controller::{ResourceManager, ServerTenantRequest};

/// Offline and realtime counts default to the full claim (co-located).
pub async fn create_server(
    manager: &ResourceManager,
    name: &str,
    instances: u32,
    offline: Option<u32>,
    realtime: Option<u32>,
) -> anyhow::Result<serde_json::Value> {
    let request = ServerTenantRequest::new(name, instances)
        .with_split(offline.unwrap_or(instances), realtime.unwrap_or(instances));
    let tenant = manager.create_server_tenant(request).await?;
    Ok(serde_json::to_value(tenant)?)
}

pub async fn create_broker(
    manager: &ResourceManager,
    name: &str,
    instances: u32,
) -> anyhow::Result<serde_json::Value> {
    let tenant = manager.create_broker_tenant(name, instances).await?;
    Ok(serde_json::to_value(tenant)?)
}

pub fn list(manager: &ResourceManager) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(manager.list_tenants()?)?)
}
