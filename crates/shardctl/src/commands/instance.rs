use serde_json::json;

use shardgrid_controller::ResourceManager;
use shardgrid_state::{InstanceConfig, Role};

pub fn add(manager: &ResourceManager, role: Role, host: &str, port: u16) -> anyhow::Result<serde_json::Value> {
    let instance = match role {
        Role::Server => InstanceConfig::server(host, port),
        Role::Broker => InstanceConfig::broker(host, port),
    };
    let added = manager.register_instance(&instance)?;
    Ok(json!({ "instance": instance.id, "added": added }))
}

pub fn list(manager: &ResourceManager) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(manager.instance_pool().instances()?)?)
}
