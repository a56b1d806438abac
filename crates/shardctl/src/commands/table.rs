use serde_json::json;

use shardgrid_controller::{ResourceManager, TableRequest};
use shardgrid_state::{AssignmentStrategy, TableType};

pub struct CreateArgs {
    pub name: String,
    pub replication: u32,
    pub server_tenant: String,
    pub broker_tenant: String,
    /// One resource is created per type; two for a hybrid table.
    pub table_types: Vec<TableType>,
    pub strategy: Option<String>,
}

pub fn create(manager: &ResourceManager, args: CreateArgs) -> anyhow::Result<serde_json::Value> {
    let strategy = args
        .strategy
        .as_deref()
        .map(str::parse::<AssignmentStrategy>)
        .transpose()?;

    let mut created = Vec::with_capacity(args.table_types.len());
    for table_type in &args.table_types {
        let mut request = TableRequest::new(
            &args.name,
            args.replication,
            &args.server_tenant,
            &args.broker_tenant,
        )
        .with_type(*table_type);
        request.strategy = strategy;
        created.push(manager.create_table(request)?);
    }
    Ok(serde_json::to_value(created)?)
}

pub async fn delete(manager: &ResourceManager, resource: &str) -> anyhow::Result<serde_json::Value> {
    let outcome = manager.delete_table(resource).await?;
    Ok(json!({ "resource": resource, "outcome": outcome }))
}

pub fn list(manager: &ResourceManager) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(manager.list_tables()?)?)
}
