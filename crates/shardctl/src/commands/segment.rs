use serde_json::json;

use shardgrid_controller::ResourceManager;

pub async fn add(
    manager: &ResourceManager,
    resource: &str,
    segment: &str,
    url: &str,
) -> anyhow::Result<serde_json::Value> {
    let assignment = manager.add_segment(resource, segment, url).await?;
    Ok(serde_json::to_value(assignment)?)
}

pub async fn delete(
    manager: &ResourceManager,
    resource: &str,
    segment: &str,
) -> anyhow::Result<serde_json::Value> {
    let outcome = manager.delete_segment(resource, segment).await?;
    Ok(json!({ "resource": resource, "segment": segment, "outcome": outcome }))
}

/// Segment metadata joined with the current replica set.
pub fn list(manager: &ResourceManager, resource: &str) -> anyhow::Result<serde_json::Value> {
    let placement = manager.placement(resource)?;
    let segments: Vec<serde_json::Value> = manager
        .list_segments(resource)?
        .into_iter()
        .map(|metadata| {
            let replicas = placement.value.replicas(&metadata.name).unwrap_or_default();
            json!({
                "name": metadata.name,
                "download_url": metadata.download_url,
                "pushed_at": metadata.pushed_at,
                "refreshed_at": metadata.refreshed_at,
                "replicas": replicas,
            })
        })
        .collect();
    Ok(serde_json::Value::Array(segments))
}
