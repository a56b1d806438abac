//! Registered instances and their tenant tags.
//!
//! Tags are mutated only through conditional writes on the tag document, so
//! a tenant claim either tags every instance it picked or none of them.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use shardgrid_state::{
    CoordinationStore, InstanceConfig, InstanceId, Role, StateError, TenantRecord, Version,
};

use crate::error::{ControllerError, ControllerResult};
use crate::retry::{RetryPolicy, retry_on_conflict};

const TAGS_KEY: &str = "instances";

/// Query and tag instances in the coordination store.
#[derive(Clone)]
pub struct InstancePool {
    store: Arc<dyn CoordinationStore>,
    retry: RetryPolicy,
}

impl InstancePool {
    pub fn new(store: Arc<dyn CoordinationStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Register an instance. Returns false if the id was already known.
    pub fn register(&self, instance: &InstanceConfig) -> ControllerResult<bool> {
        let added = self.store.register_instance(instance)?;
        if added {
            info!(instance = %instance.id, role = %instance.role, "instance registered");
        }
        Ok(added)
    }

    /// Every registered instance, in id order.
    pub fn instances(&self) -> ControllerResult<Vec<InstanceConfig>> {
        let mut instances = self.store.read_instances()?.value;
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    /// Ids of instances carrying `tag`.
    pub fn tagged_instances(&self, tag: &str) -> ControllerResult<BTreeSet<InstanceId>> {
        Ok(self
            .store
            .read_instances()?
            .value
            .into_iter()
            .filter(|i| i.has_tag(tag))
            .map(|i| i.id)
            .collect())
    }

    /// Ids of instances with no tag at all, of any role.
    pub fn untagged_instances(&self) -> ControllerResult<BTreeSet<InstanceId>> {
        Ok(untagged(&self.store.read_instances()?.value, None)
            .into_iter()
            .collect())
    }

    /// Ids of untagged instances of one role.
    pub fn untagged_instances_with_role(&self, role: Role) -> ControllerResult<BTreeSet<InstanceId>> {
        Ok(untagged(&self.store.read_instances()?.value, Some(role))
            .into_iter()
            .collect())
    }

    /// Add `tag` to each listed instance. Instances that already carry it
    /// are left alone, so repeating the call is a no-op.
    pub async fn tag(&self, instances: &[InstanceId], tag: &str) -> ControllerResult<Version> {
        retry_on_conflict(&self.retry, TAGS_KEY, |_| {
            let snapshot = self.store.read_instances()?;
            let mut pending = Vec::new();
            for id in instances {
                let instance = snapshot
                    .value
                    .iter()
                    .find(|i| &i.id == id)
                    .ok_or_else(|| ControllerError::InvalidRequest(format!("unknown instance {id}")))?;
                if !instance.has_tag(tag) {
                    pending.push((id.clone(), tag.to_string()));
                }
            }
            if pending.is_empty() {
                return Ok(snapshot.version);
            }

            let version = self
                .store
                .write_tags_if_version(&pending, None, snapshot.version)?;
            debug!(%tag, tagged = pending.len(), %version, "instances tagged");
            Ok(version)
        })
        .await
    }

    /// Claim `requested` untagged instances of `role` for a new tenant.
    ///
    /// `layout` receives the claimed ids (in id order) and returns the tags
    /// to write plus the tenant record committed with them. Nothing is
    /// written when fewer than `requested` instances are untagged.
    pub async fn claim<F>(&self, role: Role, requested: u32, layout: F) -> ControllerResult<TenantRecord>
    where
        F: Fn(&[InstanceId]) -> (Vec<(InstanceId, String)>, TenantRecord),
    {
        retry_on_conflict(&self.retry, TAGS_KEY, |attempt| {
            let snapshot = self.store.read_instances()?;
            let available = untagged(&snapshot.value, Some(role));
            if available.len() < requested as usize {
                return Err(ControllerError::InsufficientUntaggedInstances {
                    role,
                    requested,
                    available: available.len(),
                });
            }

            let claimed = &available[..requested as usize];
            let (tags, record) = layout(claimed);
            match self
                .store
                .write_tags_if_version(&tags, Some(&record), snapshot.version)
            {
                Ok(version) => {
                    debug!(tenant = %record.name, %role, attempt, %version, "tenant tags committed");
                    Ok(record)
                }
                Err(StateError::AlreadyExists(_)) => Err(ControllerError::TenantAlreadyExists {
                    role,
                    name: record.name.clone(),
                }),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

/// Untagged instance ids, optionally restricted to one role, in id order.
fn untagged(instances: &[InstanceConfig], role: Option<Role>) -> Vec<InstanceId> {
    let mut ids: Vec<InstanceId> = instances
        .iter()
        .filter(|i| i.is_untagged() && role.is_none_or(|r| i.role == r))
        .map(|i| i.id.clone())
        .collect();
    ids.sort();
    ids
}
