//! Plan generation: diff a freshly built description against the lock.

use super::hasher;
use super::types::{
    ExecutionPlan, PlanAction, PlannedChange, ResourceDescriptor, ResourceKind, ResourceLock,
    StackDescription, StackLock, StackResource,
};

/// Digest of one description entry.
pub fn hash_resource(resource: &StackResource) -> Result<String, String> {
    hasher::hash_serialized(resource)
}

/// Lock recording every resource digest of `description`.
pub fn lock_from_description(description: &StackDescription) -> Result<StackLock, String> {
    let mut lock = super::state::new_lock(&description.stack_id, &description.environment);
    for (id, resource) in &description.resources {
        lock.resources.insert(
            id.clone(),
            ResourceLock {
                kind: resource.kind,
                hash: hash_resource(resource)?,
            },
        );
    }
    Ok(lock)
}

/// Digest over every entry of a lock, in order.
pub fn description_digest(lock: &StackLock) -> String {
    let parts: Vec<String> = lock
        .resources
        .iter()
        .map(|(id, rl)| format!("{}={}", id, rl.hash))
        .collect();
    let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
    hasher::composite_hash(&refs)
}

/// Compare `description` with the last recorded lock. Without a lock every
/// resource is a create. Lock entries the description no longer contains
/// (a removed grant, say) are destroys.
pub fn plan(
    description: &StackDescription,
    lock: Option<&StackLock>,
) -> Result<ExecutionPlan, String> {
    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut to_destroy = 0u32;
    let mut unchanged = 0u32;

    for (id, resource) in &description.resources {
        let desired = hash_resource(resource)?;
        let action = match lock.and_then(|l| l.resources.get(id)) {
            Some(rl) if rl.hash == desired => PlanAction::NoOp,
            Some(_) => PlanAction::Update,
            None => PlanAction::Create,
        };
        match action {
            PlanAction::Create => to_create += 1,
            PlanAction::Update => to_update += 1,
            PlanAction::NoOp => unchanged += 1,
            PlanAction::Destroy => to_destroy += 1,
        }
        changes.push(PlannedChange {
            resource_id: id.clone(),
            kind: resource.kind,
            description: describe_action(id, resource.kind, Some(&resource.properties), &action),
            action,
        });
    }

    if let Some(lock) = lock {
        for (id, rl) in &lock.resources {
            if !description.resources.contains_key(id) {
                to_destroy += 1;
                changes.push(PlannedChange {
                    resource_id: id.clone(),
                    kind: rl.kind,
                    description: describe_action(id, rl.kind, None, &PlanAction::Destroy),
                    action: PlanAction::Destroy,
                });
            }
        }
    }

    Ok(ExecutionPlan {
        stack_id: description.stack_id.clone(),
        changes,
        to_create,
        to_update,
        to_destroy,
        unchanged,
    })
}

fn describe_action(
    resource_id: &str,
    kind: ResourceKind,
    properties: Option<&ResourceDescriptor>,
    action: &PlanAction,
) -> String {
    match action {
        PlanAction::Create => match properties {
            Some(ResourceDescriptor::Grant(g)) => {
                format!("{}: grant {} on {}", resource_id, g.access, g.object)
            }
            Some(ResourceDescriptor::Api(a)) => format!(
                "{}: create {} ({} routes)",
                resource_id,
                kind,
                a.root.route_table().len()
            ),
            _ => format!("{}: create {}", resource_id, kind),
        },
        PlanAction::Update => format!("{}: update {} (description changed)", resource_id, kind),
        PlanAction::Destroy => format!("{}: destroy {}", resource_id, kind),
        PlanAction::NoOp => format!("{}: no changes", resource_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::resolved;
    use crate::core::stack::build_stack;

    fn description(env: &str) -> StackDescription {
        let (_dir, cfg) = resolved(env);
        build_stack(&cfg).unwrap()
    }

    #[test]
    fn test_plan_all_create() {
        let desc = description("staging");
        let p = plan(&desc, None).unwrap();
        assert_eq!(p.to_create, 16);
        assert_eq!(p.unchanged, 0);
        assert_eq!(p.stack_id, "WaterColorSiteStackStaging");
        assert!(!p.is_empty());
    }

    #[test]
    fn test_plan_after_record_is_noop() {
        let desc = description("staging");
        let lock = lock_from_description(&desc).unwrap();
        let p = plan(&desc, Some(&lock)).unwrap();
        assert!(p.is_empty());
        assert_eq!(p.unchanged, 16);
        assert!(p.changes.iter().all(|c| c.action == PlanAction::NoOp));
    }

    #[test]
    fn test_plan_update_on_hash_mismatch() {
        let desc = description("staging");
        let mut lock = lock_from_description(&desc).unwrap();
        if let Some(rl) = lock.resources.get_mut("wcs-staging") {
            rl.hash = "blake3:stale".to_string();
        }
        let p = plan(&desc, Some(&lock)).unwrap();
        assert_eq!(p.to_update, 1);
        let change = p
            .changes
            .iter()
            .find(|c| c.action == PlanAction::Update)
            .unwrap();
        assert_eq!(change.resource_id, "wcs-staging");
        assert!(change.description.contains("description changed"));
    }

    #[test]
    fn test_plan_destroy_for_removed_grant() {
        let desc = description("staging");
        let mut lock = lock_from_description(&desc).unwrap();
        lock.resources.insert(
            "wcs-staging-grant-wcs-legacy-table-staging".to_string(),
            ResourceLock {
                kind: ResourceKind::Grant,
                hash: "blake3:old".to_string(),
            },
        );
        let p = plan(&desc, Some(&lock)).unwrap();
        assert_eq!(p.to_destroy, 1);
        let last = p.changes.last().unwrap();
        assert_eq!(last.action, PlanAction::Destroy);
        assert_eq!(last.kind, ResourceKind::Grant);
    }

    #[test]
    fn test_plan_other_environment_creates_everything() {
        let staging = lock_from_description(&description("staging")).unwrap();
        let prod = description("prod");
        let p = plan(&prod, Some(&staging)).unwrap();
        assert_eq!(p.to_create, 16);
        assert_eq!(p.to_destroy, 16);
    }

    #[test]
    fn test_hash_deterministic() {
        let a = lock_from_description(&description("staging")).unwrap();
        let b = lock_from_description(&description("staging")).unwrap();
        assert_eq!(description_digest(&a), description_digest(&b));
        let prod = lock_from_description(&description("prod")).unwrap();
        assert_ne!(description_digest(&a), description_digest(&prod));
    }

    #[test]
    fn test_describe_action() {
        let desc = description("staging");
        let p = plan(&desc, None).unwrap();
        let grant = p
            .changes
            .iter()
            .find(|c| c.resource_id == "wcs-staging-grant-wcs-bucket-staging")
            .unwrap();
        assert_eq!(
            grant.description,
            "wcs-staging-grant-wcs-bucket-staging: grant put on wcs-bucket-staging"
        );
        let api = p.changes.iter().find(|c| c.resource_id == "wcs-api-staging").unwrap();
        assert_eq!(api.description, "wcs-api-staging: create api_entry_point (8 routes)");
    }
}
