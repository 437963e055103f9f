//! Stack assembler.
//!
//! Declares every resource of one environment as a node with explicit
//! dependency edges, orders the nodes topologically, then constructs each
//! descriptor from the already-constructed descriptors it depends on. Any
//! error aborts the whole build; no partial description is returned.

use super::config::{ResolvedConfig, StackConfig};
use super::error::BuildError;
use super::naming::{self, ResourceNames};
use super::resolver;
use super::types::{
    ResourceDescriptor, ResourceKind, ResourceName, StackDescription, StackResource,
};
use crate::resources::permissions::{self, GrantTarget};
use crate::resources::table::{self, TableRole};
use crate::resources::{api, compute, edge, search};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;

/// What a declared node constructs.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Compute,
    Table(TableRole),
    Search,
    LogGroup,
    Api,
    ObjectStore,
    AccessIdentity,
    BucketPolicy,
    Distribution,
    Grant { object: ResourceName },
}

#[derive(Debug)]
struct NodeSpec {
    id: ResourceName,
    kind: ResourceKind,
    node: Node,
    depends_on: Vec<ResourceName>,
}

impl NodeSpec {
    fn leaf(id: &ResourceName, kind: ResourceKind, node: Node) -> Self {
        Self {
            id: id.clone(),
            kind,
            node,
            depends_on: Vec::new(),
        }
    }

    fn after(mut self, deps: &[&ResourceName]) -> Self {
        self.depends_on = deps.iter().map(|d| (*d).clone()).collect();
        self
    }
}

/// Every node of the stack with its dependency edges.
fn declare(names: &ResourceNames) -> Vec<NodeSpec> {
    let mut specs = vec![NodeSpec::leaf(
        &names.compute_unit,
        ResourceKind::ComputeUnit,
        Node::Compute,
    )];

    for role in TableRole::ALL {
        specs.push(NodeSpec::leaf(role.name(names), role.kind(), Node::Table(role)));
    }

    specs.push(NodeSpec::leaf(
        &names.search_endpoint,
        ResourceKind::SearchCluster,
        Node::Search,
    ));
    specs.push(NodeSpec::leaf(
        &names.log_group,
        ResourceKind::LogGroup,
        Node::LogGroup,
    ));
    specs.push(
        NodeSpec::leaf(&names.api, ResourceKind::ApiEntryPoint, Node::Api)
            .after(&[&names.compute_unit, &names.log_group]),
    );
    specs.push(NodeSpec::leaf(
        &names.object_store,
        ResourceKind::ObjectStore,
        Node::ObjectStore,
    ));
    specs.push(NodeSpec::leaf(
        &names.access_identity,
        ResourceKind::AccessIdentity,
        Node::AccessIdentity,
    ));
    specs.push(
        NodeSpec::leaf(
            &names.bucket_policy,
            ResourceKind::BucketPolicy,
            Node::BucketPolicy,
        )
        .after(&[&names.object_store, &names.access_identity]),
    );
    specs.push(
        NodeSpec::leaf(
            &names.distribution,
            ResourceKind::Distribution,
            Node::Distribution,
        )
        .after(&[
            &names.object_store,
            &names.access_identity,
            &names.bucket_policy,
        ]),
    );

    for (object, _, _) in permissions::required_grants(names) {
        let id = naming::grant_name(&names.compute_unit, &object);
        specs.push(
            NodeSpec::leaf(&id, ResourceKind::Grant, Node::Grant { object: object.clone() })
                .after(&[&names.compute_unit, &object]),
        );
    }

    specs
}

/// Descriptors constructed so far, keyed by resource id.
#[derive(Default)]
struct Registry {
    built: IndexMap<String, StackResource>,
}

impl Registry {
    fn lookup<'a, T>(
        &'a self,
        id: &ResourceName,
        what: &str,
        pick: impl FnOnce(&'a ResourceDescriptor) -> Option<&'a T>,
    ) -> Result<&'a T, BuildError> {
        let resource = self.built.get(id.as_str()).ok_or_else(|| {
            BuildError::invalid(format!("'{}' used before it was constructed", id))
        })?;
        pick(&resource.properties)
            .ok_or_else(|| BuildError::invalid(format!("'{}' is not a {}", id, what)))
    }

    fn kind_of(&self, id: &ResourceName) -> Option<ResourceKind> {
        self.built.get(id.as_str()).map(|r| r.kind)
    }
}

fn construct(
    spec: &NodeSpec,
    names: &ResourceNames,
    config: &ResolvedConfig,
    registry: &Registry,
) -> Result<ResourceDescriptor, BuildError> {
    let descriptor = match &spec.node {
        Node::Compute => ResourceDescriptor::ComputeUnit(compute::build(names, config)),
        Node::Table(role) => ResourceDescriptor::Table(table::build(*role, names)),
        Node::Search => ResourceDescriptor::SearchCluster(search::build(names, config)),
        Node::LogGroup => ResourceDescriptor::LogGroup(api::build_log_group(names)),
        Node::Api => {
            let unit = registry.lookup(&names.compute_unit, "compute unit", |d| match d {
                ResourceDescriptor::ComputeUnit(c) => Some(c),
                _ => None,
            })?;
            let log = registry.lookup(&names.log_group, "log group", |d| match d {
                ResourceDescriptor::LogGroup(l) => Some(l),
                _ => None,
            })?;
            ResourceDescriptor::Api(api::build(names, config, unit, log)?)
        }
        Node::ObjectStore => ResourceDescriptor::ObjectStore(edge::build_object_store(names)),
        Node::AccessIdentity => {
            ResourceDescriptor::AccessIdentity(edge::build_access_identity(names))
        }
        Node::BucketPolicy => {
            let store = object_store(registry, &names.object_store)?;
            let identity = access_identity(registry, &names.access_identity)?;
            ResourceDescriptor::BucketPolicy(edge::build_bucket_policy(names, store, identity))
        }
        Node::Distribution => {
            let store = object_store(registry, &names.object_store)?;
            let identity = access_identity(registry, &names.access_identity)?;
            ResourceDescriptor::Distribution(edge::build_distribution(
                names, config, store, identity,
            ))
        }
        Node::Grant { object } => {
            let unit = registry.lookup(&names.compute_unit, "compute unit", |d| match d {
                ResourceDescriptor::ComputeUnit(c) => Some(c),
                _ => None,
            })?;
            let target = grant_target(registry, object)?;
            ResourceDescriptor::Grant(permissions::grant(unit, object, target, &config.scope()))
        }
    };
    Ok(descriptor)
}

fn object_store<'a>(
    registry: &'a Registry,
    id: &ResourceName,
) -> Result<&'a edge::ObjectStore, BuildError> {
    registry.lookup(id, "object store", |d| match d {
        ResourceDescriptor::ObjectStore(o) => Some(o),
        _ => None,
    })
}

fn access_identity<'a>(
    registry: &'a Registry,
    id: &ResourceName,
) -> Result<&'a edge::AccessIdentity, BuildError> {
    registry.lookup(id, "access identity", |d| match d {
        ResourceDescriptor::AccessIdentity(a) => Some(a),
        _ => None,
    })
}

fn grant_target<'a>(
    registry: &'a Registry,
    object: &ResourceName,
) -> Result<GrantTarget<'a>, BuildError> {
    match registry.kind_of(object) {
        Some(kind @ (ResourceKind::PaintingTable | ResourceKind::SessionTable | ResourceKind::UserTable)) => {
            let t = registry.lookup(object, "table", |d| match d {
                ResourceDescriptor::Table(t) => Some(t),
                _ => None,
            })?;
            Ok(GrantTarget::Table(kind, t))
        }
        Some(ResourceKind::SearchCluster) => {
            let c = registry.lookup(object, "search cluster", |d| match d {
                ResourceDescriptor::SearchCluster(c) => Some(c),
                _ => None,
            })?;
            Ok(GrantTarget::Search(c))
        }
        Some(ResourceKind::ObjectStore) => Ok(GrantTarget::ObjectStore(object_store(registry, object)?)),
        Some(other) => Err(BuildError::invalid(format!(
            "cannot grant access to {} '{}'",
            other, object
        ))),
        None => Err(BuildError::invalid(format!(
            "grant object '{}' used before it was constructed",
            object
        ))),
    }
}

/// Build the full stack description for a resolved configuration.
#[tracing::instrument(skip_all, fields(environment = %config.environment))]
pub fn build_stack(config: &ResolvedConfig) -> Result<StackDescription, BuildError> {
    let names = ResourceNames::resolve(&config.prefix, &config.environment)?;
    let specs = declare(&names);
    naming::ensure_unique(specs.iter().map(|s| (s.kind, &s.id)))?;

    let graph: IndexMap<String, Vec<String>> = specs
        .iter()
        .map(|s| {
            (
                s.id.to_string(),
                s.depends_on.iter().map(|d| d.to_string()).collect(),
            )
        })
        .collect();
    let order = resolver::build_order(&graph)?;

    let by_id: HashMap<&str, &NodeSpec> = specs.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut registry = Registry::default();
    for id in &order {
        let spec = by_id
            .get(id.as_str())
            .ok_or_else(|| BuildError::invalid(format!("unknown resource '{}'", id)))?;
        let properties = construct(spec, &names, config, &registry)?;
        tracing::debug!(id = %spec.id, kind = %spec.kind, "constructed");
        registry.built.insert(
            id.clone(),
            StackResource {
                kind: spec.kind,
                depends_on: spec.depends_on.clone(),
                properties,
            },
        );
    }

    let description = StackDescription {
        stack_id: naming::stack_id(&config.environment),
        environment: config.environment.to_string(),
        environment_class: config.class,
        resources: registry.built,
    };
    tracing::info!(
        stack = %description.stack_id,
        resources = description.resources.len(),
        "stack built"
    );
    Ok(description)
}

/// Resolve `config` for `environment` and build the stack.
pub fn synthesize(
    config: &StackConfig,
    environment: &str,
    base_dir: &Path,
) -> Result<StackDescription, BuildError> {
    let resolved = config.resolve(environment, base_dir)?;
    build_stack(&resolved)
}
