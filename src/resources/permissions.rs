//! Permission wiring: policy statements and the grant edges from the compute
//! unit to every data, search and storage resource it touches.
//!
//! Grants are declarative. Building twice yields the same set; revoking one
//! means rebuilding without the edge.

use crate::core::naming::ResourceNames;
use crate::core::types::{ResourceKind, ResourceName};
use crate::resources::compute::ComputeUnit;
use crate::resources::edge::ObjectStore;
use crate::resources::search::SearchCluster;
use crate::resources::table::TableDescriptor;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Region/account pair every ARN is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountScope {
    pub region: String,
    pub account_id: String,
}

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a statement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    /// Anyone (narrowed by conditions)
    Any,
    /// The canonical user behind an access identity
    CanonicalUser { access_identity: ResourceName },
    /// The execution role of a compute unit
    ExecutionRole { compute_unit: ResourceName },
}

/// Condition operator → condition key → values.
pub type Conditions = IndexMap<String, IndexMap<String, Vec<String>>>;

/// One policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub principal: Principal,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub conditions: Conditions,
}

impl PolicyStatement {
    /// Whether this statement allows `action` for `principal` on `resource`.
    ///
    /// Wildcards are honored at the end of action and resource patterns
    /// (`es:*`, `arn:...:bucket/*`). Conditions are not evaluated.
    pub fn allows(&self, principal: &Principal, action: &str, resource: &str) -> bool {
        self.effect == Effect::Allow
            && (self.principal == Principal::Any || &self.principal == principal)
            && self.actions.iter().any(|a| pattern_matches(a, action))
            && self.resources.iter().any(|r| pattern_matches(r, resource))
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

/// Access level of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Full,
    ReadWrite,
    Put,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::ReadWrite => write!(f, "read-write"),
            Self::Put => write!(f, "put"),
        }
    }
}

const TABLE_FULL_ACTIONS: &[&str] = &["dynamodb:*"];

const SEARCH_READ_WRITE_ACTIONS: &[&str] = &[
    "es:ESHttpGet",
    "es:ESHttpHead",
    "es:ESHttpDelete",
    "es:ESHttpPost",
    "es:ESHttpPut",
    "es:ESHttpPatch",
];

const STORE_PUT_ACTIONS: &[&str] = &[
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
    "s3:Abort*",
];

fn owned(actions: &[&str]) -> Vec<String> {
    actions.iter().map(|a| a.to_string()).collect()
}

/// A directed permission edge from the compute unit to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Grant {
    /// Compute unit receiving the permission
    pub subject: ResourceName,
    /// Resource id the permission is on
    pub object: ResourceName,
    /// Kind of the object
    pub object_kind: ResourceKind,
    pub access: AccessLevel,
    /// Identity policy attached to the subject's execution role
    pub statement: PolicyStatement,
}

/// The object side of a grant, already constructed.
#[derive(Debug, Clone, Copy)]
pub enum GrantTarget<'a> {
    Table(ResourceKind, &'a TableDescriptor),
    Search(&'a SearchCluster),
    ObjectStore(&'a ObjectStore),
}

impl GrantTarget<'_> {
    /// Access level the compute unit receives on this kind of target.
    pub fn access_level(&self) -> AccessLevel {
        match self {
            Self::Table(..) => AccessLevel::Full,
            Self::Search(_) => AccessLevel::ReadWrite,
            Self::ObjectStore(_) => AccessLevel::Put,
        }
    }

    fn kind(&self) -> ResourceKind {
        match self {
            Self::Table(kind, _) => *kind,
            Self::Search(_) => ResourceKind::SearchCluster,
            Self::ObjectStore(_) => ResourceKind::ObjectStore,
        }
    }
}

/// The grant edges a stack needs: (object id, object kind, access level).
pub fn required_grants(names: &ResourceNames) -> Vec<(ResourceName, ResourceKind, AccessLevel)> {
    vec![
        (
            names.painting_table.clone(),
            ResourceKind::PaintingTable,
            AccessLevel::Full,
        ),
        (
            names.session_table.clone(),
            ResourceKind::SessionTable,
            AccessLevel::Full,
        ),
        (
            names.user_table.clone(),
            ResourceKind::UserTable,
            AccessLevel::Full,
        ),
        (
            names.search_endpoint.clone(),
            ResourceKind::SearchCluster,
            AccessLevel::ReadWrite,
        ),
        (
            names.object_store.clone(),
            ResourceKind::ObjectStore,
            AccessLevel::Put,
        ),
    ]
}

/// Build the grant from `subject` to `target`. `object` is the target's
/// resource id in the stack.
pub fn grant(
    subject: &ComputeUnit,
    object: &ResourceName,
    target: GrantTarget<'_>,
    scope: &AccountScope,
) -> Grant {
    let access = target.access_level();
    let (actions, resources) = match target {
        GrantTarget::Table(_, table) => (owned(TABLE_FULL_ACTIONS), vec![table.arn(scope)]),
        GrantTarget::Search(cluster) => {
            let arn = cluster.arn(scope);
            (owned(SEARCH_READ_WRITE_ACTIONS), vec![arn.clone(), format!("{}/*", arn)])
        }
        GrantTarget::ObjectStore(store) => (owned(STORE_PUT_ACTIONS), vec![store.objects_arn()]),
    };

    Grant {
        subject: subject.name.clone(),
        object: object.clone(),
        object_kind: target.kind(),
        access,
        statement: PolicyStatement {
            effect: Effect::Allow,
            principal: Principal::ExecutionRole {
                compute_unit: subject.name.clone(),
            },
            actions,
            resources,
            conditions: Conditions::new(),
        },
    }
}
