//! Shared types: environment identity, resource kinds and names, the composed
//! stack description, and the lock/plan types used for re-invocation.
//!
//! Everything that appears in a stack description derives Serialize,
//! Deserialize and JsonSchema so a convergence engine can consume it directly.

use super::error::BuildError;
use crate::resources::{
    api::{ApiDescriptor, LogGroup},
    compute::ComputeUnit,
    edge::{AccessIdentity, BucketPolicy, Distribution, ObjectStore},
    permissions::Grant,
    search::SearchCluster,
    table::TableDescriptor,
};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Environment identity
// ============================================================================

/// The token that identifies the production deployment target.
pub const PRODUCTION_TOKEN: &str = "prod";

/// Deployment target identifier ("prod", "staging", ...).
///
/// Read once at process start and never mutated; every resource name is a
/// function of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentToken(String);

impl EnvironmentToken {
    /// Validate a raw token. Empty or whitespace-only tokens are rejected.
    pub fn new(token: impl Into<String>) -> Result<Self, BuildError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(BuildError::invalid(
                "environment token must not be empty (set --env or SYSTEM_ENV)",
            ));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the environment class once; builders branch on this, never on
    /// the raw string.
    pub fn class(&self) -> EnvironmentClass {
        if self.0 == PRODUCTION_TOKEN {
            EnvironmentClass::Production
        } else {
            EnvironmentClass::NonProduction
        }
    }

    /// Token with its first character upper-cased (`prod` → `Prod`).
    pub fn capitalized(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for EnvironmentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Environment class, resolved once from the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentClass {
    Production,
    NonProduction,
}

impl fmt::Display for EnvironmentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::NonProduction => write!(f, "non-production"),
        }
    }
}

// ============================================================================
// Resource identity
// ============================================================================

/// Kind of a resource in the stack.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ComputeUnit,
    PaintingTable,
    SessionTable,
    UserTable,
    SearchCluster,
    SearchEndpoint,
    ObjectStore,
    ApiEntryPoint,
    LogGroup,
    Distribution,
    AccessIdentity,
    BucketPolicy,
    Grant,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ComputeUnit => "compute_unit",
            Self::PaintingTable => "painting_table",
            Self::SessionTable => "session_table",
            Self::UserTable => "user_table",
            Self::SearchCluster => "search_cluster",
            Self::SearchEndpoint => "search_endpoint",
            Self::ObjectStore => "object_store",
            Self::ApiEntryPoint => "api_entry_point",
            Self::LogGroup => "log_group",
            Self::Distribution => "distribution",
            Self::AccessIdentity => "access_identity",
            Self::BucketPolicy => "bucket_policy",
            Self::Grant => "grant",
        };
        f.write_str(s)
    }
}

/// Environment-qualified resource name (`<prefix>-<kind>-<environment>`).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct ResourceName(String);

impl ResourceName {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for ResourceName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ResourceName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Opaque reference to an externally managed TLS certificate (ACM ARN).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct CertificateRef(String);

impl CertificateRef {
    pub(crate) fn new(arn: impl Into<String>) -> Self {
        Self(arn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Stack description
// ============================================================================

/// The composed infrastructure description handed to a convergence engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StackDescription {
    /// Top-level stack identifier (`WaterColorSiteStackProd`)
    pub stack_id: String,

    /// Environment token the stack was built for
    pub environment: String,

    /// Environment class derived from the token
    pub environment_class: EnvironmentClass,

    /// Resources in dependency order (every dependency precedes its dependents)
    pub resources: IndexMap<String, StackResource>,
}

/// One resource entry of the description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StackResource {
    /// Resource kind
    pub kind: ResourceKind,

    /// Resources that must be converged first
    #[serde(default)]
    pub depends_on: Vec<ResourceName>,

    /// Kind-specific properties
    pub properties: ResourceDescriptor,
}

/// Kind-specific resource properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "spec", rename_all = "snake_case")]
pub enum ResourceDescriptor {
    ComputeUnit(ComputeUnit),
    Table(TableDescriptor),
    SearchCluster(SearchCluster),
    LogGroup(LogGroup),
    Api(ApiDescriptor),
    ObjectStore(ObjectStore),
    AccessIdentity(AccessIdentity),
    BucketPolicy(BucketPolicy),
    Distribution(Distribution),
    Grant(Grant),
}

impl StackDescription {
    /// Look up a resource by its id.
    pub fn resource(&self, id: &str) -> Option<&StackResource> {
        self.resources.get(id)
    }

    /// Resource ids in emission (dependency) order.
    pub fn resource_ids(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// All grants, in emission order.
    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.resources.values().filter_map(|r| match &r.properties {
            ResourceDescriptor::Grant(g) => Some(g),
            _ => None,
        })
    }

    /// All tables, in emission order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.resources.values().filter_map(|r| match &r.properties {
            ResourceDescriptor::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn compute_unit(&self) -> Option<&ComputeUnit> {
        self.resources.values().find_map(|r| match &r.properties {
            ResourceDescriptor::ComputeUnit(c) => Some(c),
            _ => None,
        })
    }

    pub fn search_cluster(&self) -> Option<&SearchCluster> {
        self.resources.values().find_map(|r| match &r.properties {
            ResourceDescriptor::SearchCluster(s) => Some(s),
            _ => None,
        })
    }

    pub fn api(&self) -> Option<&ApiDescriptor> {
        self.resources.values().find_map(|r| match &r.properties {
            ResourceDescriptor::Api(a) => Some(a),
            _ => None,
        })
    }

    pub fn object_store(&self) -> Option<&ObjectStore> {
        self.resources.values().find_map(|r| match &r.properties {
            ResourceDescriptor::ObjectStore(o) => Some(o),
            _ => None,
        })
    }

    pub fn distribution(&self) -> Option<&Distribution> {
        self.resources.values().find_map(|r| match &r.properties {
            ResourceDescriptor::Distribution(d) => Some(d),
            _ => None,
        })
    }
}

// ============================================================================
// Lock file
// ============================================================================

/// Last recorded description digest for one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackLock {
    /// Schema version
    pub schema: String,

    /// Stack identifier
    pub stack_id: String,

    /// Environment token
    pub environment: String,

    /// When the lock was recorded
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// Per-resource digests, in dependency order
    pub resources: IndexMap<String, ResourceLock>,
}

/// Per-resource lock entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    /// Resource kind
    pub kind: ResourceKind,

    /// BLAKE3 digest of the resource's description entry
    pub hash: String,
}

// ============================================================================
// Plan
// ============================================================================

/// Action to take on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub action: PlanAction,
    pub description: String,
}

/// Diff between a fresh description and the recorded lock.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub stack_id: String,
    pub changes: Vec<PlannedChange>,
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

impl ExecutionPlan {
    /// True when converging would change nothing.
    pub fn is_empty(&self) -> bool {
        self.to_create == 0 && self.to_update == 0 && self.to_destroy == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_rejects_empty() {
        assert!(matches!(
            EnvironmentToken::new(""),
            Err(BuildError::InvalidConfiguration(_))
        ));
        assert!(EnvironmentToken::new("   ").is_err());
    }

    #[test]
    fn test_token_class() {
        let prod = EnvironmentToken::new("prod").unwrap();
        let staging = EnvironmentToken::new("staging").unwrap();
        assert_eq!(prod.class(), EnvironmentClass::Production);
        assert_eq!(staging.class(), EnvironmentClass::NonProduction);
        // Only the exact token is production.
        assert_eq!(
            EnvironmentToken::new("Prod").unwrap().class(),
            EnvironmentClass::NonProduction
        );
    }

    #[test]
    fn test_token_capitalized() {
        assert_eq!(EnvironmentToken::new("prod").unwrap().capitalized(), "Prod");
        assert_eq!(
            EnvironmentToken::new("staging").unwrap().capitalized(),
            "Staging"
        );
        assert_eq!(EnvironmentToken::new("x").unwrap().capitalized(), "X");
    }

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::ComputeUnit.to_string(), "compute_unit");
        assert_eq!(ResourceKind::AccessIdentity.to_string(), "access_identity");
    }

    #[test]
    fn test_resource_kind_serde_matches_display() {
        let json = serde_json::to_string(&ResourceKind::SearchEndpoint).unwrap();
        assert_eq!(json, "\"search_endpoint\"");
    }

    #[test]
    fn test_resource_name_transparent() {
        let name = ResourceName::new("wcs-bucket-prod");
        assert_eq!(
            serde_json::to_string(&name).unwrap(),
            "\"wcs-bucket-prod\""
        );
        assert_eq!(name, "wcs-bucket-prod");
    }

    #[test]
    fn test_plan_action_display() {
        assert_eq!(PlanAction::Create.to_string(), "CREATE");
        assert_eq!(PlanAction::NoOp.to_string(), "NO-OP");
    }

    #[test]
    fn test_lock_roundtrip_preserves_order() {
        let lock = StackLock {
            schema: "1.0".to_string(),
            stack_id: "WaterColorSiteStackProd".to_string(),
            environment: "prod".to_string(),
            generated_at: "2026-02-16T14:00:00Z".to_string(),
            generator: "wcs-infra 0.1.0".to_string(),
            resources: IndexMap::from([
                (
                    "wcs-prod".to_string(),
                    ResourceLock {
                        kind: ResourceKind::ComputeUnit,
                        hash: "blake3:aaa".to_string(),
                    },
                ),
                (
                    "wcs-bucket-prod".to_string(),
                    ResourceLock {
                        kind: ResourceKind::ObjectStore,
                        hash: "blake3:bbb".to_string(),
                    },
                ),
            ]),
        };
        let yaml = serde_yaml_ng::to_string(&lock).unwrap();
        let back: StackLock = serde_yaml_ng::from_str(&yaml).unwrap();
        let keys: Vec<_> = back.resources.keys().collect();
        assert_eq!(keys, vec!["wcs-prod", "wcs-bucket-prod"]);
        assert_eq!(back.resources["wcs-prod"].kind, ResourceKind::ComputeUnit);
    }
}
