//! Naming resolver: every resource name is a pure function of the prefix and
//! the environment token.

use super::error::BuildError;
use super::types::{EnvironmentToken, ResourceKind, ResourceName};
use std::collections::HashMap;

/// Human-facing application name used in stack ids and API display names.
pub const APP_NAME: &str = "WaterColorSite";

/// Log group path prefix for API access logs.
const API_LOG_PATH: &str = "/aws/apigateway";

/// Environment-qualified names for every resource of one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub compute_unit: ResourceName,
    pub painting_table: ResourceName,
    pub session_table: ResourceName,
    pub user_table: ResourceName,
    pub search_cluster: ResourceName,
    pub search_endpoint: ResourceName,
    pub object_store: ResourceName,
    pub api: ResourceName,
    pub log_group: ResourceName,
    pub distribution: ResourceName,
    pub access_identity: ResourceName,
    pub bucket_policy: ResourceName,
}

impl ResourceNames {
    /// Derive all names for `environment`. Fails with `NamingCollision` if
    /// two kinds would share a name.
    pub fn resolve(prefix: &str, environment: &EnvironmentToken) -> Result<Self, BuildError> {
        let env = environment.as_str();
        let qualified = |kind: &str| ResourceName::new(format!("{prefix}-{kind}-{env}"));

        let names = Self {
            compute_unit: ResourceName::new(format!("{prefix}-{env}")),
            painting_table: qualified("table"),
            session_table: qualified("session-table"),
            user_table: qualified("user-table"),
            search_cluster: ResourceName::new(format!("es-{prefix}-{env}")),
            search_endpoint: qualified("es-domain"),
            object_store: qualified("bucket"),
            api: qualified("api"),
            log_group: qualified("api-log"),
            distribution: qualified("distribution"),
            access_identity: qualified("bucket-oai"),
            bucket_policy: qualified("bucket-policy"),
        };
        ensure_unique(names.entries())?;
        tracing::trace!(%environment, compute = %names.compute_unit, "names resolved");
        Ok(names)
    }

    /// Every (kind, name) pair, in declaration order.
    pub fn entries(&self) -> Vec<(ResourceKind, &ResourceName)> {
        vec![
            (ResourceKind::ComputeUnit, &self.compute_unit),
            (ResourceKind::PaintingTable, &self.painting_table),
            (ResourceKind::SessionTable, &self.session_table),
            (ResourceKind::UserTable, &self.user_table),
            (ResourceKind::SearchCluster, &self.search_cluster),
            (ResourceKind::SearchEndpoint, &self.search_endpoint),
            (ResourceKind::ObjectStore, &self.object_store),
            (ResourceKind::ApiEntryPoint, &self.api),
            (ResourceKind::LogGroup, &self.log_group),
            (ResourceKind::Distribution, &self.distribution),
            (ResourceKind::AccessIdentity, &self.access_identity),
            (ResourceKind::BucketPolicy, &self.bucket_policy),
        ]
    }

    /// Physical log group name (`/aws/apigateway/<log group>`).
    pub fn log_group_path(&self) -> String {
        format!("{}/{}", API_LOG_PATH, self.log_group)
    }
}

/// Name of the grant edge from `subject` to `object`.
pub fn grant_name(subject: &ResourceName, object: &ResourceName) -> ResourceName {
    ResourceName::new(format!("{subject}-grant-{object}"))
}

/// Top-level stack identifier (`WaterColorSiteStackProd`).
pub fn stack_id(environment: &EnvironmentToken) -> String {
    format!("{}Stack{}", APP_NAME, environment.capitalized())
}

/// Fail with `NamingCollision` on the first name claimed twice.
pub fn ensure_unique<'a>(
    entries: impl IntoIterator<Item = (ResourceKind, &'a ResourceName)>,
) -> Result<(), BuildError> {
    let mut seen: HashMap<&str, ResourceKind> = HashMap::new();
    for (kind, name) in entries {
        if let Some(first) = seen.insert(name.as_str(), kind) {
            return Err(BuildError::NamingCollision {
                name: name.to_string(),
                first,
                second: kind,
            });
        }
    }
    Ok(())
}
