//! Search cluster descriptor.
//!
//! Two independent paths reach the cluster: the IP-restricted resource
//! policy declared here, and the compute unit's read-write grant.

use crate::core::config::ResolvedConfig;
use crate::core::naming::ResourceNames;
use crate::core::types::{CertificateRef, ResourceName};
use crate::resources::permissions::{
    AccountScope, Conditions, Effect, PolicyStatement, Principal,
};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const ENGINE_VERSION: &str = "Elasticsearch_7.10";
pub const DATA_NODE_INSTANCE_TYPE: &str = "t3.small.elasticsearch";
pub const DATA_NODES: u32 = 1;

/// Node layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterCapacity {
    pub data_nodes: u32,
    pub data_node_instance_type: String,
}

/// Custom endpoint served with an externally managed certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CustomEndpoint {
    pub domain_name: String,
    pub certificate: CertificateRef,
}

/// Search cluster descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchCluster {
    /// Index endpoint resource id
    pub name: ResourceName,
    /// Physical domain name
    pub domain_name: ResourceName,
    pub engine_version: String,
    pub capacity: ClusterCapacity,
    pub custom_endpoint: CustomEndpoint,
    pub access_policies: Vec<PolicyStatement>,
}

impl SearchCluster {
    pub fn arn(&self, scope: &AccountScope) -> String {
        domain_arn(scope, &self.domain_name)
    }

    /// Source addresses the resource policy admits directly.
    pub fn allowed_source_ips(&self) -> Vec<&str> {
        self.access_policies
            .iter()
            .filter_map(|s| s.conditions.get("IpAddress"))
            .filter_map(|c| c.get("aws:SourceIp"))
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

/// ARN of a search domain.
pub fn domain_arn(scope: &AccountScope, domain: &ResourceName) -> String {
    format!(
        "arn:aws:es:{}:{}:domain/{}",
        scope.region, scope.account_id, domain
    )
}

/// Describe the search cluster. The resource policy allows every action for
/// any principal whose source address is on the allow-list, scoped to this
/// environment's own domain.
pub fn build(names: &ResourceNames, config: &ResolvedConfig) -> SearchCluster {
    let scope = config.scope();
    let conditions: Conditions = IndexMap::from([(
        "IpAddress".to_string(),
        IndexMap::from([(
            "aws:SourceIp".to_string(),
            config.allowed_source_ips.clone(),
        )]),
    )]);

    let ip_restricted = PolicyStatement {
        effect: Effect::Allow,
        principal: Principal::Any,
        actions: vec!["es:*".to_string()],
        resources: vec![format!("{}/*", domain_arn(&scope, &names.search_cluster))],
        conditions,
    };

    SearchCluster {
        name: names.search_endpoint.clone(),
        domain_name: names.search_cluster.clone(),
        engine_version: ENGINE_VERSION.to_string(),
        capacity: ClusterCapacity {
            data_nodes: DATA_NODES,
            data_node_instance_type: DATA_NODE_INSTANCE_TYPE.to_string(),
        },
        custom_endpoint: CustomEndpoint {
            domain_name: config.search_endpoint_domain.clone(),
            certificate: config.search_certificate.clone(),
        },
        access_policies: vec![ip_restricted],
    }
}
