//! Compute unit: the single packaged backend executable every route invokes.
//!
//! The unit dispatches internally by method and path; this crate only
//! describes where its code lives and which environment it runs with.

use crate::core::config::ResolvedConfig;
use crate::core::naming::ResourceNames;
use crate::core::types::ResourceName;
use crate::resources::permissions::AccountScope;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Environment variable carrying the object store name.
pub const BUCKET_NAME_VAR: &str = "BUCKET_NAME";

/// Packaged code reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CodeAsset {
    /// Directory of the packaged artifact, as configured
    pub path: String,
    /// BLAKE3 digest of the directory contents
    pub asset_hash: String,
}

/// Compute unit descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ComputeUnit {
    pub name: ResourceName,
    pub runtime: String,
    /// Entry symbol invoked with the request envelope
    pub handler: String,
    pub code: CodeAsset,
    pub environment: IndexMap<String, String>,
}

impl ComputeUnit {
    pub fn arn(&self, scope: &AccountScope) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{}",
            scope.region, scope.account_id, self.name
        )
    }
}

/// Describe the compute unit. Its only configuration input from other
/// resources is the object store *name*, which is known before any
/// descriptor is built.
pub fn build(names: &ResourceNames, config: &ResolvedConfig) -> ComputeUnit {
    let environment = IndexMap::from([(
        BUCKET_NAME_VAR.to_string(),
        names.object_store.to_string(),
    )]);

    ComputeUnit {
        name: names.compute_unit.clone(),
        runtime: config.runtime.clone(),
        handler: config.handler.clone(),
        code: config.code.clone(),
        environment,
    }
}
