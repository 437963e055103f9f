//! Build error taxonomy.
//!
//! Every failure is detected during the synchronous build pass and aborts the
//! whole build: no partial stack description is ever emitted.

use super::types::ResourceKind;

/// Fatal error raised while building a stack description.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Missing/empty environment token, or an external reference
    /// (certificate, packaged code) that cannot be resolved.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Two registrations on one route node declare different CORS rules.
    #[error("conflicting CORS policy on {path}: {existing} vs {requested}")]
    ConflictingCorsPolicy {
        path: String,
        existing: String,
        requested: String,
    },

    /// Two resources resolve to the same name within one environment.
    #[error("naming collision: '{name}' is claimed by both {first} and {second}")]
    NamingCollision {
        name: String,
        first: ResourceKind,
        second: ResourceKind,
    },
}

impl BuildError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}
