//! Edge distribution: the private object store, the access identity that
//! bridges it to the distribution, the bucket policy granting that identity
//! read access, and the distribution itself.

use crate::core::config::ResolvedConfig;
use crate::core::naming::ResourceNames;
use crate::core::types::{CertificateRef, ResourceName};
use crate::resources::permissions::{Conditions, Effect, PolicyStatement, Principal};
use crate::resources::routing::HttpMethod;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One day, in seconds.
const DAY: u64 = 86_400;

const OBJECT_READ_ACTION: &str = "s3:GetObject";

// ============================================================================
// Object store
// ============================================================================

/// Bucket CORS rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BucketCorsRule {
    pub allowed_methods: Vec<HttpMethod>,
    pub allowed_origins: Vec<String>,
}

/// Object store descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectStore {
    pub name: ResourceName,
    pub versioned: bool,
    pub cors_rules: Vec<BucketCorsRule>,
    /// Objects are readable only through the bucket policy
    pub block_public_access: bool,
}

impl ObjectStore {
    pub fn arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.name)
    }

    /// ARN pattern covering every object in the store.
    pub fn objects_arn(&self) -> String {
        format!("{}/*", self.arn())
    }

    pub fn regional_domain_name(&self, region: &str) -> String {
        format!("{}.s3.{}.amazonaws.com", self.name, region)
    }
}

pub fn build_object_store(names: &ResourceNames) -> ObjectStore {
    ObjectStore {
        name: names.object_store.clone(),
        versioned: true,
        cors_rules: vec![BucketCorsRule {
            allowed_methods: vec![HttpMethod::Post],
            allowed_origins: vec!["*".to_string()],
        }],
        block_public_access: true,
    }
}

// ============================================================================
// Access identity + bucket policy
// ============================================================================

/// Identity the distribution reads the store as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccessIdentity {
    pub name: ResourceName,
    pub comment: String,
}

pub fn build_access_identity(names: &ResourceNames) -> AccessIdentity {
    AccessIdentity {
        name: names.access_identity.clone(),
        comment: format!("identity for {}", names.distribution),
    }
}

/// Resource policy attached to the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BucketPolicy {
    pub name: ResourceName,
    pub bucket: ResourceName,
    pub statements: Vec<PolicyStatement>,
}

impl BucketPolicy {
    /// Whether `principal` may read objects from the bucket. Anything not
    /// explicitly allowed is denied.
    pub fn allows_read(&self, principal: &Principal, object_key: &str) -> bool {
        let resource = format!("arn:aws:s3:::{}/{}", self.bucket, object_key);
        self.statements
            .iter()
            .any(|s| s.allows(principal, OBJECT_READ_ACTION, &resource))
    }
}

/// Read access for the access identity, and nobody else.
pub fn build_bucket_policy(
    names: &ResourceNames,
    store: &ObjectStore,
    identity: &AccessIdentity,
) -> BucketPolicy {
    BucketPolicy {
        name: names.bucket_policy.clone(),
        bucket: store.name.clone(),
        statements: vec![PolicyStatement {
            effect: Effect::Allow,
            principal: Principal::CanonicalUser {
                access_identity: identity.name.clone(),
            },
            actions: vec![OBJECT_READ_ACTION.to_string()],
            resources: vec![store.objects_arn()],
            conditions: Conditions::new(),
        }],
    }
}

// ============================================================================
// Distribution
// ============================================================================

/// Edge location coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PriceClass {
    #[serde(rename = "PriceClass_100")]
    PriceClass100,
    #[serde(rename = "PriceClass_200")]
    PriceClass200,
    #[serde(rename = "PriceClass_All")]
    PriceClassAll,
}

/// Origin backed by the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct S3Origin {
    pub bucket: ResourceName,
    pub domain_name: String,
    pub access_identity: ResourceName,
}

/// Cache behavior; TTLs are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheBehavior {
    pub path_pattern: String,
    pub min_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    pub default_ttl_seconds: u64,
}

/// Origin error → static page rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub error_code: u16,
    pub response_page_path: String,
    pub response_code: u16,
    pub error_caching_min_ttl_seconds: u64,
}

/// Viewer certificate, decided once from the environment class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerCertificate {
    /// The distribution's own domain and certificate
    Default,
    /// Custom domain aliases served with an external certificate
    Custom {
        aliases: Vec<String>,
        certificate: CertificateRef,
    },
}

/// What a viewer receives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerResponse {
    pub status: u16,
    pub path: String,
}

/// Distribution descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Distribution {
    pub name: ResourceName,
    pub origin: S3Origin,
    pub price_class: PriceClass,
    pub default_behavior: CacheBehavior,
    pub error_responses: Vec<ErrorResponse>,
    pub viewer_certificate: ViewerCertificate,
}

impl Distribution {
    pub fn aliases(&self) -> &[String] {
        match &self.viewer_certificate {
            ViewerCertificate::Custom { aliases, .. } => aliases,
            ViewerCertificate::Default => &[],
        }
    }

    /// Apply the error mappings to an origin response for `path`.
    pub fn viewer_response(&self, origin_status: u16, path: &str) -> ViewerResponse {
        match self
            .error_responses
            .iter()
            .find(|e| e.error_code == origin_status)
        {
            Some(mapping) => ViewerResponse {
                status: mapping.response_code,
                path: mapping.response_page_path.clone(),
            },
            None => ViewerResponse {
                status: origin_status,
                path: path.to_string(),
            },
        }
    }
}

fn placeholder_image(code: u16) -> ErrorResponse {
    ErrorResponse {
        error_code: code,
        response_page_path: format!("/{}.png", code),
        response_code: 200,
        error_caching_min_ttl_seconds: 0,
    }
}

pub fn build_distribution(
    names: &ResourceNames,
    config: &ResolvedConfig,
    store: &ObjectStore,
    identity: &AccessIdentity,
) -> Distribution {
    Distribution {
        name: names.distribution.clone(),
        origin: S3Origin {
            bucket: store.name.clone(),
            domain_name: store.regional_domain_name(&config.region),
            access_identity: identity.name.clone(),
        },
        price_class: PriceClass::PriceClass200,
        default_behavior: CacheBehavior {
            path_pattern: "*".to_string(),
            min_ttl_seconds: 0,
            max_ttl_seconds: 365 * DAY,
            default_ttl_seconds: DAY,
        },
        error_responses: vec![placeholder_image(403), placeholder_image(404)],
        viewer_certificate: config.viewer_certificate.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::resolved;
    use pretty_assertions::assert_eq;

    fn edge(env: &str) -> (ObjectStore, AccessIdentity, BucketPolicy, Distribution) {
        let (_dir, cfg) = resolved(env);
        let names = ResourceNames::resolve(&cfg.prefix, &cfg.environment).unwrap();
        let store = build_object_store(&names);
        let oai = build_access_identity(&names);
        let policy = build_bucket_policy(&names, &store, &oai);
        let dist = build_distribution(&names, &cfg, &store, &oai);
        (store, oai, policy, dist)
    }

    #[test]
    fn test_object_store() {
        let (store, ..) = edge("staging");
        assert_eq!(store.name, "wcs-bucket-staging");
        assert!(store.versioned);
        assert!(store.block_public_access);
        assert_eq!(
            store.cors_rules,
            vec![BucketCorsRule {
                allowed_methods: vec![HttpMethod::Post],
                allowed_origins: vec!["*".to_string()],
            }]
        );
        assert_eq!(store.arn(), "arn:aws:s3:::wcs-bucket-staging");
        assert_eq!(
            store.regional_domain_name("ap-northeast-1"),
            "wcs-bucket-staging.s3.ap-northeast-1.amazonaws.com"
        );
    }

    #[test]
    fn test_only_access_identity_reads() {
        let (_, oai, policy, _) = edge("staging");
        assert_eq!(policy.name, "wcs-bucket-policy-staging");
        let bridge = Principal::CanonicalUser {
            access_identity: oai.name.clone(),
        };
        assert!(policy.allows_read(&bridge, "paintings/1.png"));
        assert!(!policy.allows_read(&Principal::Any, "paintings/1.png"));
        let role = Principal::ExecutionRole {
            compute_unit: ResourceName::new("wcs-staging"),
        };
        assert!(!policy.allows_read(&role, "paintings/1.png"));
    }

    #[test]
    fn test_distribution_shape() {
        let (_, oai, _, dist) = edge("staging");
        assert_eq!(dist.name, "wcs-distribution-staging");
        assert_eq!(dist.origin.access_identity, oai.name);
        assert_eq!(dist.price_class, PriceClass::PriceClass200);
        assert_eq!(dist.default_behavior.path_pattern, "*");
        assert_eq!(dist.default_behavior.min_ttl_seconds, 0);
        assert_eq!(dist.default_behavior.max_ttl_seconds, 31_536_000);
        assert_eq!(dist.default_behavior.default_ttl_seconds, 86_400);
        assert_eq!(dist.error_responses.len(), 2);
        assert_eq!(
            serde_json::to_value(dist.price_class).unwrap(),
            "PriceClass_200"
        );
    }

    #[test]
    fn test_staging_has_no_alias() {
        let (.., dist) = edge("staging");
        assert_eq!(dist.viewer_certificate, ViewerCertificate::Default);
        assert!(dist.aliases().is_empty());
    }

    #[test]
    fn test_prod_has_alias_and_certificate() {
        let (.., dist) = edge("prod");
        assert_eq!(dist.aliases(), ["img.watercolor.site".to_string()]);
        assert!(matches!(
            dist.viewer_certificate,
            ViewerCertificate::Custom { ref certificate, .. }
                if certificate.as_str().starts_with("arn:aws:acm:us-east-1:")
        ));
    }

    #[test]
    fn test_error_mapping_serves_placeholder() {
        let (.., dist) = edge("staging");
        assert_eq!(
            dist.viewer_response(404, "/missing.png"),
            ViewerResponse {
                status: 200,
                path: "/404.png".to_string()
            }
        );
        assert_eq!(dist.viewer_response(403, "/private.png").path, "/403.png");
        assert_eq!(
            dist.viewer_response(200, "/a.png"),
            ViewerResponse {
                status: 200,
                path: "/a.png".to_string()
            }
        );
        assert_eq!(dist.viewer_response(500, "/a.png").status, 500);
    }

    #[test]
    fn test_viewer_certificate_serialization() {
        let json = serde_json::to_value(ViewerCertificate::Default).unwrap();
        assert_eq!(json["type"], "default");
    }
}
