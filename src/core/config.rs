//! Stack configuration: parsing `wcs.yaml` and resolving it, together with the
//! environment token, into the validated input of one build.
//!
//! Every field has a default, so an absent file yields the stock
//! WaterColorSite configuration. Validation collects every problem at once;
//! resolution turns any problem into `InvalidConfiguration`.

use super::error::BuildError;
use super::hasher;
use super::types::{CertificateRef, EnvironmentClass, EnvironmentToken};
use crate::resources::compute::CodeAsset;
use crate::resources::edge::ViewerCertificate;
use crate::resources::permissions::AccountScope;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Region CloudFront requires viewer certificates to live in.
pub const DISTRIBUTION_CERT_REGION: &str = "us-east-1";

static PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("static regex"));
static REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d$").expect("static regex"));
static ACCOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{12}$").expect("static regex"));
static ACM_ARN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws:acm:([a-z]{2}(?:-[a-z]+)+-\d):(\d{12}):certificate/[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("static regex")
});
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]([a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}$").expect("static regex")
});

// ============================================================================
// wcs.yaml
// ============================================================================

/// Root configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Schema version (must be "1.0")
    #[serde(default = "default_version")]
    pub version: String,

    /// Name prefix shared by every resource
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Deployment region
    #[serde(default = "default_region")]
    pub region: String,

    /// Deployment account id
    #[serde(default = "default_account")]
    pub account_id: String,

    /// Directory holding the packaged compute artifact
    #[serde(default = "default_code_asset")]
    pub code_asset: PathBuf,

    /// Compute runtime identifier
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Entry symbol inside the packaged artifact
    #[serde(default = "default_handler")]
    pub handler: String,

    /// Origin of the static site allowed to call the API cross-origin
    #[serde(default = "default_site_origin")]
    pub site_origin: String,

    /// Custom image domain served by the production distribution
    #[serde(default = "default_image_domain")]
    pub image_domain: String,

    /// Search cluster settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Externally managed certificates
    #[serde(default)]
    pub certificates: CertificateConfig,
}

/// Search cluster settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Custom endpoint domain
    #[serde(default = "default_search_domain")]
    pub endpoint_domain: String,

    /// Source addresses (IP or CIDR) allowed to reach the cluster directly
    #[serde(default = "default_allowed_ips")]
    pub allowed_source_ips: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint_domain: default_search_domain(),
            allowed_source_ips: default_allowed_ips(),
        }
    }
}

/// Certificate ARNs, resolved outside this tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// Certificate for the search cluster's custom endpoint (deployment region)
    #[serde(default = "default_search_cert")]
    pub search: String,

    /// Certificate for the distribution's custom domain (us-east-1)
    #[serde(default = "default_distribution_cert")]
    pub distribution: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            search: default_search_cert(),
            distribution: default_distribution_cert(),
        }
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            prefix: default_prefix(),
            region: default_region(),
            account_id: default_account(),
            code_asset: default_code_asset(),
            runtime: default_runtime(),
            handler: default_handler(),
            site_origin: default_site_origin(),
            image_domain: default_image_domain(),
            search: SearchConfig::default(),
            certificates: CertificateConfig::default(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_prefix() -> String {
    "wcs".to_string()
}

fn default_region() -> String {
    "ap-northeast-1".to_string()
}

fn default_account() -> String {
    "000000000000".to_string()
}

fn default_code_asset() -> PathBuf {
    PathBuf::from("../lambda-go/bin")
}

fn default_runtime() -> String {
    "go1.x".to_string()
}

fn default_handler() -> String {
    "main".to_string()
}

fn default_site_origin() -> String {
    "https://watercolor.site".to_string()
}

fn default_image_domain() -> String {
    "img.watercolor.site".to_string()
}

fn default_search_domain() -> String {
    "es.watercolor.site".to_string()
}

fn default_allowed_ips() -> Vec<String> {
    vec!["203.0.113.10".to_string()]
}

fn default_search_cert() -> String {
    "arn:aws:acm:ap-northeast-1:000000000000:certificate/00000000-0000-0000-0000-000000000000"
        .to_string()
}

fn default_distribution_cert() -> String {
    "arn:aws:acm:us-east-1:000000000000:certificate/00000000-0000-0000-0000-000000000000"
        .to_string()
}

/// Template written by `wcs-infra init`.
pub const SAMPLE_CONFIG: &str = r#"version: "1.0"
prefix: wcs
region: ap-northeast-1
account_id: "000000000000"
code_asset: ../lambda-go/bin
runtime: go1.x
handler: main
site_origin: https://watercolor.site
image_domain: img.watercolor.site

search:
  endpoint_domain: es.watercolor.site
  allowed_source_ips:
    - 203.0.113.10

certificates:
  search: arn:aws:acm:ap-northeast-1:000000000000:certificate/00000000-0000-0000-0000-000000000000
  distribution: arn:aws:acm:us-east-1:000000000000:certificate/00000000-0000-0000-0000-000000000000
"#;

// ============================================================================
// Parsing
// ============================================================================

/// Parse a config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<StackConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Parse a config file from disk.
pub fn parse_config_file(path: &Path) -> Result<StackConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a config file, or fall back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<StackConfig, String> {
    if path.exists() {
        parse_config_file(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(StackConfig::default())
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn push(errors: &mut Vec<ValidationError>, message: String) {
    errors.push(ValidationError { message });
}

/// Region embedded in an ACM certificate ARN, if the ARN is well formed.
pub fn certificate_region(arn: &str) -> Option<&str> {
    ACM_ARN_RE
        .captures(arn)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn valid_source_ip(entry: &str) -> bool {
    match entry.split_once('/') {
        Some((addr, bits)) => match (addr.parse::<IpAddr>(), bits.parse::<u8>()) {
            (Ok(IpAddr::V4(_)), Ok(b)) => b <= 32,
            (Ok(IpAddr::V6(_)), Ok(b)) => b <= 128,
            _ => false,
        },
        None => entry.parse::<IpAddr>().is_ok(),
    }
}

/// Validate a config for one environment. `base_dir` anchors a relative
/// `code_asset`. Returns every problem found (empty = valid).
pub fn validate_config(
    config: &StackConfig,
    environment: &str,
    base_dir: &Path,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if environment.trim().is_empty() {
        push(
            &mut errors,
            "environment token must not be empty (set --env or SYSTEM_ENV)".to_string(),
        );
    }

    if config.version != "1.0" {
        push(
            &mut errors,
            format!("version must be \"1.0\", got \"{}\"", config.version),
        );
    }

    if !PREFIX_RE.is_match(&config.prefix) {
        push(
            &mut errors,
            format!(
                "prefix '{}' must be lowercase alphanumerics and hyphens",
                config.prefix
            ),
        );
    }

    if !REGION_RE.is_match(&config.region) {
        push(&mut errors, format!("region '{}' is not a valid region", config.region));
    }

    if !ACCOUNT_RE.is_match(&config.account_id) {
        push(
            &mut errors,
            format!("account_id '{}' must be 12 digits", config.account_id),
        );
    }

    if config.runtime.is_empty() {
        push(&mut errors, "runtime must not be empty".to_string());
    }
    if config.handler.is_empty() {
        push(&mut errors, "handler must not be empty".to_string());
    }

    match config.site_origin.strip_prefix("https://") {
        Some(host) if DOMAIN_RE.is_match(host) => {}
        _ => push(
            &mut errors,
            format!(
                "site_origin '{}' must be an https origin without a path",
                config.site_origin
            ),
        ),
    }

    for (field, domain) in [
        ("image_domain", &config.image_domain),
        ("search.endpoint_domain", &config.search.endpoint_domain),
    ] {
        if !DOMAIN_RE.is_match(domain) {
            push(&mut errors, format!("{} '{}' is not a domain name", field, domain));
        }
    }

    if config.search.allowed_source_ips.is_empty() {
        push(
            &mut errors,
            "search.allowed_source_ips must list at least one address".to_string(),
        );
    }
    for ip in &config.search.allowed_source_ips {
        if !valid_source_ip(ip) {
            push(
                &mut errors,
                format!("search.allowed_source_ips entry '{}' is not an IP or CIDR", ip),
            );
        }
    }

    if certificate_region(&config.certificates.search).is_none() {
        push(
            &mut errors,
            format!(
                "certificates.search '{}' is not an ACM certificate ARN",
                config.certificates.search
            ),
        );
    }

    // The distribution certificate is only referenced in production.
    if environment == super::types::PRODUCTION_TOKEN {
        match certificate_region(&config.certificates.distribution) {
            None => push(
                &mut errors,
                format!(
                    "certificates.distribution '{}' is not an ACM certificate ARN",
                    config.certificates.distribution
                ),
            ),
            Some(region) if region != DISTRIBUTION_CERT_REGION => push(
                &mut errors,
                format!(
                    "certificates.distribution must live in {}, found {}",
                    DISTRIBUTION_CERT_REGION, region
                ),
            ),
            Some(_) => {}
        }
    }

    let code_dir = base_dir.join(&config.code_asset);
    if !code_dir.is_dir() {
        push(
            &mut errors,
            format!(
                "code_asset {} is not a directory (build the compute artifact first)",
                code_dir.display()
            ),
        );
    }

    errors
}

// ============================================================================
// Resolution
// ============================================================================

/// Validated, immutable input of one build.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub environment: EnvironmentToken,
    pub class: EnvironmentClass,
    pub prefix: String,
    pub region: String,
    pub account_id: String,
    pub code: CodeAsset,
    pub runtime: String,
    pub handler: String,
    pub site_origin: String,
    pub search_endpoint_domain: String,
    pub search_certificate: CertificateRef,
    pub allowed_source_ips: Vec<String>,
    /// Distribution certificate shape, decided once from the environment class
    pub viewer_certificate: ViewerCertificate,
}

impl ResolvedConfig {
    /// Region/account pair for ARN derivation.
    pub fn scope(&self) -> AccountScope {
        AccountScope {
            region: self.region.clone(),
            account_id: self.account_id.clone(),
        }
    }
}

impl StackConfig {
    /// Resolve this config for one environment.
    ///
    /// Fails with `InvalidConfiguration` before anything is built if the
    /// token is empty or any external reference cannot be resolved.
    pub fn resolve(&self, environment: &str, base_dir: &Path) -> Result<ResolvedConfig, BuildError> {
        let errors = validate_config(self, environment, base_dir);
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BuildError::InvalidConfiguration(joined));
        }

        let environment = EnvironmentToken::new(environment)?;
        let class = environment.class();

        let code_dir = base_dir.join(&self.code_asset);
        let asset_hash = hasher::hash_directory(&code_dir).map_err(BuildError::InvalidConfiguration)?;
        let code = CodeAsset {
            path: self.code_asset.to_string_lossy().replace('\\', "/"),
            asset_hash,
        };

        let viewer_certificate = match class {
            EnvironmentClass::Production => ViewerCertificate::Custom {
                aliases: vec![self.image_domain.clone()],
                certificate: CertificateRef::new(&self.certificates.distribution),
            },
            EnvironmentClass::NonProduction => ViewerCertificate::Default,
        };

        tracing::debug!(%environment, %class, code = %code.path, "configuration resolved");

        Ok(ResolvedConfig {
            environment,
            class,
            prefix: self.prefix.clone(),
            region: self.region.clone(),
            account_id: self.account_id.clone(),
            code,
            runtime: self.runtime.clone(),
            handler: self.handler.clone(),
            site_origin: self.site_origin.clone(),
            search_endpoint_domain: self.search.endpoint_domain.clone(),
            search_certificate: CertificateRef::new(&self.certificates.search),
            allowed_source_ips: self.search.allowed_source_ips.clone(),
            viewer_certificate,
        })
    }
}
