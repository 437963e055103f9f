//! Routing tree builder.
//!
//! Routes are declared on an arena of nodes addressed by [`NodeId`], then
//! frozen into a nested [`RouteNode`] tree. Every method binds to the one
//! compute unit the builder was created for.
//!
//! CORS is registered per node. A node that needs a preflight declares it
//! explicitly; children never inherit it. Registering two different CORS
//! policies on one node fails with `ConflictingCorsPolicy` at build time.

use crate::core::error::BuildError;
use crate::core::types::ResourceName;
use indexmap::IndexMap;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("static regex"));
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([A-Za-z_][A-Za-z0-9_]*)\}$").expect("static regex"));

/// Status code of a CORS preflight response.
pub const PREFLIGHT_STATUS: u16 = 204;

// ============================================================================
// Methods and CORS
// ============================================================================

/// HTTP method.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    pub fn is_state_changing(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("unknown HTTP method '{}'", other)),
        }
    }
}

/// CORS rules answered by a node's preflight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<HttpMethod>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl CorsPolicy {
    pub fn allows_method(&self, method: HttpMethod) -> bool {
        self.allow_methods.contains(&method)
    }

    /// Response served for OPTIONS on a node carrying this policy.
    pub fn preflight_response(&self) -> PreflightResponse {
        let origin = self
            .allow_origins
            .first()
            .map(String::as_str)
            .unwrap_or("*");

        let mut headers = IndexMap::new();
        headers.insert(
            "Access-Control-Allow-Headers".to_string(),
            self.allow_headers.join(","),
        );
        headers.insert("Access-Control-Allow-Origin".to_string(), origin.to_string());
        if origin != "*" {
            headers.insert("Vary".to_string(), "Origin".to_string());
        }
        headers.insert(
            "Access-Control-Allow-Methods".to_string(),
            self.allow_methods
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(","),
        );
        if self.allow_credentials {
            headers.insert(
                "Access-Control-Allow-Credentials".to_string(),
                "true".to_string(),
            );
        }

        PreflightResponse {
            status: PREFLIGHT_STATUS,
            headers,
        }
    }
}

impl fmt::Display for CorsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<_> = self.allow_methods.iter().map(|m| m.as_str()).collect();
        write!(
            f,
            "origins=[{}] methods=[{}] headers=[{}] credentials={}",
            self.allow_origins.join(","),
            methods.join(","),
            self.allow_headers.join(","),
            self.allow_credentials
        )
    }
}

/// Preflight response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PreflightResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
}

// ============================================================================
// Route tree
// ============================================================================

/// What a method invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Integration {
    /// Proxy the request envelope to the compute unit
    Compute { target: ResourceName },
    /// Answer from the node's CORS policy without invoking anything
    CorsPreflight,
}

/// One method registered on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MethodBinding {
    pub integration: Integration,
    /// Declared query parameters → required?
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub query_parameters: IndexMap<String, bool>,
}

/// A frozen route node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RouteNode {
    /// Segment of this node (`""` for the root, `{id}` for placeholders)
    pub path_part: String,
    /// Full template path (`/wcs/{id}`)
    pub path: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub methods: IndexMap<HttpMethod, MethodBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RouteNode>,
}

/// Result of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Integration {
        target: ResourceName,
        path_parameters: IndexMap<String, String>,
    },
    Preflight(PreflightResponse),
    MethodNotAllowed {
        allowed: Vec<HttpMethod>,
    },
    NotFound,
}

impl RouteNode {
    pub fn is_placeholder(&self) -> bool {
        PLACEHOLDER_RE.is_match(&self.path_part)
    }

    fn placeholder_name(&self) -> Option<&str> {
        PLACEHOLDER_RE
            .captures(&self.path_part)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Nodes in pre-order.
    pub fn walk(&self) -> Vec<&RouteNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    /// Node with the given template path.
    pub fn find(&self, path: &str) -> Option<&RouteNode> {
        self.walk().into_iter().find(|n| n.path == path)
    }

    /// (template path, methods) for every node with at least one method.
    pub fn route_table(&self) -> Vec<(&str, Vec<HttpMethod>)> {
        self.walk()
            .into_iter()
            .filter(|n| !n.methods.is_empty())
            .map(|n| (n.path.as_str(), n.methods.keys().copied().collect()))
            .collect()
    }

    /// Route a request. Literal segments take precedence over placeholders;
    /// a query string, if present, is ignored.
    pub fn resolve(&self, method: HttpMethod, request_path: &str) -> RouteOutcome {
        let path = request_path.split('?').next().unwrap_or_default();
        let mut node = self;
        let mut path_parameters = IndexMap::new();

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let literal = node
                .children
                .iter()
                .find(|c| !c.is_placeholder() && c.path_part == segment);
            node = match literal {
                Some(child) => child,
                None => match node.children.iter().find(|c| c.is_placeholder()) {
                    Some(child) => {
                        if let Some(name) = child.placeholder_name() {
                            path_parameters.insert(name.to_string(), segment.to_string());
                        }
                        child
                    }
                    None => return RouteOutcome::NotFound,
                },
            };
        }

        match node.methods.get(&method).map(|b| &b.integration) {
            Some(Integration::Compute { target }) => RouteOutcome::Integration {
                target: target.clone(),
                path_parameters,
            },
            Some(Integration::CorsPreflight) => match &node.cors {
                Some(policy) => RouteOutcome::Preflight(policy.preflight_response()),
                None => RouteOutcome::NotFound,
            },
            None if node.methods.is_empty() => RouteOutcome::NotFound,
            None => RouteOutcome::MethodNotAllowed {
                allowed: node.methods.keys().copied().collect(),
            },
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Handle to a node inside a [`RoutingTreeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

/// Per-method registration options.
#[derive(Debug, Clone, Default)]
pub struct MethodOptions {
    cors: Option<CorsPolicy>,
    cross_origin: bool,
    query_parameters: Vec<(String, bool)>,
}

impl MethodOptions {
    /// Mark the method as called from another origin; the node must then
    /// carry a CORS policy that allows it.
    pub fn cross_origin() -> Self {
        Self {
            cross_origin: true,
            ..Self::default()
        }
    }

    /// Register `policy` on the node together with the method.
    pub fn with_cors(mut self, policy: CorsPolicy) -> Self {
        self.cors = Some(policy);
        self
    }

    /// Declare query parameters that may be absent.
    pub fn optional_query(mut self, names: &[&str]) -> Self {
        self.query_parameters
            .extend(names.iter().map(|n| (n.to_string(), false)));
        self
    }

    pub fn required_query(mut self, name: &str) -> Self {
        self.query_parameters.push((name.to_string(), true));
        self
    }
}

#[derive(Debug)]
struct PendingNode {
    path_part: String,
    path: String,
    methods: IndexMap<HttpMethod, MethodBinding>,
    cors: Option<CorsPolicy>,
    cross_origin: Vec<HttpMethod>,
    children: Vec<usize>,
}

impl PendingNode {
    fn is_placeholder(&self) -> bool {
        PLACEHOLDER_RE.is_match(&self.path_part)
    }
}

/// Arena builder for a route tree bound to one compute unit.
#[derive(Debug)]
pub struct RoutingTreeBuilder {
    target: ResourceName,
    nodes: Vec<PendingNode>,
}

impl RoutingTreeBuilder {
    pub fn new(target: ResourceName) -> Self {
        let root = PendingNode {
            path_part: String::new(),
            path: "/".to_string(),
            methods: IndexMap::new(),
            cors: None,
            cross_origin: Vec::new(),
            children: Vec::new(),
        };
        Self {
            target,
            nodes: vec![root],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> Result<&PendingNode, BuildError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| BuildError::invalid(format!("unknown route node #{}", id.0)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut PendingNode, BuildError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| BuildError::invalid(format!("unknown route node #{}", id.0)))
    }

    /// Add a child segment under `parent`. `{name}` declares a placeholder.
    pub fn add_resource(&mut self, parent: NodeId, path_part: &str) -> Result<NodeId, BuildError> {
        let placeholder = PLACEHOLDER_RE.is_match(path_part);
        if !placeholder && !LITERAL_RE.is_match(path_part) {
            return Err(BuildError::invalid(format!(
                "invalid path segment '{}'",
                path_part
            )));
        }

        let parent_node = self.node(parent)?;
        for &c in &parent_node.children {
            let sibling = &self.nodes[c];
            if sibling.path_part == path_part {
                return Err(BuildError::invalid(format!(
                    "route {} is declared twice",
                    sibling.path
                )));
            }
            if placeholder && sibling.is_placeholder() {
                return Err(BuildError::invalid(format!(
                    "{} already has placeholder child {}",
                    parent_node.path, sibling.path_part
                )));
            }
        }

        let path = if parent_node.path == "/" {
            format!("/{}", path_part)
        } else {
            format!("{}/{}", parent_node.path, path_part)
        };

        let id = self.nodes.len();
        self.nodes.push(PendingNode {
            path_part: path_part.to_string(),
            path,
            methods: IndexMap::new(),
            cors: None,
            cross_origin: Vec::new(),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        Ok(NodeId(id))
    }

    /// Register a CORS preflight (OPTIONS) on `node`. Re-registering the
    /// identical policy is a no-op; a different one is a conflict.
    pub fn add_cors_preflight(&mut self, node: NodeId, policy: CorsPolicy) -> Result<(), BuildError> {
        let n = self.node_mut(node)?;
        if let Some(existing) = &n.cors {
            if *existing != policy {
                return Err(BuildError::ConflictingCorsPolicy {
                    path: n.path.clone(),
                    existing: existing.to_string(),
                    requested: policy.to_string(),
                });
            }
            return Ok(());
        }
        if n.methods.contains_key(&HttpMethod::Options) {
            return Err(BuildError::invalid(format!(
                "OPTIONS on {} is already bound; cannot add a CORS preflight",
                n.path
            )));
        }
        n.cors = Some(policy);
        n.methods.insert(
            HttpMethod::Options,
            MethodBinding {
                integration: Integration::CorsPreflight,
                query_parameters: IndexMap::new(),
            },
        );
        Ok(())
    }

    /// Bind `method` on `node` to the compute unit.
    pub fn add_method(
        &mut self,
        node: NodeId,
        method: HttpMethod,
        options: MethodOptions,
    ) -> Result<(), BuildError> {
        {
            let n = self.node(node)?;
            if method == HttpMethod::Options {
                return Err(BuildError::invalid(format!(
                    "OPTIONS on {} is reserved for the CORS preflight",
                    n.path
                )));
            }
            if n.methods.contains_key(&method) {
                return Err(BuildError::invalid(format!(
                    "{} {} is declared twice",
                    method, n.path
                )));
            }
        }

        if let Some(policy) = options.cors {
            self.add_cors_preflight(node, policy)?;
        }

        let target = self.target.clone();
        let n = self.node_mut(node)?;
        n.methods.insert(
            method,
            MethodBinding {
                integration: Integration::Compute { target },
                query_parameters: options.query_parameters.into_iter().collect(),
            },
        );
        if options.cross_origin {
            n.cross_origin.push(method);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BuildError> {
        for n in self.nodes.iter().skip(1) {
            if n.is_placeholder() && n.methods.is_empty() && n.children.len() != 1 {
                return Err(BuildError::invalid(format!(
                    "placeholder {} needs a method set or exactly one child",
                    n.path
                )));
            }
            if n.methods.is_empty() && n.children.is_empty() {
                return Err(BuildError::invalid(format!(
                    "route {} has neither methods nor children",
                    n.path
                )));
            }
        }

        for n in &self.nodes {
            for &method in &n.cross_origin {
                match &n.cors {
                    None => {
                        return Err(BuildError::invalid(format!(
                            "{} {} is cross-origin but {} has no CORS preflight",
                            method, n.path, n.path
                        )))
                    }
                    Some(policy) if !policy.allows_method(method) => {
                        return Err(BuildError::invalid(format!(
                            "CORS policy on {} does not allow {}",
                            n.path, method
                        )))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn assemble(&self, idx: usize) -> RouteNode {
        let n = &self.nodes[idx];
        RouteNode {
            path_part: n.path_part.clone(),
            path: n.path.clone(),
            methods: n.methods.clone(),
            cors: n.cors.clone(),
            children: n.children.iter().map(|&c| self.assemble(c)).collect(),
        }
    }

    /// Validate and freeze the tree.
    pub fn build(self) -> Result<RouteNode, BuildError> {
        self.validate()?;
        Ok(self.assemble(0))
    }
}
