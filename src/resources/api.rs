//! API entry point: the WaterColorSite route tree, its deployment stage and
//! the shared access-log group.

use crate::core::config::ResolvedConfig;
use crate::core::error::BuildError;
use crate::core::naming::{ResourceNames, APP_NAME};
use crate::core::types::ResourceName;
use crate::resources::compute::ComputeUnit;
use crate::resources::routing::{
    CorsPolicy, HttpMethod, MethodOptions, RouteNode, RoutingTreeBuilder,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Deployment stage every environment's API is published under.
pub const STAGE_NAME: &str = "prod";

/// Access-log retention.
pub const LOG_RETENTION_DAYS: u32 = 1;

/// One JSON line per request.
pub const ACCESS_LOG_FORMAT: &str = concat!(
    r#"{"requestId":"$context.requestId","#,
    r#""ip":"$context.identity.sourceIp","#,
    r#""requestTime":"$context.requestTime","#,
    r#""httpMethod":"$context.httpMethod","#,
    r#""resourcePath":"$context.resourcePath","#,
    r#""protocol":"$context.protocol","#,
    r#""status":"$context.status","#,
    r#""responseLength":"$context.responseLength","#,
    r#""latency":"$context.responseLatency"}"#,
);

/// Access-log destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LogGroup {
    pub name: ResourceName,
    /// Physical log group path
    pub log_group_name: String,
    pub retention_days: u32,
}

pub fn build_log_group(names: &ResourceNames) -> LogGroup {
    LogGroup {
        name: names.log_group.clone(),
        log_group_name: names.log_group_path(),
        retention_days: LOG_RETENTION_DAYS,
    }
}

/// Execution logging level for every method of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoggingLevel {
    Off,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccessLogSettings {
    /// Log group resource id
    pub destination: ResourceName,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StageOptions {
    pub stage_name: String,
    pub data_trace_enabled: bool,
    pub logging_level: LoggingLevel,
    pub access_log: AccessLogSettings,
}

/// API entry point descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiDescriptor {
    pub name: ResourceName,
    pub display_name: String,
    pub stage: StageOptions,
    /// Route tree; every method integrates with the same compute unit
    pub root: RouteNode,
}

/// CORS policy for the routes the static site calls cross-origin.
pub fn site_cors(site_origin: &str) -> CorsPolicy {
    CorsPolicy {
        allow_origins: vec![site_origin.to_string()],
        allow_methods: vec![HttpMethod::Post, HttpMethod::Get, HttpMethod::Patch],
        allow_headers: vec!["Content-Type".to_string()],
        allow_credentials: true,
    }
}

/// The WaterColorSite route tree, bound to `target`.
///
/// Only painting creation (`POST /wcs`) and image update
/// (`PATCH /wcs/{id}/{timestamp}/images`) are called cross-origin, so only
/// those two nodes carry a preflight.
pub fn watercolor_routes(target: ResourceName, site_origin: &str) -> Result<RouteNode, BuildError> {
    use HttpMethod::{Get, Patch, Post};

    let cors = site_cors(site_origin);
    let mut b = RoutingTreeBuilder::new(target);
    let root = b.root();

    let wcs = b.add_resource(root, "wcs")?;
    b.add_method(wcs, Get, MethodOptions::default())?;
    b.add_method(wcs, Post, MethodOptions::cross_origin().with_cors(cors.clone()))?;

    let id = b.add_resource(wcs, "{id}")?;
    b.add_method(id, Get, MethodOptions::default())?;

    let timestamp = b.add_resource(id, "{timestamp}")?;
    b.add_method(timestamp, Get, MethodOptions::default())?;

    let images = b.add_resource(timestamp, "images")?;
    b.add_method(images, Patch, MethodOptions::cross_origin().with_cors(cors))?;

    let get_user = b.add_resource(root, "getUser")?;
    b.add_method(get_user, Get, MethodOptions::default())?;

    let twitter = b.add_resource(root, "twitter")?;
    let signin = b.add_resource(twitter, "signin")?;
    b.add_method(signin, Get, MethodOptions::default())?;
    let callback = b.add_resource(twitter, "callback")?;
    b.add_method(
        callback,
        Get,
        MethodOptions::default().optional_query(&["oauth_token", "oauth_verifier", "denied"]),
    )?;

    let equipments = b.add_resource(root, "equipments")?;
    b.add_method(
        equipments,
        Get,
        MethodOptions::default().optional_query(&["cat", "q"]),
    )?;

    b.build()
}

/// Describe the API entry point.
pub fn build(
    names: &ResourceNames,
    config: &ResolvedConfig,
    compute: &ComputeUnit,
    log_group: &LogGroup,
) -> Result<ApiDescriptor, BuildError> {
    let root = watercolor_routes(compute.name.clone(), &config.site_origin)?;
    Ok(ApiDescriptor {
        name: names.api.clone(),
        display_name: format!("{} API", APP_NAME),
        stage: StageOptions {
            stage_name: STAGE_NAME.to_string(),
            data_trace_enabled: true,
            logging_level: LoggingLevel::Info,
            access_log: AccessLogSettings {
                destination: log_group.name.clone(),
                format: ACCESS_LOG_FORMAT.to_string(),
            },
        },
        root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::resolved;
    use crate::resources::compute;
    use crate::resources::routing::{Integration, RouteOutcome};
    use pretty_assertions::assert_eq;

    fn api(env: &str) -> ApiDescriptor {
        let (_dir, cfg) = resolved(env);
        let names = ResourceNames::resolve(&cfg.prefix, &cfg.environment).unwrap();
        let unit = compute::build(&names, &cfg);
        let log = build_log_group(&names);
        build(&names, &cfg, &unit, &log).unwrap()
    }

    #[test]
    fn test_route_table() {
        let a = api("staging");
        let table: Vec<(String, Vec<HttpMethod>)> = a
            .root
            .route_table()
            .into_iter()
            .map(|(p, m)| (p.to_string(), m))
            .collect();
        use HttpMethod::*;
        assert_eq!(
            table,
            vec![
                ("/wcs".to_string(), vec![Get, Options, Post]),
                ("/wcs/{id}".to_string(), vec![Get]),
                ("/wcs/{id}/{timestamp}".to_string(), vec![Get]),
                ("/wcs/{id}/{timestamp}/images".to_string(), vec![Options, Patch]),
                ("/getUser".to_string(), vec![Get]),
                ("/twitter/signin".to_string(), vec![Get]),
                ("/twitter/callback".to_string(), vec![Get]),
                ("/equipments".to_string(), vec![Get]),
            ]
        );
    }

    #[test]
    fn test_every_method_targets_the_compute_unit() {
        let a = api("staging");
        for node in a.root.walk() {
            for binding in node.methods.values() {
                match &binding.integration {
                    Integration::Compute { target } => assert_eq!(target, &"wcs-staging"),
                    Integration::CorsPreflight => assert!(node.cors.is_some()),
                }
            }
        }
    }

    #[test]
    fn test_only_cross_origin_nodes_have_cors() {
        let a = api("staging");
        let with_cors: Vec<_> = a
            .root
            .walk()
            .into_iter()
            .filter(|n| n.cors.is_some())
            .map(|n| n.path.as_str())
            .collect();
        assert_eq!(with_cors, vec!["/wcs", "/wcs/{id}/{timestamp}/images"]);
        assert_eq!(
            a.root.find("/wcs").unwrap().cors,
            Some(site_cors("https://watercolor.site"))
        );
    }

    #[test]
    fn test_patch_and_options_on_images() {
        let a = api("staging");
        let path = "/wcs/42/2024-01-01T00:00:00/images";
        match a.root.resolve(HttpMethod::Patch, path) {
            RouteOutcome::Integration {
                target,
                path_parameters,
            } => {
                assert_eq!(target, "wcs-staging");
                assert_eq!(path_parameters["id"], "42");
                assert_eq!(path_parameters["timestamp"], "2024-01-01T00:00:00");
            }
            other => panic!("expected integration, got {other:?}"),
        }
        match a.root.resolve(HttpMethod::Options, path) {
            RouteOutcome::Preflight(resp) => assert_eq!(resp.status, 204),
            other => panic!("expected preflight, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_query_parameters() {
        let a = api("staging");
        let callback = a.root.find("/twitter/callback").unwrap();
        let params = &callback.methods[&HttpMethod::Get].query_parameters;
        assert_eq!(
            params.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["oauth_token", "oauth_verifier", "denied"]
        );
        assert!(params.values().all(|required| !required));
        let equipments = a.root.find("/equipments").unwrap();
        assert_eq!(equipments.methods[&HttpMethod::Get].query_parameters.len(), 2);
    }

    #[test]
    fn test_stage_and_logging() {
        let a = api("staging");
        assert_eq!(a.name, "wcs-api-staging");
        assert_eq!(a.display_name, "WaterColorSite API");
        assert_eq!(a.stage.stage_name, "prod");
        assert!(a.stage.data_trace_enabled);
        assert_eq!(a.stage.logging_level, LoggingLevel::Info);
        assert_eq!(a.stage.access_log.destination, "wcs-api-log-staging");
        for field in ["httpMethod", "resourcePath", "status", "latency"] {
            assert!(a.stage.access_log.format.contains(field), "missing {field}");
        }
    }

    #[test]
    fn test_access_log_format_is_json() {
        let sample = ACCESS_LOG_FORMAT.replace('$', "");
        let parsed: serde_json::Value = serde_json::from_str(&sample).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), 9);
    }

    #[test]
    fn test_log_group() {
        let (_dir, cfg) = resolved("prod");
        let names = ResourceNames::resolve(&cfg.prefix, &cfg.environment).unwrap();
        let log = build_log_group(&names);
        assert_eq!(log.log_group_name, "/aws/apigateway/wcs-api-log-prod");
        assert_eq!(log.retention_days, 1);
    }
}
