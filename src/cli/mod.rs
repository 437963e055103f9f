//! CLI subcommands: init, validate, synth, plan, record, routes, resolve,
//! schema, completions.

use crate::core::{config, planner, stack, state, types};
use crate::resources::routing::{HttpMethod, RouteOutcome};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "wcs-infra",
    version,
    about = "WaterColorSite infrastructure: build the environment's resource graph as a stack description"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that builds the stack.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Environment token (prod, staging, ...)
    #[arg(short, long, env = "SYSTEM_ENV")]
    pub env: Option<String>,

    /// Path to wcs.yaml (built-in defaults when absent)
    #[arg(short, long, default_value = "wcs.yaml")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new project (wcs.yaml + state/)
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate wcs.yaml for an environment
    Validate {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Build and print the stack description
    Synth {
        #[command(flatten)]
        stack: StackArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show what changed since the last recorded description
    Plan {
        #[command(flatten)]
        stack: StackArgs,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Record the current description's digests in the lock file
    Record {
        #[command(flatten)]
        stack: StackArgs,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Print the API route table
    Routes {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Route one request through the API tree
    Resolve {
        #[command(flatten)]
        stack: StackArgs,

        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: HttpMethod,

        /// Request path (query string ignored)
        path: String,
    },

    /// Print the JSON Schema of the stack description
    Schema,

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { stack } => cmd_validate(&stack),
        Commands::Synth {
            stack,
            format,
            output,
        } => cmd_synth(&stack, format, output.as_deref()),
        Commands::Plan { stack, state_dir } => cmd_plan(&stack, &state_dir),
        Commands::Record { stack, state_dir } => cmd_record(&stack, &state_dir),
        Commands::Routes { stack } => cmd_routes(&stack),
        Commands::Resolve {
            stack,
            method,
            path,
        } => cmd_resolve(&stack, method, &path),
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

/// Directory a relative `code_asset` is resolved against.
fn base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load the config and build the stack description.
fn build(args: &StackArgs) -> Result<types::StackDescription, String> {
    let cfg = config::load_config(&args.config)?;
    let env = args.env.as_deref().unwrap_or_default();
    stack::synthesize(&cfg, env, &base_dir(&args.config)).map_err(|e| e.to_string())
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("wcs.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    std::fs::write(&config_path, config::SAMPLE_CONFIG)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized WaterColorSite project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(args: &StackArgs) -> Result<(), String> {
    let cfg = config::load_config(&args.config)?;
    let env = args.env.as_deref().unwrap_or_default();
    let errors = config::validate_config(&cfg, env, &base_dir(&args.config));

    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }

    let desc = build(args)?;
    println!(
        "OK: {} ({} resources, {} grants)",
        desc.stack_id,
        desc.resources.len(),
        desc.grants().count()
    );
    Ok(())
}

fn render(desc: &types::StackDescription, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(desc).map_err(|e| format!("serialize error: {}", e))
        }
        OutputFormat::Yaml => {
            serde_yaml_ng::to_string(desc).map_err(|e| format!("serialize error: {}", e))
        }
    }
}

fn cmd_synth(args: &StackArgs, format: OutputFormat, output: Option<&Path>) -> Result<(), String> {
    let desc = build(args)?;
    let rendered = render(&desc, format)?;
    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
            tracing::info!(path = %path.display(), stack = %desc.stack_id, "description written");
            println!(
                "Wrote {} ({} resources) to {}",
                desc.stack_id,
                desc.resources.len(),
                path.display()
            );
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn cmd_plan(args: &StackArgs, state_dir: &Path) -> Result<(), String> {
    let desc = build(args)?;
    let lock = state::load_lock(state_dir, &desc.environment)?;
    let plan = planner::plan(&desc, lock.as_ref())?;
    print_plan(&plan);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &types::ExecutionPlan) {
    println!("Planning: {} ({} resources)", plan.stack_id, plan.changes.len());
    println!();

    for change in &plan.changes {
        let symbol = match change.action {
            types::PlanAction::Create => "+",
            types::PlanAction::Update => "~",
            types::PlanAction::Destroy => "-",
            types::PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }

    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn cmd_record(args: &StackArgs, state_dir: &Path) -> Result<(), String> {
    let desc = build(args)?;
    let lock = planner::lock_from_description(&desc)?;
    let path = state::save_lock(state_dir, &lock)?;
    println!(
        "Recorded {} ({} resources) to {}",
        desc.stack_id,
        lock.resources.len(),
        path.display()
    );
    println!("  Digest: {}", planner::description_digest(&lock));
    Ok(())
}

fn api_root(desc: &types::StackDescription) -> Result<&crate::resources::routing::RouteNode, String> {
    desc.api()
        .map(|a| &a.root)
        .ok_or_else(|| format!("{} has no API entry point", desc.stack_id))
}

fn cmd_routes(args: &StackArgs) -> Result<(), String> {
    let desc = build(args)?;
    let root = api_root(&desc)?;
    println!("Routes: {}", desc.stack_id);
    for (path, methods) in root.route_table() {
        let list: Vec<_> = methods.iter().map(|m| m.as_str()).collect();
        let cors = root
            .find(path)
            .and_then(|n| n.cors.as_ref())
            .map(|c| format!("  [CORS {}]", c.allow_origins.join(",")))
            .unwrap_or_default();
        println!("  {:<32} {}{}", path, list.join(","), cors);
    }
    Ok(())
}

fn cmd_resolve(args: &StackArgs, method: HttpMethod, path: &str) -> Result<(), String> {
    let desc = build(args)?;
    match api_root(&desc)?.resolve(method, path) {
        RouteOutcome::Integration {
            target,
            path_parameters,
        } => {
            println!("{} {} → {}", method, path, target);
            for (name, value) in &path_parameters {
                println!("  {} = {}", name, value);
            }
        }
        RouteOutcome::Preflight(resp) => {
            println!("{} {} → preflight {}", method, path, resp.status);
            for (name, value) in &resp.headers {
                println!("  {}: {}", name, value);
            }
        }
        RouteOutcome::MethodNotAllowed { allowed } => {
            let list: Vec<_> = allowed.iter().map(|m| m.as_str()).collect();
            return Err(format!(
                "{} {}: method not allowed (allowed: {})",
                method,
                path,
                list.join(",")
            ));
        }
        RouteOutcome::NotFound => return Err(format!("{} {}: no route", method, path)),
    }
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(types::StackDescription);
    let json =
        serde_json::to_string_pretty(&schema).map_err(|e| format!("serialize error: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn cmd_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "wcs-infra", &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Project dir with wcs.yaml and a packaged code asset.
    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin").join("main"), "handler").unwrap();
        std::fs::write(dir.path().join("wcs.yaml"), "code_asset: bin\n").unwrap();
        dir
    }

    fn args(dir: &Path, env: &str) -> StackArgs {
        StackArgs {
            env: Some(env.to_string()),
            config: dir.join("wcs.yaml"),
        }
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        assert!(dir.path().join("wcs.yaml").exists());
        assert!(dir.path().join("state").is_dir());
        let written = config::parse_config_file(&dir.path().join("wcs.yaml")).unwrap();
        assert_eq!(written, config::StackConfig::default());
    }

    #[test]
    fn test_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wcs.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_validate_valid() {
        let dir = project();
        cmd_validate(&args(dir.path(), "staging")).unwrap();
    }

    #[test]
    fn test_validate_missing_env() {
        let dir = project();
        let a = StackArgs {
            env: None,
            config: dir.path().join("wcs.yaml"),
        };
        assert!(cmd_validate(&a).is_err());
    }

    #[test]
    fn test_validate_missing_asset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wcs.yaml"), "code_asset: bin\n").unwrap();
        let err = cmd_validate(&args(dir.path(), "staging")).unwrap_err();
        assert!(err.contains("1 validation error"));
    }

    #[test]
    fn test_synth_json_to_file() {
        let dir = project();
        let out = dir.path().join("stack.json");
        cmd_synth(&args(dir.path(), "staging"), OutputFormat::Json, Some(&out)).unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        let desc: types::StackDescription = serde_json::from_str(&content).unwrap();
        assert_eq!(desc.stack_id, "WaterColorSiteStackStaging");
    }

    #[test]
    fn test_synth_yaml_to_file() {
        let dir = project();
        let out = dir.path().join("stack.yaml");
        cmd_synth(&args(dir.path(), "prod"), OutputFormat::Yaml, Some(&out)).unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        let desc: types::StackDescription = serde_yaml_ng::from_str(&content).unwrap();
        assert_eq!(desc.environment, "prod");
        assert_eq!(desc.distribution().unwrap().aliases().len(), 1);
    }

    #[test]
    fn test_synth_empty_env_fails() {
        let dir = project();
        let err = cmd_synth(&args(dir.path(), ""), OutputFormat::Json, None).unwrap_err();
        assert!(err.starts_with("invalid configuration"));
    }

    #[test]
    fn test_record_then_plan() {
        let dir = project();
        let state_dir = dir.path().join("state");
        let a = args(dir.path(), "staging");

        cmd_plan(&a, &state_dir).unwrap();
        cmd_record(&a, &state_dir).unwrap();

        let lock = state::load_lock(&state_dir, "staging").unwrap().unwrap();
        assert_eq!(lock.resources.len(), 16);

        let desc = build(&a).unwrap();
        let plan = planner::plan(&desc, Some(&lock)).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_sees_rebuilt_artifact() {
        let dir = project();
        let state_dir = dir.path().join("state");
        let a = args(dir.path(), "staging");
        cmd_record(&a, &state_dir).unwrap();

        std::fs::write(dir.path().join("bin").join("main"), "handler v2").unwrap();
        let desc = build(&a).unwrap();
        let lock = state::load_lock(&state_dir, "staging").unwrap();
        let plan = planner::plan(&desc, lock.as_ref()).unwrap();
        assert_eq!(plan.to_update, 1);
    }

    #[test]
    fn test_routes() {
        let dir = project();
        cmd_routes(&args(dir.path(), "staging")).unwrap();
    }

    #[test]
    fn test_resolve() {
        let dir = project();
        let a = args(dir.path(), "staging");
        cmd_resolve(&a, HttpMethod::Patch, "/wcs/42/2024-01-01T00:00:00/images").unwrap();
        cmd_resolve(&a, HttpMethod::Options, "/wcs").unwrap();
        assert!(cmd_resolve(&a, HttpMethod::Delete, "/wcs")
            .unwrap_err()
            .contains("not allowed"));
        assert!(cmd_resolve(&a, HttpMethod::Get, "/missing")
            .unwrap_err()
            .contains("no route"));
    }

    #[test]
    fn test_schema() {
        cmd_schema().unwrap();
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(base_dir(Path::new("wcs.yaml")), PathBuf::from("."));
        assert_eq!(base_dir(Path::new("infra/wcs.yaml")), PathBuf::from("infra"));
    }

    #[test]
    fn test_dispatch_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("site");
        std::fs::create_dir_all(&sub).unwrap();
        dispatch(Commands::Init { path: sub.clone() }).unwrap();
        assert!(sub.join("wcs.yaml").exists());
    }

    #[test]
    fn test_dispatch_synth() {
        let dir = project();
        let out = dir.path().join("out.json");
        dispatch(Commands::Synth {
            stack: args(dir.path(), "dev"),
            format: OutputFormat::Json,
            output: Some(out.clone()),
        })
        .unwrap();
        assert!(out.exists());
    }
}
