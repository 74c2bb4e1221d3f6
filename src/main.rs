//! chaos-tools CLI: call Chaos Mesh agent tools from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde_json::Value;

use chaos_mesh_tools::capability::CapabilityChecker;
use chaos_mesh_tools::cluster::{ClusterApi, InMemoryCluster, Kubectl};
use chaos_mesh_tools::config::ChaosConfig;
use chaos_mesh_tools::error::ValidationError;
use chaos_mesh_tools::kind::ChaosKind;
use chaos_mesh_tools::render::render;
use chaos_mesh_tools::schema::SchemaRegistry;
use chaos_mesh_tools::target::Targeting;
use chaos_mesh_tools::tools::{self, ToolInput};
use chaos_mesh_tools::validate::Validator;

#[derive(Parser)]
#[command(name = "chaos-tools", version, about = "Chaos Mesh tools for agents")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/chaos-mesh-tools/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// kubectl binary to drive.
    #[arg(long, global = true)]
    kubectl: Option<String>,

    /// Kubeconfig file.
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context.
    #[arg(long, global = true)]
    context: Option<String>,

    /// Timeout for each cluster call, in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Run against an in-memory cluster with Chaos Mesh installed instead of kubectl.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available tools.
    Tools {
        /// Print full signatures with JSON input schemas.
        #[arg(long)]
        json: bool,
    },

    /// Call a tool with JSON arguments.
    Call {
        /// Tool name, e.g. create_network_delay.
        tool: String,

        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Validate parameters and print the manifest without touching the cluster.
    Render {
        /// Chaos kind (network, stress, pod, io, http, dns, physical).
        kind: String,

        /// Action within the kind, e.g. delay or stress-cpu.
        action: String,

        /// Parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Check which chaos kinds the cluster can run.
    Check {
        /// Only check this kind.
        kind: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<ChaosConfig> {
    let mut config = ChaosConfig::load_or_default(cli.config.as_deref())?;
    if let Some(kubectl) = &cli.kubectl {
        config.cluster.kubectl = kubectl.clone();
    }
    if let Some(kubeconfig) = &cli.kubeconfig {
        config.cluster.kubeconfig = Some(kubeconfig.clone());
    }
    if let Some(context) = &cli.context {
        config.cluster.context = Some(context.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.cluster.timeout_secs = timeout;
    }
    config.check()?;
    Ok(config)
}

fn connect(cli: &Cli, config: &ChaosConfig) -> Arc<dyn ClusterApi> {
    if cli.dry_run {
        tracing::info!("dry run: using an in-memory cluster");
        Arc::new(InMemoryCluster::with_chaos_mesh(&config.chaos_namespace))
    } else {
        Arc::new(Kubectl::from_config(&config.cluster))
    }
}

fn parse_kind(s: &str) -> Result<ChaosKind> {
    ChaosKind::parse(s).ok_or_else(|| miette::miette!("unknown chaos kind: {s}"))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Tools { json } => {
            let (registry, _) = tools::build(connect(&cli, &config), config)?;
            let signatures = registry.list();
            if *json {
                let out: Vec<Value> = signatures
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "name": s.name,
                            "description": s.description,
                            "danger": s.danger,
                            "input_schema": s.input_schema(),
                        })
                    })
                    .collect();
                print_json(&Value::Array(out))?;
            } else {
                println!("Tools ({}):", signatures.len());
                for s in &signatures {
                    println!("  {:<36} [{}] {}", s.name, s.danger, s.description);
                }
            }
        }

        Commands::Call { tool, args } => {
            let args: Value = serde_json::from_str(args).into_diagnostic()?;
            let (registry, ctx) = tools::build(connect(&cli, &config), config)?;
            let input = ToolInput::from_value(args)?;
            match registry.execute(tool, input, &ctx) {
                Ok(out) => print_json(&out.result)?,
                Err(e) => {
                    print_json(&e.to_response())?;
                    return Err(e.into());
                }
            }
        }

        Commands::Render {
            kind,
            action,
            params,
        } => {
            let kind = parse_kind(kind)?;
            let raw: Value = serde_json::from_str(params).into_diagnostic()?;
            let validator = Validator::new(Arc::new(SchemaRegistry::builtin()?));
            let params = validator.validate(kind, action, &raw)?;
            let targeting = match (params.target(), params.address()) {
                (_, Some(addrs)) => Targeting::Machines(addrs.clone()),
                (Some(sel), None) => Targeting::Pods(sel.clone()),
                (None, None) => return Err(ValidationError::MissingField {
                    field: "target".into(),
                }
                .into()),
            };
            let manifest = render(&params, &targeting, params.namespace(), None);
            print_json(&manifest.document())?;
        }

        Commands::Check { kind } => {
            let checker = CapabilityChecker::new(connect(&cli, &config), config.chaos_namespace);
            let report = match kind {
                Some(k) => serde_json::to_value(checker.check_one(parse_kind(k)?)),
                None => serde_json::to_value(checker.check_all()),
            }
            .into_diagnostic()?;
            print_json(&report)?;
        }
    }

    Ok(())
}
