mod dry_run;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tenant_context::TenantContext;
use tenant_guard::{
    ClientError, GuardConfig, GuardSetup, MultiTenancySwitch, Operation, SchemaDescription,
    SchemaRegistry,
};
use tracing_subscriber::EnvFilter;

use crate::dry_run::DryRunStore;

/// Exit code for an operation the guard refuses.
const BLOCKED: u8 = 2;

/// Inspect schemas and dry-run operations through the tenant guard
#[derive(Parser)]
#[command(name = "guardctl")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to guard configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the models the guard protects and their tenant column
    Schema(SchemaArgs),
    /// Run one operation through the guard and print what storage would receive
    Check(CheckArgs),
}

#[derive(Args)]
struct SchemaArgs {
    /// Schema description (YAML)
    #[arg(long)]
    schema: PathBuf,
}

#[derive(Args)]
struct CheckArgs {
    /// Schema description (YAML)
    #[arg(long)]
    schema: PathBuf,

    /// Operation JSON file, or `-` for stdin
    #[arg(long)]
    op: String,

    /// Tenant of the simulated request; omit to simulate a missing context
    #[arg(long)]
    tenant: Option<String>,

    /// Simulate a super admin
    #[arg(long)]
    super_admin: bool,

    /// Role of the simulated user
    #[arg(long)]
    role: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = GuardConfig::load(cli.config.as_deref())?;
    tracing::debug!(enabled = config.enabled, tenant_field = %config.tenant_field, "configuration loaded");

    match cli.command {
        Commands::Schema(args) => print_schema(&config, &args.schema),
        Commands::Check(args) => check(config, &args).await,
    }
}

fn init_logging(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_schema(config: &GuardConfig, path: &Path) -> Result<ExitCode> {
    let schema = load_schema(path)?;
    let registry = SchemaRegistry::build(&schema, &config.tenant_field);
    for (model, tenant) in registry.iter() {
        if config.is_exempt_model(model) {
            continue;
        }
        let mode = if tenant.optional { "optional" } else { "required" };
        println!("{model}\t{}\t{mode}", tenant.field);
    }
    for model in &schema.models {
        if config.is_exempt_model(&model.name) {
            println!("{}\t-\texempt", model.name);
        } else if registry.get(&model.name).is_none() {
            println!("{}\t-\tunscoped", model.name);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn check(config: GuardConfig, args: &CheckArgs) -> Result<ExitCode> {
    let schema = load_schema(&args.schema)?;
    let op = read_operation(&args.op)?;

    if !config.enabled {
        tracing::info!("multi-tenancy disabled in configuration, enforcing anyway for the dry run");
    }
    // Ambient provider: the simulated request runs inside a real scope.
    let setup = GuardSetup::new(config).with_flag(Arc::new(MultiTenancySwitch::new(true)));
    let client = setup.register(DryRunStore::new(schema));

    let result = match simulated_context(args)? {
        Some(ctx) => tenant_context::scope(ctx, client.execute(op)).await,
        None => client.execute(op).await,
    };

    match result {
        Ok(rewritten) => {
            println!("{}", serde_json::to_string_pretty(&rewritten)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(ClientError::Guard(err)) => {
            eprintln!("blocked: {err}");
            Ok(ExitCode::from(BLOCKED))
        }
        Err(ClientError::Storage(never)) => match never {},
    }
}

fn simulated_context(args: &CheckArgs) -> Result<Option<TenantContext>> {
    let Some(tenant) = &args.tenant else {
        return Ok(None);
    };
    let mut builder = TenantContext::builder().tenant_id(tenant);
    if args.super_admin {
        builder = builder.super_admin(true);
    }
    if let Some(role) = &args.role {
        builder = builder.role(role);
    }
    Ok(Some(builder.build()?))
}

fn load_schema(path: &Path) -> Result<SchemaDescription> {
    SchemaDescription::from_yaml_file(path)
        .with_context(|| format!("loading schema from {}", path.display()))
}

fn read_operation(source: &str) -> Result<Operation> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading operation from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))?
    };
    serde_json::from_str(&raw).context("parsing operation JSON")
}
