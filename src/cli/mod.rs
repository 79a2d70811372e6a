//! # Command Line Interface
//!
//! `credplane run` provisions the fleet; `credplane inventory` lists what a
//! run would see. Exit status: 0 clean, 1 when any instance errored, 2 when
//! the run could not start or discovery failed.

pub mod output;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{load_config, AppConfig, SecretBackendKind};
use crate::credentials::PasswordGenerator;
use crate::database::PostgresAdmin;
use crate::inventory::{build_control_plane, InstanceInventory};
use crate::observability::{init_observability, log_config_info};
use crate::provisioning::{Collaborators, ProvisioningEngine, RunConfig, RunMode};
use crate::secrets::{build_secret_store, SecretSynchronizer};
use output::OutputFormat;

/// Exit status when the run could not start or discovery failed
pub const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "credplane")]
#[command(about = "Provision database credentials across a fleet and sync them to a secret store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (YAML or TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Converge every instance to the managed credential
    Run(RunArgs),

    /// List discovered instances and their primary/replica role
    Inventory {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Verify logins only; never change anything
    #[arg(long, conflicts_with = "force")]
    pub check: bool,

    /// Regenerate and overwrite credentials on every reachable primary
    #[arg(long)]
    pub force: bool,

    /// Managed username override
    #[arg(long)]
    pub username: Option<String>,

    /// Instances processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

/// Parse arguments, run the command and map the result to an exit status
pub async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Run aborted");
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<u8> {
    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Commands::Run(args) = &cli.command {
        apply_overrides(&mut config, args)?;
    }

    init_observability(&config.observability, cli.verbose);
    log_config_info(&config);

    match cli.command {
        Commands::Run(args) => run_provisioning(&config, &args).await,
        Commands::Inventory { output } => list_inventory(&config, output).await,
    }
}

/// CLI flags win over file and environment values
fn apply_overrides(config: &mut AppConfig, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(username) = &args.username {
        config.provisioning.username = username.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.provisioning.concurrency = concurrency;
    }
    config.validate().context("Invalid command line override")?;
    Ok(())
}

async fn build_inventory(config: &AppConfig) -> anyhow::Result<InstanceInventory> {
    let control_plane = build_control_plane(&config.inventory).await?;
    Ok(InstanceInventory::new(control_plane, config.inventory.engines.clone()))
}

/// A run reads admin passwords from the secret store, so it needs one that
/// outlives the process.
fn ensure_durable_secret_store(config: &AppConfig) -> anyhow::Result<()> {
    if config.secrets.backend == SecretBackendKind::Memory {
        anyhow::bail!(
            "secrets.backend = memory holds no admin credentials; set CREDPLANE__SECRETS__BACKEND to vault or aws"
        );
    }
    Ok(())
}

async fn run_provisioning(config: &AppConfig, args: &RunArgs) -> anyhow::Result<u8> {
    let mode = RunMode::from_flags(args.check, args.force)?;
    ensure_durable_secret_store(config)?;

    let store = build_secret_store(&config.secrets).await.context("Failed to initialize secret store")?;
    let secrets = SecretSynchronizer::new(store, config.secrets.request_timeout());
    let postgres = Arc::new(PostgresAdmin::new(
        &config.database,
        config.provisioning.grant_database_privileges,
        secrets.clone(),
    ));

    let run_config = RunConfig::new(mode, &config.provisioning.username)
        .with_secret_id_template(&config.provisioning.secret_id_template)
        .with_concurrency(config.provisioning.concurrency);
    let engine = ProvisioningEngine::new(
        run_config,
        Collaborators {
            inventory: build_inventory(config).await?,
            prober: postgres.clone(),
            users: postgres,
            secrets,
            generator: PasswordGenerator::new(config.provisioning.password_policy()?),
        },
    );

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    let report = engine.run(&cancel).await;
    watcher.abort();
    let report = report.context("Instance discovery failed")?;

    output::print_report(&report, args.output)?;
    Ok(report.exit_code())
}

async fn list_inventory(config: &AppConfig, format: OutputFormat) -> anyhow::Result<u8> {
    let instances = build_inventory(config).await?.list().await.context("Instance discovery failed")?;
    output::print_inventory(&instances, format)?;
    Ok(0)
}
