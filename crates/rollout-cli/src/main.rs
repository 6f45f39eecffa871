//! Rollout - chart installation for provisioned clusters
//!
//! Usage:
//!   rollout chart install [TARGET]   # Install charts on a cluster
//!   rollout chart install --dry-run  # Render without applying

mod interactive;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollout_core::config::{RolloutSettings, SettingsStore};
use rollout_core::providers::{HelmInstaller, KubectlSyncWaiter, MkcertRegenerator};
use rollout_core::types::InstallationRequest;
use rollout_core::values::{ValuesFileCollector, ValuesOverride};
use rollout_core::workflow::{
    Collaborators, DefaultConfigBuilder, InstallationWorkflow, WorkflowOutcome, WorkflowReport,
};

use crate::interactive::{InteractiveConfirmation, InteractiveTargetSelector, Summary};

/// Exit status for a run stopped by the user.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "rollout")]
#[command(about = "Chart installation for provisioned clusters", long_about = None)]
struct Cli {
    /// Show detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(long, global = true, conflicts_with = "verbose")]
    silent: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage charts on a cluster
    Chart(ChartArgs),
}

#[derive(Args)]
struct ChartArgs {
    #[command(subcommand)]
    command: ChartCommand,
}

#[derive(Subcommand)]
enum ChartCommand {
    /// Install the app-of-apps chart on a cluster
    Install(InstallArgs),
}

#[derive(Args, Debug, Default)]
struct InstallArgs {
    /// Target cluster (prompted for when omitted)
    targets: Vec<String>,

    /// Reinstall even if the release already exists
    #[arg(short, long)]
    force: bool,

    /// Render the installation without applying it
    #[arg(long)]
    dry_run: bool,

    /// Repository holding the app-of-apps manifests
    #[arg(long)]
    github_repo: Option<String>,

    /// Branch of the manifests repository
    #[arg(long)]
    github_branch: Option<String>,

    #[arg(long)]
    github_username: Option<String>,

    /// Access token for private repositories
    #[arg(long)]
    github_token: Option<String>,

    /// Directory for generated certificates
    #[arg(long)]
    cert_dir: Option<PathBuf>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    yes: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.silent);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, silent: bool) {
    let fallback = if silent {
        "error"
    } else if verbose {
        "rollout=debug,rollout_core=debug,info"
    } else {
        "rollout=info,rollout_core=info,warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match cli.command {
        Commands::Chart(ChartArgs {
            command: ChartCommand::Install(args),
        }) => runtime.block_on(run_install(args, cli.verbose, cli.silent)),
    }
}

async fn run_install(args: InstallArgs, verbose: bool, silent: bool) -> Result<ExitCode> {
    let store = SettingsStore::discover()?;
    let settings = store
        .load()
        .with_context(|| format!("Failed to load {}", store.settings_path().display()))?;
    debug!(
        path = %store.settings_path().display(),
        scope = ?store.scope(),
        "Loaded settings"
    );

    let request = build_request(&args, &settings, &store, verbose, silent);
    let workflow = InstallationWorkflow::new(
        collaborators(&args, &settings, &request),
        settings.workflow_options(),
    );

    let token = CancellationToken::new();
    let report = workflow.execute(&token, &request).await;
    Ok(present(report, silent))
}

fn build_request(
    args: &InstallArgs,
    settings: &RolloutSettings,
    store: &SettingsStore,
    verbose: bool,
    silent: bool,
) -> InstallationRequest {
    let repository = args
        .github_repo
        .clone()
        .unwrap_or_else(|| settings.repository.url.clone());
    let branch = args
        .github_branch
        .clone()
        .unwrap_or_else(|| settings.repository.branch.clone());
    let cert_dir = args
        .cert_dir
        .clone()
        .or_else(|| settings.certificates.dir.clone())
        .unwrap_or_else(|| store.default_cert_dir());

    InstallationRequest::new(args.targets.clone())
        .with_force(args.force)
        .with_dry_run(args.dry_run)
        .with_verbose(verbose)
        .with_silent(silent)
        .with_repository(repository, branch)
        .with_credentials(args.github_username.clone(), args.github_token.clone())
        .with_cert_dir(cert_dir)
}

fn collaborators(
    args: &InstallArgs,
    settings: &RolloutSettings,
    request: &InstallationRequest,
) -> Collaborators {
    let collector = ValuesFileCollector::new(&settings.values.base_file, &settings.values.temp_file)
        .with_override(ValuesOverride::branch(&request.repository.branch));
    let cert_dir = request.cert_dir.clone().unwrap_or_default();
    let mut installer = HelmInstaller::new(&settings.install.release_name, &settings.install.chart)
        .with_sync_waiter(Box::new(KubectlSyncWaiter::new(
            settings.sync_poll_interval(),
        )));
    if let Some(chart) = &settings.install.argocd_chart {
        installer = installer.with_argocd_release(&settings.install.argocd_release, chart);
    }

    Collaborators {
        collector: Box::new(collector),
        selector: Box::new(InteractiveTargetSelector::new(args.yes)),
        confirmation: Box::new(InteractiveConfirmation::new(
            Summary::from_request(request),
            args.yes,
        )),
        certificates: Box::new(MkcertRegenerator::new(cert_dir)),
        builder: Box::new(DefaultConfigBuilder::new(
            settings.install.namespace.clone(),
            settings.sync_timeout(),
        )),
        installer: Box::new(installer),
    }
}

fn present(report: WorkflowReport, silent: bool) -> ExitCode {
    match report.outcome {
        WorkflowOutcome::Succeeded => {
            if !silent && let Some(target) = &report.target {
                println!(
                    "{} Charts installed on {}",
                    style("✓").green().bold(),
                    style(target).cyan()
                );
            }
            ExitCode::SUCCESS
        }
        WorkflowOutcome::Cancelled(e) => {
            eprintln!("{} {}", style("Cancelled:").yellow().bold(), e);
            ExitCode::from(EXIT_CANCELLED)
        }
        WorkflowOutcome::Failed(e) => {
            eprintln!(
                "{} {:#}",
                style("Error:").red().bold(),
                anyhow::Error::from(e)
            );
            ExitCode::FAILURE
        }
    }
}
