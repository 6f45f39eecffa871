//! Installation workflow: step sequencing, cancellation, retry and cleanup.
//!
//! A run walks configuration, target selection, confirmation, certificate
//! refresh, config assembly and the retry-wrapped installation in order. Any
//! step can end the run. Once the steps are over the temp-file ledger is
//! resolved exactly once: committed on success, restored otherwise.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, field, info, info_span, warn};

use crate::cancel::CancellationBridge;
use crate::error::{CancelReason, InstallError, InstallerError};
use crate::ledger::{LedgerResolution, TempFileLedger};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::types::{ChartConfiguration, ChartInstallConfig, InstallationRequest};
use crate::values::{self, BASE_VALUES_FILE, TEMP_VALUES_FILE};

use super::collaborators::{
    CertificateRegenerator, ChartInstaller, ConfigurationBuilder, ConfigurationCollector,
    ConfirmationPrompt, TargetSelector,
};
use super::state::{WorkflowOutcome, WorkflowReport, WorkflowState};

/// Upper bound for the installation phase.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub retry_policy: RetryPolicy,
    pub install_timeout: Duration,
    /// Base values file used to synthesize a dry-run configuration
    pub base_values_file: PathBuf,
    pub temp_values_file: PathBuf,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::INSTALLATION,
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
            base_values_file: PathBuf::from(BASE_VALUES_FILE),
            temp_values_file: PathBuf::from(TEMP_VALUES_FILE),
        }
    }
}

/// The step implementations a workflow drives.
pub struct Collaborators {
    pub collector: Box<dyn ConfigurationCollector>,
    pub selector: Box<dyn TargetSelector>,
    pub confirmation: Box<dyn ConfirmationPrompt>,
    pub certificates: Box<dyn CertificateRegenerator>,
    pub builder: Box<dyn ConfigurationBuilder>,
    pub installer: Box<dyn ChartInstaller>,
}

pub struct InstallationWorkflow {
    steps: Collaborators,
    options: WorkflowOptions,
}

enum StepsOutcome {
    Installed,
    NoTarget,
}

#[derive(Debug, Default)]
struct Progress {
    state: WorkflowState,
    target: Option<String>,
    attempts: u32,
    warnings: Vec<String>,
}

impl Progress {
    fn enter(&mut self, state: WorkflowState) {
        self.state.advance(state);
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn finish(
        mut self,
        outcome: WorkflowOutcome,
        resolution: Option<LedgerResolution>,
    ) -> WorkflowReport {
        self.state.advance(outcome.state());
        WorkflowReport {
            outcome,
            state: self.state,
            target: self.target,
            resolution,
            attempts: self.attempts,
            warnings: self.warnings,
        }
    }
}

impl InstallationWorkflow {
    pub fn new(steps: Collaborators, options: WorkflowOptions) -> Self {
        Self { steps, options }
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Run the workflow, cancelling on SIGINT/SIGTERM or when `parent` is cancelled.
    pub async fn execute(
        &self,
        parent: &CancellationToken,
        request: &InstallationRequest,
    ) -> WorkflowReport {
        let mut progress = Progress::default();
        if parent.is_cancelled() {
            return progress.finish(
                WorkflowOutcome::Cancelled(InstallError::cancelled(
                    CancelReason::AlreadyCancelled,
                )),
                None,
            );
        }

        let token = parent.child_token();
        let bridge = match CancellationBridge::install(token.clone()) {
            Ok(bridge) => bridge,
            Err(e) => {
                progress.warn(format!("Signal handling unavailable: {}", e));
                // Closed channel: the bridge never fires, the parent token still works.
                let (_tx, rx) = mpsc::channel(1);
                CancellationBridge::from_notifications(token, rx)
            }
        };

        self.run(bridge, request, progress).await
    }

    /// Run the workflow against an already constructed bridge.
    ///
    /// The bridge's token is the run token.
    pub async fn execute_with_bridge(
        &self,
        bridge: CancellationBridge,
        request: &InstallationRequest,
    ) -> WorkflowReport {
        self.run(bridge, request, Progress::default()).await
    }

    async fn run(
        &self,
        bridge: CancellationBridge,
        request: &InstallationRequest,
        mut progress: Progress,
    ) -> WorkflowReport {
        let span = info_span!(
            "install",
            environment = field::Empty,
            dry_run = request.dry_run,
            force = request.force
        );

        async move {
            let token = bridge.token().clone();
            if token.is_cancelled() {
                return progress.finish(
                    WorkflowOutcome::Cancelled(InstallError::cancelled(
                        CancelReason::AlreadyCancelled,
                    )),
                    None,
                );
            }

            let mut ledger = TempFileLedger::new();
            let result = self
                .run_steps(&token, request, &mut ledger, &mut progress)
                .await;
            let interrupted = token.is_cancelled() || bridge.interrupted();
            let (outcome, resolution) =
                self.resolve(result, interrupted, ledger, request, &mut progress);
            drop(bridge);

            progress.finish(outcome, Some(resolution))
        }
        .instrument(span)
        .await
    }

    async fn run_steps(
        &self,
        token: &CancellationToken,
        request: &InstallationRequest,
        ledger: &mut TempFileLedger,
        progress: &mut Progress,
    ) -> Result<StepsOutcome, InstallError> {
        progress.enter(WorkflowState::Configuring);
        let chart_config = self.configure(request, ledger, progress)?;
        checkpoint(token)?;

        progress.enter(WorkflowState::SelectingTarget);
        let target = match self
            .steps
            .selector
            .select(&request.args, request.verbose)
            .map_err(InstallError::TargetSelection)?
        {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Ok(StepsOutcome::NoTarget),
        };
        tracing::Span::current().record("environment", target.as_str());
        progress.target = Some(target.clone());
        checkpoint(token)?;

        progress.enter(WorkflowState::Confirming);
        self.confirm(&target, progress)?;
        checkpoint(token)?;

        progress.enter(WorkflowState::RefreshingCerts);
        if let Err(e) = self.steps.certificates.regenerate() {
            progress.warn(format!("Certificate regeneration failed: {:#}", e));
        }
        checkpoint(token)?;

        progress.enter(WorkflowState::Assembling);
        let config = self
            .steps
            .builder
            .build(request, &target, chart_config.temp_values())
            .map_err(|e| InstallError::assembly(&target, e))?;
        checkpoint(token)?;

        progress.enter(WorkflowState::Installing);
        self.install(token, &config, progress).await?;

        Ok(StepsOutcome::Installed)
    }

    fn configure(
        &self,
        request: &InstallationRequest,
        ledger: &mut TempFileLedger,
        progress: &mut Progress,
    ) -> Result<ChartConfiguration, InstallError> {
        if request.dry_run {
            let existing_values = self
                .steps
                .collector
                .load_base_values()
                .map_err(InstallError::BaseValues)?;
            // Helm reads the temp file even for --dry-run. It is not registered.
            let temp_values_path = self.options.temp_values_file.clone();
            values::write_values(&temp_values_path, &existing_values)
                .map_err(InstallError::BaseValues)?;
            info!("Using existing configuration (dry-run mode)");
            return Ok(ChartConfiguration {
                base_values_path: self.options.base_values_file.clone(),
                temp_values_path: Some(temp_values_path),
                existing_values,
                modified_sections: Vec::new(),
            });
        }

        let config = self
            .steps
            .collector
            .collect()
            .map_err(InstallError::Configuration)?;

        if let Some(path) = config.temp_values()
            && let Err(e) = ledger.register(path)
        {
            progress.warn(format!("Failed to register temp file for cleanup: {}", e));
        }

        Ok(config)
    }

    fn confirm(&self, target: &str, progress: &mut Progress) -> Result<(), InstallError> {
        match self.steps.confirmation.confirm(target) {
            Ok(true) => Ok(()),
            Ok(false) => {
                info!("Installation cancelled.");
                Err(InstallError::cancelled(CancelReason::Declined))
            }
            Err(e) => {
                progress.warn(format!("Confirmation failed: {:#}", e));
                Err(InstallError::cancelled(CancelReason::Declined))
            }
        }
    }

    async fn install(
        &self,
        token: &CancellationToken,
        config: &ChartInstallConfig,
        progress: &mut Progress,
    ) -> Result<(), InstallError> {
        let install_token = token.child_token();
        let deadline = Deadline::arm(install_token.clone(), self.options.install_timeout);
        let executor = RetryExecutor::new(self.options.retry_policy);

        let installer = self.steps.installer.as_ref();
        let token_ref = &install_token;
        let attempts = &mut progress.attempts;
        let result = executor
            .execute(token_ref, move |attempt| {
                *attempts = attempt;
                debug!(attempt, "Invoking installer");
                installer.install(token_ref, config)
            })
            .await;

        let timed_out = deadline.fired();
        drop(deadline);

        match result {
            Ok(()) => Ok(()),
            Err(InstallerError::BranchNotFound { repository, branch }) => {
                Err(InstallError::BranchNotFound { repository, branch })
            }
            Err(InstallerError::Cancelled) => {
                let reason = if timed_out && !token.is_cancelled() {
                    CancelReason::TimedOut
                } else {
                    CancelReason::Interrupted
                };
                Err(InstallError::cancelled(reason))
            }
            Err(other) => Err(InstallError::installation(&config.target, other)),
        }
    }

    fn resolve(
        &self,
        result: Result<StepsOutcome, InstallError>,
        interrupted: bool,
        ledger: TempFileLedger,
        request: &InstallationRequest,
        progress: &mut Progress,
    ) -> (WorkflowOutcome, LedgerResolution) {
        match result {
            Err(err) => {
                let verbose = request.verbose
                    && err.cancel_reason() != Some(CancelReason::Interrupted);
                let resolution = restore(ledger, verbose, progress);
                (WorkflowOutcome::from_error(err), resolution)
            }
            Ok(_) if interrupted => {
                let resolution = restore(ledger, false, progress);
                (
                    WorkflowOutcome::Cancelled(InstallError::cancelled(
                        CancelReason::Interrupted,
                    )),
                    resolution,
                )
            }
            Ok(StepsOutcome::NoTarget) => {
                info!("No target selected, nothing to install");
                let resolution = restore(ledger, false, progress);
                (WorkflowOutcome::Succeeded, resolution)
            }
            Ok(StepsOutcome::Installed) => {
                info!("Installation completed");
                (WorkflowOutcome::Succeeded, ledger.commit(request.verbose))
            }
        }
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), InstallError> {
    if token.is_cancelled() {
        return Err(InstallError::cancelled(CancelReason::Interrupted));
    }
    Ok(())
}

fn restore(ledger: TempFileLedger, verbose: bool, progress: &mut Progress) -> LedgerResolution {
    if let Err(e) = ledger.restore(verbose) {
        progress.warn(format!("Failed to clean up files: {}", e));
    }
    LedgerResolution::Restored
}

/// Cancels the installation token once the timeout elapses.
struct Deadline {
    fired: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Deadline {
    fn arm(token: CancellationToken, timeout: Duration) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn({
            let fired = Arc::clone(&fired);
            async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        warn!(timeout_secs = timeout.as_secs(), "Installation deadline exceeded");
                        fired.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                }
            }
        });
        Self { fired, task }
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.task.abort();
    }
}
