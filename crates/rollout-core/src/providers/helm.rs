//! Chart installation through `helm`, guarded by a remote branch check.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::error::InstallerError;
use crate::types::{AppOfAppsConfig, ChartInstallConfig, CredentialHints};
use crate::workflow::{ChartInstaller, SyncWaiter};

use super::command;

/// `git` stderr fragments for failures a retry cannot fix.
const UNRECOVERABLE_REMOTE_ERRORS: &[&str] = &[
    "Authentication failed",
    "Repository not found",
    "does not appear to be a git repository",
    "could not read Username",
];

pub struct HelmInstaller {
    release_name: String,
    chart: String,
    /// Argo CD release applied before the app-of-apps chart
    argocd: Option<(String, String)>,
    waiter: Option<Box<dyn SyncWaiter>>,
}

impl HelmInstaller {
    pub fn new(release_name: impl Into<String>, chart: impl Into<String>) -> Self {
        Self {
            release_name: release_name.into(),
            chart: chart.into(),
            argocd: None,
            waiter: None,
        }
    }

    /// Install Argo CD from `chart` first, so the application CRD exists.
    pub fn with_argocd_release(
        mut self,
        release_name: impl Into<String>,
        chart: impl Into<String>,
    ) -> Self {
        self.argocd = Some((release_name.into(), chart.into()));
        self
    }

    /// Wait for the app-of-apps manifests to converge after the release is applied.
    pub fn with_sync_waiter(mut self, waiter: Box<dyn SyncWaiter>) -> Self {
        self.waiter = Some(waiter);
        self
    }

    /// Arguments for `helm upgrade --install`.
    pub fn helm_args(&self, config: &ChartInstallConfig) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "upgrade".into(),
            "--install".into(),
            self.release_name.clone(),
            self.chart.clone(),
        ];

        if let Some(app) = &config.app_of_apps {
            args.extend([
                "--namespace".into(),
                app.namespace.clone(),
                "--create-namespace".into(),
            ]);
            if let Some(values) = &app.values_file {
                args.extend(["-f".into(), values.display().to_string()]);
            }
            args.extend([
                "--set".into(),
                format!("repository.url={}", app.repository_url),
                "--set".into(),
                format!("repository.branch={}", app.branch),
            ]);
        }

        push_common_flags(&mut args, config);
        args
    }

    /// Arguments for the Argo CD release, if one is configured.
    pub fn argocd_args(&self, config: &ChartInstallConfig) -> Option<Vec<String>> {
        let (release, chart) = self.argocd.as_ref()?;
        let mut args: Vec<String> =
            vec!["upgrade".into(), "--install".into(), release.clone(), chart.clone()];
        if let Some(app) = &config.app_of_apps {
            args.extend([
                "--namespace".into(),
                app.namespace.clone(),
                "--create-namespace".into(),
            ]);
        }
        push_common_flags(&mut args, config);
        Some(args)
    }

    async fn apply(
        &self,
        release: &str,
        args: &[String],
        config: &ChartInstallConfig,
    ) -> anyhow::Result<()> {
        info!(environment = %config.target, release, "Applying chart");
        let output = command::run("helm", args).await?;
        if !output.is_empty() && !config.silent {
            debug!("{}", output);
        }
        Ok(())
    }
}

fn push_common_flags(args: &mut Vec<String>, config: &ChartInstallConfig) {
    if config.force {
        args.push("--force".into());
    }
    if config.dry_run {
        args.push("--dry-run".into());
    }
    if config.verbose && !config.silent {
        args.push("--debug".into());
    }
}

#[async_trait]
impl ChartInstaller for HelmInstaller {
    async fn install(
        &self,
        token: &CancellationToken,
        config: &ChartInstallConfig,
    ) -> Result<(), InstallerError> {
        if let Some(app) = &config.app_of_apps {
            ensure_branch_exists(app).await?;
        }

        if let (Some(args), Some((release, _))) = (self.argocd_args(config), &self.argocd) {
            self.apply(release, &args, config).await?;
        }
        self.apply(&self.release_name, &self.helm_args(config), config).await?;

        if config.dry_run {
            info!("Dry run complete, skipping sync wait");
            return Ok(());
        }

        if let (Some(waiter), true) = (&self.waiter, config.has_app_of_apps()) {
            waiter.wait(token, config).await?;
        }
        Ok(())
    }
}

/// Fail with [`InstallerError::BranchNotFound`] unless the branch exists on the remote.
pub async fn ensure_branch_exists(app: &AppOfAppsConfig) -> Result<(), InstallerError> {
    let remote = authenticated_url(&app.repository_url, &app.credentials)
        .map_err(InstallerError::Permanent)?;
    let args = vec![
        "ls-remote".to_string(),
        "--heads".to_string(),
        remote,
        app.branch.clone(),
    ];

    let output = command::run("git", &args)
        .await
        .map_err(|e| {
            classify_remote_error(e.context(format!("Failed to query {}", app.repository_url)))
        })?;

    if has_head(&output, &app.branch) {
        debug!(branch = %app.branch, "Branch found on remote");
        Ok(())
    } else {
        Err(InstallerError::BranchNotFound {
            repository: app.repository_url.clone(),
            branch: app.branch.clone(),
        })
    }
}

/// Bad credentials and missing repositories are permanent; anything else may be transient.
fn classify_remote_error(err: anyhow::Error) -> InstallerError {
    let text = format!("{:#}", err);
    if UNRECOVERABLE_REMOTE_ERRORS
        .iter()
        .any(|fragment| text.contains(fragment))
    {
        InstallerError::Permanent(err)
    } else {
        InstallerError::Failed(err)
    }
}

/// Whether `git ls-remote --heads` output lists `refs/heads/<branch>`.
pub fn has_head(ls_remote_output: &str, branch: &str) -> bool {
    let wanted = format!("refs/heads/{}", branch);
    ls_remote_output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|reference| reference == wanted)
}

/// Embed credential hints into an https URL.
pub fn authenticated_url(repository: &str, credentials: &CredentialHints) -> anyhow::Result<String> {
    let Some(token) = credentials.token.as_deref().filter(|t| !t.is_empty()) else {
        return Ok(repository.to_string());
    };

    let mut url = Url::parse(repository)
        .map_err(|e| anyhow::anyhow!("Invalid repository URL '{}': {}", repository, e))?;
    let username = credentials
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or("x-access-token");
    url.set_username(username)
        .and_then(|_| url.set_password(Some(token)))
        .map_err(|_| anyhow::anyhow!("Cannot attach credentials to '{}'", repository))?;
    Ok(url.to_string())
}
