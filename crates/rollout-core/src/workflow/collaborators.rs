//! Interfaces of the steps the workflow drives, plus the default config builder.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::InstallerError;
use crate::types::{
    AppOfAppsConfig, ChartConfiguration, ChartInstallConfig, InstallationRequest, ValuesMap,
};

/// Produces the chart configuration for a run.
///
/// May prompt. Must leave no files behind when it fails.
pub trait ConfigurationCollector: Send + Sync {
    fn collect(&self) -> anyhow::Result<ChartConfiguration>;

    /// Read the base values without prompting (dry-run path).
    fn load_base_values(&self) -> anyhow::Result<ValuesMap>;
}

/// Picks the target environment.
pub trait TargetSelector: Send + Sync {
    /// `Ok(None)` (or an empty name) means the user chose to stop.
    fn select(&self, args: &[String], verbose: bool) -> anyhow::Result<Option<String>>;
}

pub trait ConfirmationPrompt: Send + Sync {
    fn confirm(&self, target: &str) -> anyhow::Result<bool>;
}

/// Refreshes local certificates. Failures are never fatal.
pub trait CertificateRegenerator: Send + Sync {
    fn regenerate(&self) -> anyhow::Result<()>;
}

pub trait ConfigurationBuilder: Send + Sync {
    fn build(
        &self,
        request: &InstallationRequest,
        target: &str,
        temp_values_path: Option<&Path>,
    ) -> anyhow::Result<ChartInstallConfig>;
}

/// Applies the charts to the target.
///
/// Must report a missing source branch as [`InstallerError::BranchNotFound`].
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    async fn install(
        &self,
        token: &CancellationToken,
        config: &ChartInstallConfig,
    ) -> Result<(), InstallerError>;
}

/// Waits for the remote manifest set to converge after install.
#[async_trait]
pub trait SyncWaiter: Send + Sync {
    async fn wait(
        &self,
        token: &CancellationToken,
        config: &ChartInstallConfig,
    ) -> Result<(), InstallerError>;
}

/// Builds the install config from the request and the selected target.
#[derive(Debug, Clone)]
pub struct DefaultConfigBuilder {
    namespace: String,
    sync_timeout: Duration,
}

impl DefaultConfigBuilder {
    pub fn new(namespace: impl Into<String>, sync_timeout: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            sync_timeout,
        }
    }
}

impl Default for DefaultConfigBuilder {
    fn default() -> Self {
        Self::new("argocd", Duration::from_secs(30 * 60))
    }
}

impl ConfigurationBuilder for DefaultConfigBuilder {
    fn build(
        &self,
        request: &InstallationRequest,
        target: &str,
        temp_values_path: Option<&Path>,
    ) -> anyhow::Result<ChartInstallConfig> {
        if target.trim().is_empty() {
            anyhow::bail!("Target name must not be empty");
        }

        let repo = &request.repository;
        url::Url::parse(&repo.url)
            .with_context(|| format!("Invalid repository URL: {}", repo.url))?;
        if repo.branch.trim().is_empty() {
            anyhow::bail!("Repository branch must not be empty");
        }

        Ok(ChartInstallConfig {
            target: target.to_string(),
            force: request.force,
            dry_run: request.dry_run,
            verbose: request.verbose,
            silent: request.silent,
            app_of_apps: Some(AppOfAppsConfig {
                repository_url: repo.url.clone(),
                branch: repo.branch.clone(),
                credentials: request.credentials.clone(),
                cert_dir: request.cert_dir.clone(),
                values_file: temp_values_path.map(Path::to_path_buf),
                namespace: self.namespace.clone(),
                sync_timeout: self.sync_timeout,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_app_of_apps_from_request() {
        let req = InstallationRequest::new(vec![])
            .with_repository("https://github.com/acme/platform", "develop")
            .with_force(true);

        let config = DefaultConfigBuilder::default()
            .build(&req, "dev", Some(Path::new("helm-values-tmp.yaml")))
            .unwrap();

        assert_eq!(config.target, "dev");
        assert!(config.force);
        assert!(config.has_app_of_apps());
        let app = config.app_of_apps.unwrap();
        assert_eq!(app.branch, "develop");
        assert_eq!(app.namespace, "argocd");
        assert_eq!(
            app.values_file.as_deref(),
            Some(Path::new("helm-values-tmp.yaml"))
        );
    }

    #[test]
    fn rejects_invalid_repository_url() {
        let req = InstallationRequest::new(vec![]).with_repository("not a url", "main");
        let err = DefaultConfigBuilder::default()
            .build(&req, "dev", None)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid repository URL"));
    }

    #[test]
    fn rejects_empty_branch() {
        let req =
            InstallationRequest::new(vec![]).with_repository("https://github.com/acme/x", " ");
        assert!(DefaultConfigBuilder::default().build(&req, "dev", None).is_err());
    }
}
