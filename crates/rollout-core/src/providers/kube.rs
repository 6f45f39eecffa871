//! Kubernetes contexts and Argo CD sync status via `kubectl`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::InstallerError;
use crate::types::ChartInstallConfig;
use crate::workflow::{SyncWaiter, TargetSelector};

use super::command;

/// Names of all contexts in the active kubeconfig.
pub fn list_contexts() -> anyhow::Result<Vec<String>> {
    let output = command::run_blocking("kubectl", &["config", "get-contexts", "-o", "name"])
        .context("Failed to list kube contexts")?;
    Ok(parse_contexts(&output))
}

pub fn parse_contexts(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
enum ContextSource {
    Kubectl,
    Fixed(Vec<String>),
}

/// Non-interactive target selection.
///
/// Takes the first positional argument, else the only available context.
#[derive(Debug, Clone)]
pub struct ArgsTargetSelector {
    source: ContextSource,
}

impl ArgsTargetSelector {
    pub fn new() -> Self {
        Self {
            source: ContextSource::Kubectl,
        }
    }

    pub fn with_contexts(contexts: Vec<String>) -> Self {
        Self {
            source: ContextSource::Fixed(contexts),
        }
    }

    fn contexts(&self) -> anyhow::Result<Vec<String>> {
        match &self.source {
            ContextSource::Kubectl => list_contexts(),
            ContextSource::Fixed(contexts) => Ok(contexts.clone()),
        }
    }
}

impl Default for ArgsTargetSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetSelector for ArgsTargetSelector {
    fn select(&self, args: &[String], verbose: bool) -> anyhow::Result<Option<String>> {
        let requested = args.iter().map(|a| a.trim()).find(|a| !a.is_empty());
        let contexts = self.contexts()?;
        if verbose {
            debug!(?contexts, "Available targets");
        }

        match requested {
            Some(name) if contexts.iter().any(|c| c == name) => Ok(Some(name.to_string())),
            Some(name) => anyhow::bail!(
                "Target '{}' not found. Available: {}",
                name,
                display_list(&contexts)
            ),
            None => match contexts.as_slice() {
                [] => anyhow::bail!("No targets found. Create a cluster first."),
                [only] => Ok(Some(only.clone())),
                _ => anyhow::bail!(
                    "Multiple targets available ({}); pass one as an argument",
                    display_list(&contexts)
                ),
            },
        }
    }
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationList {
    #[serde(default)]
    pub items: Vec<Application>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Application {
    pub metadata: ApplicationMetadata,
    #[serde(default)]
    pub status: ApplicationStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationMetadata {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationStatus {
    #[serde(default)]
    pub sync: StatusField,
    #[serde(default)]
    pub health: StatusField,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusField {
    #[serde(default)]
    pub status: String,
}

impl Application {
    pub fn is_ready(&self) -> bool {
        self.status.sync.status == "Synced" && self.status.health.status == "Healthy"
    }
}

impl ApplicationList {
    /// Names of applications not yet synced and healthy.
    pub fn pending(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|app| !app.is_ready())
            .map(|app| app.metadata.name.as_str())
            .collect()
    }

    pub fn is_converged(&self) -> bool {
        !self.items.is_empty() && self.pending().is_empty()
    }
}

/// Polls Argo CD applications until every one is synced and healthy.
#[derive(Debug, Clone)]
pub struct KubectlSyncWaiter {
    poll_interval: Duration,
}

impl KubectlSyncWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    async fn fetch(&self, namespace: &str) -> anyhow::Result<ApplicationList> {
        let args: Vec<String> = [
            "get",
            "applications.argoproj.io",
            "-n",
            namespace,
            "-o",
            "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let output = command::run("kubectl", &args).await?;
        serde_json::from_str(&output).context("Failed to parse application list")
    }
}

#[async_trait]
impl SyncWaiter for KubectlSyncWaiter {
    async fn wait(
        &self,
        token: &CancellationToken,
        config: &ChartInstallConfig,
    ) -> Result<(), InstallerError> {
        let Some(app) = &config.app_of_apps else {
            return Ok(());
        };

        info!(namespace = %app.namespace, "Waiting for applications to sync");
        let deadline = Instant::now() + app.sync_timeout;

        loop {
            match self.fetch(&app.namespace).await {
                Ok(list) if list.is_converged() => {
                    info!(count = list.items.len(), "All applications synced and healthy");
                    return Ok(());
                }
                Ok(list) => debug!(pending = ?list.pending(), "Applications not ready"),
                // The CRD may not exist yet right after the first install.
                Err(e) => debug!(error = %e, "Application status unavailable"),
            }

            if Instant::now() >= deadline {
                return Err(InstallerError::Failed(anyhow::anyhow!(
                    "Applications in '{}' did not sync within {}s",
                    app.namespace,
                    app.sync_timeout.as_secs()
                )));
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(InstallerError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
