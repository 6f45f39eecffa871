//! Settings for the installer
//!
//! Settings live in `rollout.toml`, either in the user config directory or in
//! the project directory. A project file takes precedence when present.

pub mod parser;
pub mod paths;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::types::{DEFAULT_BRANCH, DEFAULT_REPOSITORY_URL};
use crate::values::{BASE_VALUES_FILE, TEMP_VALUES_FILE};
use crate::workflow::WorkflowOptions;

pub use parser::{parse_settings, parse_settings_str, to_toml};
pub use paths::{SettingsScope, default_cert_dir, settings_path_for_scope};
pub use store::SettingsStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSettings {
    pub repository: RepositorySettings,
    pub values: ValuesSettings,
    pub retry: RetrySettings,
    pub install: InstallSettings,
    pub certificates: CertificateSettings,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    pub url: String,
    pub branch: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_REPOSITORY_URL.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuesSettings {
    pub base_file: PathBuf,
    pub temp_file: PathBuf,
}

impl Default for ValuesSettings {
    fn default() -> Self {
        Self {
            base_file: PathBuf::from(BASE_VALUES_FILE),
            temp_file: PathBuf::from(TEMP_VALUES_FILE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::INSTALLATION;
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_secs: policy.initial_delay.as_secs(),
            max_delay_secs: policy.max_delay.as_secs(),
            backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSettings {
    /// Upper bound for the whole installation phase, retries included
    pub timeout_minutes: u64,
    /// Namespace the app-of-apps release goes into
    pub namespace: String,
    pub release_name: String,
    /// Chart reference passed to `helm upgrade --install`
    pub chart: String,
    /// Argo CD chart installed before the app-of-apps release, if set
    pub argocd_chart: Option<String>,
    pub argocd_release: String,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            timeout_minutes: 60,
            namespace: "argocd".to_string(),
            release_name: "app-of-apps".to_string(),
            chart: "manifests/app-of-apps".to_string(),
            argocd_chart: None,
            argocd_release: "argocd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateSettings {
    /// Defaults to `<config dir>/rollout/certs`
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub poll_interval_secs: u64,
    pub timeout_minutes: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            timeout_minutes: 30,
        }
    }
}

/// Upper bound for `install.timeout_minutes` and `sync.timeout_minutes`.
pub const MAX_TIMEOUT_MINUTES: u64 = 24 * 60;

/// Upper bound for retry delays.
pub const MAX_RETRY_DELAY_SECS: u64 = 60 * 60;

impl RolloutSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.repository.url)
            .with_context(|| format!("Invalid repository URL: '{}'", self.repository.url))?;
        if self.repository.branch.trim().is_empty() {
            anyhow::bail!("Repository branch must not be empty");
        }

        let retry = &self.retry;
        if retry.max_attempts < 1 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !(retry.backoff_multiplier >= 1.0) {
            anyhow::bail!(
                "retry.backoff_multiplier must be at least 1.0, got {}",
                retry.backoff_multiplier
            );
        }
        if retry.max_delay_secs > MAX_RETRY_DELAY_SECS {
            anyhow::bail!(
                "retry.max_delay_secs must be at most {}, got {}",
                MAX_RETRY_DELAY_SECS,
                retry.max_delay_secs
            );
        }
        if retry.initial_delay_secs > retry.max_delay_secs {
            anyhow::bail!(
                "retry.initial_delay_secs ({}) exceeds retry.max_delay_secs ({})",
                retry.initial_delay_secs,
                retry.max_delay_secs
            );
        }

        if !(1..=MAX_TIMEOUT_MINUTES).contains(&self.install.timeout_minutes) {
            anyhow::bail!(
                "install.timeout_minutes must be between 1 and {}, got {}",
                MAX_TIMEOUT_MINUTES,
                self.install.timeout_minutes
            );
        }
        if self.sync.timeout_minutes > MAX_TIMEOUT_MINUTES {
            anyhow::bail!(
                "sync.timeout_minutes must be at most {}, got {}",
                MAX_TIMEOUT_MINUTES,
                self.sync.timeout_minutes
            );
        }
        if self.install.namespace.trim().is_empty() {
            anyhow::bail!("install.namespace must not be empty");
        }
        if self.install.argocd_chart.is_some() && self.install.argocd_release.trim().is_empty() {
            anyhow::bail!("install.argocd_release must not be empty when argocd_chart is set");
        }
        if self.sync.poll_interval_secs < 1 {
            anyhow::bail!("sync.poll_interval_secs must be at least 1");
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            RetryPolicy::INSTALLATION.name,
            self.retry.max_attempts,
            Duration::from_secs(self.retry.initial_delay_secs),
            Duration::from_secs(self.retry.max_delay_secs),
            self.retry.backoff_multiplier,
        )
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install.timeout_minutes.saturating_mul(60))
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout_minutes.saturating_mul(60))
    }

    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            retry_policy: self.retry_policy(),
            install_timeout: self.install_timeout(),
            base_values_file: self.values.base_file.clone(),
            temp_values_file: self.values.temp_file.clone(),
        }
    }
}
