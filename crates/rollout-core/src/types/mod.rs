//! Request and configuration types shared by the workflow and its collaborators.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_yaml::Mapping;

/// Repository used when neither flags nor settings name one.
pub const DEFAULT_REPOSITORY_URL: &str = "https://github.com/rollout-dev/platform";

/// Branch used when neither flags nor settings name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Parsed contents of a values file.
pub type ValuesMap = Mapping;

/// Source repository coordinates for the app-of-apps manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    pub url: String,
    pub branch: String,
}

impl Default for RepositorySpec {
    fn default() -> Self {
        Self {
            url: DEFAULT_REPOSITORY_URL.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

/// Optional credentials forwarded to the installer.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialHints {
    pub username: Option<String>,
    pub token: Option<String>,
}

impl fmt::Debug for CredentialHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHints")
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Immutable input for a single installation run.
#[derive(Debug, Clone, Default)]
pub struct InstallationRequest {
    /// Positional arguments handed to the target selector
    pub args: Vec<String>,
    /// Reinstall even if the release already exists
    pub force: bool,
    /// Render and validate without applying anything
    pub dry_run: bool,
    pub verbose: bool,
    /// Suppress installer output
    pub silent: bool,
    pub repository: RepositorySpec,
    pub credentials: CredentialHints,
    /// Certificate directory override (auto-detected when `None`)
    pub cert_dir: Option<PathBuf>,
}

impl InstallationRequest {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }

    /// Request against the default repository and branch.
    pub fn with_defaults(args: Vec<String>, force: bool, dry_run: bool, verbose: bool) -> Self {
        Self::new(args)
            .with_force(force)
            .with_dry_run(dry_run)
            .with_verbose(verbose)
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_repository(mut self, url: impl Into<String>, branch: impl Into<String>) -> Self {
        self.repository = RepositorySpec {
            url: url.into(),
            branch: branch.into(),
        };
        self
    }

    pub fn with_credentials(mut self, username: Option<String>, token: Option<String>) -> Self {
        self.credentials = CredentialHints { username, token };
        self
    }

    pub fn with_cert_dir(mut self, cert_dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = Some(cert_dir.into());
        self
    }
}

/// Output of the configuration step.
#[derive(Debug, Clone, Default)]
pub struct ChartConfiguration {
    /// Persistent values file, never written by a run
    pub base_values_path: PathBuf,
    /// Throwaway values file handed to the installer
    pub temp_values_path: Option<PathBuf>,
    pub existing_values: ValuesMap,
    /// Top-level sections changed relative to the base file
    pub modified_sections: Vec<String>,
}

impl ChartConfiguration {
    /// Temp values path, treating an empty path as absent.
    pub fn temp_values(&self) -> Option<&Path> {
        self.temp_values_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// App-of-apps manifest settings nested in the install config.
#[derive(Debug, Clone, PartialEq)]
pub struct AppOfAppsConfig {
    pub repository_url: String,
    pub branch: String,
    pub credentials: CredentialHints,
    pub cert_dir: Option<PathBuf>,
    pub values_file: Option<PathBuf>,
    pub namespace: String,
    /// Upper bound for the remote sync wait
    pub sync_timeout: Duration,
}

/// Fully resolved configuration passed to the installer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartInstallConfig {
    pub target: String,
    pub force: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub silent: bool,
    pub app_of_apps: Option<AppOfAppsConfig>,
}

impl ChartInstallConfig {
    /// True when a dependent manifest set has to be synced after install.
    pub fn has_app_of_apps(&self) -> bool {
        self.app_of_apps
            .as_ref()
            .is_some_and(|app| !app.repository_url.is_empty())
    }
}
