//! Error taxonomy for installation runs.
//!
//! Errors fall into four classes:
//!
//! - **Cancellation**: user interrupt, installation deadline, or a declined
//!   confirmation. All surface as [`InstallError::Cancelled`].
//! - **Non-retryable domain errors** such as a missing source branch. These
//!   pass through the orchestrator unwrapped.
//! - **Retryable operational errors**: anything else the installer raises.
//!   Retried per policy, then wrapped with the target name.
//! - **Best-effort failures** (certificate refresh, ledger cleanup). These are
//!   logged and collected as warnings, never returned.

use std::fmt;

use thiserror::Error;

use crate::retry::RetryableError;

/// Why a run ended in the cancelled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's token was already cancelled when the run started
    AlreadyCancelled,
    /// An interrupt or termination signal arrived
    Interrupted,
    /// The installation phase hit its deadline
    TimedOut,
    /// The user declined the confirmation prompt
    Declined,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CancelReason::AlreadyCancelled => "cancelled before start",
            CancelReason::Interrupted => "cancelled by user",
            CancelReason::TimedOut => "installation deadline exceeded",
            CancelReason::Declined => "declined by user",
        };
        f.write_str(text)
    }
}

/// Retry classification of an installer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Safe to retry after backoff
    Transient,
    /// Retrying cannot help
    Permanent,
    /// The run is being torn down
    Cancelled,
}

/// Errors reported by a [`ChartInstaller`](crate::workflow::ChartInstaller)
/// or [`SyncWaiter`](crate::workflow::SyncWaiter).
#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("branch '{branch}' not found in {repository}")]
    BranchNotFound { repository: String, branch: String },

    #[error("installation cancelled")]
    Cancelled,

    /// A failure that will not go away on retry (bad credentials, invalid chart).
    #[error(transparent)]
    Permanent(anyhow::Error),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl InstallerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallerError::BranchNotFound { .. } | InstallerError::Permanent(_) => {
                ErrorKind::Permanent
            }
            InstallerError::Cancelled => ErrorKind::Cancelled,
            InstallerError::Failed(_) => ErrorKind::Transient,
        }
    }
}

impl RetryableError for InstallerError {
    fn kind(&self) -> ErrorKind {
        InstallerError::kind(self)
    }

    fn cancelled() -> Self {
        InstallerError::Cancelled
    }
}

/// Fatal outcome of an installation run.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("installation cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    #[error("branch '{branch}' not found in repository {repository}")]
    BranchNotFound { repository: String, branch: String },

    #[error("failed to prepare base values for dry-run")]
    BaseValues(#[source] anyhow::Error),

    #[error("configuration wizard failed")]
    Configuration(#[source] anyhow::Error),

    #[error("target selection failed")]
    TargetSelection(#[source] anyhow::Error),

    #[error("{operation} {component} failed on target '{target}'")]
    Chart {
        operation: &'static str,
        component: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },
}

impl InstallError {
    pub fn cancelled(reason: CancelReason) -> Self {
        InstallError::Cancelled { reason }
    }

    /// Assembly of the install configuration failed.
    pub fn assembly(target: impl Into<String>, source: anyhow::Error) -> Self {
        InstallError::Chart {
            operation: "configuration",
            component: "build",
            target: target.into(),
            source,
        }
    }

    /// The installer gave up after retries.
    pub fn installation(target: impl Into<String>, source: InstallerError) -> Self {
        InstallError::Chart {
            operation: "installation",
            component: "chart",
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, InstallError::Cancelled { .. })
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            InstallError::Cancelled { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Target named by the error, if the failure happened after selection.
    pub fn target(&self) -> Option<&str> {
        match self {
            InstallError::Chart { target, .. } => Some(target),
            _ => None,
        }
    }
}
