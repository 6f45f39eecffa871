//! Rollout Core Library
//!
//! Drives the chart installation workflow against a provisioned target:
//! configuration, target selection, confirmation, certificate refresh,
//! retry-wrapped installation and temp-file cleanup.

pub mod cancel;
pub mod config;
pub mod error;
pub mod ledger;
pub mod providers;
pub mod retry;
pub mod types;
pub mod values;
pub mod workflow;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::cancel::CancellationBridge;
    pub use crate::config::{RolloutSettings, SettingsStore};
    pub use crate::error::{CancelReason, ErrorKind, InstallError, InstallerError};
    pub use crate::ledger::{LedgerResolution, TempFileLedger};
    pub use crate::retry::{RetryExecutor, RetryPolicy};
    pub use crate::types::{ChartConfiguration, ChartInstallConfig, InstallationRequest};
    pub use crate::workflow::{
        Collaborators, InstallationWorkflow, WorkflowOptions, WorkflowOutcome, WorkflowReport,
        WorkflowState,
    };
}
