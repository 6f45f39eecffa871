//! Installation workflow
//!
//! - `collaborators`: the step interfaces and the default config builder
//! - `state`: run state machine and report
//! - `orchestrator`: drives a run end to end

pub mod collaborators;
pub mod orchestrator;
pub mod state;

pub use collaborators::{
    CertificateRegenerator, ChartInstaller, ConfigurationBuilder, ConfigurationCollector,
    ConfirmationPrompt, DefaultConfigBuilder, SyncWaiter, TargetSelector,
};
pub use orchestrator::{
    Collaborators, DEFAULT_INSTALL_TIMEOUT, InstallationWorkflow, WorkflowOptions,
};
pub use state::{WorkflowOutcome, WorkflowReport, WorkflowState};
