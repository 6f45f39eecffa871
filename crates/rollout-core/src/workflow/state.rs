//! Workflow state machine and run report.

use tracing::debug;

use crate::error::InstallError;
use crate::ledger::LedgerResolution;

/// Position of a run in the step sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkflowState {
    #[default]
    Pending,
    Configuring,
    SelectingTarget,
    Confirming,
    RefreshingCerts,
    Assembling,
    /// Retry-wrapped installation; attempts are counted on the report
    Installing,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Succeeded | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }

    /// Move to `next`. Terminal states never change; returns whether the move happened.
    pub fn advance(&mut self, next: WorkflowState) -> bool {
        if self.is_terminal() {
            debug!(from = ?self, to = ?next, "Ignoring transition out of terminal state");
            return false;
        }
        debug!(from = ?self, to = ?next, "Workflow transition");
        *self = next;
        true
    }
}

/// Final outcome of a run.
#[derive(Debug)]
pub enum WorkflowOutcome {
    Succeeded,
    Failed(InstallError),
    Cancelled(InstallError),
}

impl WorkflowOutcome {
    /// Classify an error as failure or cancellation.
    pub fn from_error(err: InstallError) -> Self {
        if err.is_cancellation() {
            WorkflowOutcome::Cancelled(err)
        } else {
            WorkflowOutcome::Failed(err)
        }
    }

    /// Terminal state matching this outcome.
    pub fn state(&self) -> WorkflowState {
        match self {
            WorkflowOutcome::Succeeded => WorkflowState::Succeeded,
            WorkflowOutcome::Failed(_) => WorkflowState::Failed,
            WorkflowOutcome::Cancelled(_) => WorkflowState::Cancelled,
        }
    }

    pub fn error(&self) -> Option<&InstallError> {
        match self {
            WorkflowOutcome::Succeeded => None,
            WorkflowOutcome::Failed(e) | WorkflowOutcome::Cancelled(e) => Some(e),
        }
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug)]
pub struct WorkflowReport {
    pub outcome: WorkflowOutcome,
    pub state: WorkflowState,
    /// Selected target, if selection completed
    pub target: Option<String>,
    /// How the temp-file ledger was resolved; `None` if nothing ran
    pub resolution: Option<LedgerResolution>,
    /// Installer invocations made
    pub attempts: u32,
    /// Non-fatal failures from best-effort steps
    pub warnings: Vec<String>,
}

impl WorkflowReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, WorkflowOutcome::Succeeded)
    }

    pub fn into_result(self) -> Result<(), InstallError> {
        match self.outcome {
            WorkflowOutcome::Succeeded => Ok(()),
            WorkflowOutcome::Failed(e) | WorkflowOutcome::Cancelled(e) => Err(e),
        }
    }
}
