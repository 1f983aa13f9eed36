//! Typed failures returned by every engine operation.

use thiserror::Error;

use crate::types::{Amount, PhaseId, ProjectId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("phase {phase} not found in project {project}")]
    PhaseNotFound { project: ProjectId, phase: PhaseId },

    #[error("caller is not the initiator of project {0}")]
    Unauthorized(ProjectId),

    #[error("project {0} is not active")]
    ProjectInactive(ProjectId),

    #[error("phase {phase} of project {project} is closed")]
    PhaseClosed { project: ProjectId, phase: PhaseId },

    #[error("caller is not eligible: {0}")]
    NotEligible(String),

    #[error("caller already voted on phase {phase} of project {project}")]
    AlreadyVoted { project: ProjectId, phase: PhaseId },

    #[error("contribution to project {0} was already refunded")]
    AlreadyRefunded(ProjectId),

    #[error("phase {phase} of project {project} was already withdrawn")]
    AlreadyWithdrawn { project: ProjectId, phase: PhaseId },

    #[error("phase {phase} of project {project} is not approved")]
    NotApproved { project: ProjectId, phase: PhaseId },

    #[error("project {project} holds {held} in escrow, {requested} requested")]
    InsufficientEscrow {
        project: ProjectId,
        held: Amount,
        requested: Amount,
    },

    #[error("project {0} still has unreleased approved phases or unpaid refunds")]
    OutstandingObligations(ProjectId),

    #[error("project {project} cannot be {action} in its current state")]
    InvalidState {
        project: ProjectId,
        action: &'static str,
    },

    #[error("ledger imbalance on project {project}: {detail}")]
    LedgerImbalance { project: ProjectId, detail: String },
}

impl EscrowError {
    /// Stable machine-readable code, shared with collaborators.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::ProjectNotFound(_) | Self::PhaseNotFound { .. } => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::ProjectInactive(_) => "project_inactive",
            Self::PhaseClosed { .. } => "phase_closed",
            Self::NotEligible(_) => "not_eligible",
            Self::AlreadyVoted { .. } => "already_voted",
            Self::AlreadyRefunded(_) => "already_refunded",
            Self::AlreadyWithdrawn { .. } => "already_withdrawn",
            Self::NotApproved { .. } => "not_approved",
            Self::InsufficientEscrow { .. } => "insufficient_escrow",
            Self::OutstandingObligations(_) => "outstanding_obligations",
            Self::InvalidState { .. } => "invalid_state",
            Self::LedgerImbalance { .. } => "ledger_imbalance",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProjectNotFound(_) | Self::PhaseNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;
