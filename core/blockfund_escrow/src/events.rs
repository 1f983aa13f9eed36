//! Events emitted by committed engine operations.
//!
//! A failed call emits nothing. Sequence numbers are assigned at commit time
//! and increase by one per event, so a collaborator can detect gaps.

use serde::{Deserialize, Serialize};

use crate::types::{Amount, PhaseId, Principal, ProjectId, Timestamp};

/// All event kinds the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A project was launched.
    ProjectLaunched,
    /// A backer contributed to a project.
    ProjectBacked,
    /// Expiry was recorded; the status carries the disposition.
    ProjectSettled,
    /// The initiator cancelled before expiry.
    ProjectWithdrawn,
    /// The initiator proposed a milestone phase.
    PhaseProposed,
    /// A backer voted on a phase.
    VoteCast,
    /// A phase reached majority and quorum.
    PhaseApproved,
    /// An approved phase was paid to the initiator.
    PaymentReleased,
    /// A backer's contribution was returned.
    RefundPaid,
    ProjectArchived,
    ProjectRemoved,
}

impl EventKind {
    /// Short identifier suitable for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectLaunched => "project_launched",
            Self::ProjectBacked => "project_backed",
            Self::ProjectSettled => "project_settled",
            Self::ProjectWithdrawn => "project_withdrawn",
            Self::PhaseProposed => "phase_proposed",
            Self::VoteCast => "vote_cast",
            Self::PhaseApproved => "phase_approved",
            Self::PaymentReleased => "payment_released",
            Self::RefundPaid => "refund_paid",
            Self::ProjectArchived => "project_archived",
            Self::ProjectRemoved => "project_removed",
        }
    }

    /// Inverse of [`EventKind::as_str`].
    #[cfg(test)]
    pub(crate) fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "project_launched" => Self::ProjectLaunched,
            "project_backed" => Self::ProjectBacked,
            "project_settled" => Self::ProjectSettled,
            "project_withdrawn" => Self::ProjectWithdrawn,
            "phase_proposed" => Self::PhaseProposed,
            "vote_cast" => Self::VoteCast,
            "phase_approved" => Self::PhaseApproved,
            "payment_released" => Self::PaymentReleased,
            "refund_paid" => Self::RefundPaid,
            "project_archived" => Self::ProjectArchived,
            "project_removed" => Self::ProjectRemoved,
            _ => return None,
        };
        Some(kind)
    }
}

/// A committed engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEvent {
    pub seq: u64,
    pub kind: EventKind,
    pub project_id: ProjectId,
    pub phase_id: Option<PhaseId>,
    pub actor: Option<Principal>,
    pub amount: Option<Amount>,
    /// Free-form detail: the settled status, or the vote direction.
    pub detail: Option<String>,
    pub at: Timestamp,
}

/// Event under construction; sequence and time are filled in on commit.
#[derive(Debug, Clone)]
pub(crate) struct Draft {
    kind: EventKind,
    project_id: ProjectId,
    phase_id: Option<PhaseId>,
    actor: Option<Principal>,
    amount: Option<Amount>,
    detail: Option<String>,
}

impl Draft {
    pub(crate) fn new(kind: EventKind, project_id: ProjectId) -> Self {
        Self {
            kind,
            project_id,
            phase_id: None,
            actor: None,
            amount: None,
            detail: None,
        }
    }

    pub(crate) fn kind(&self) -> EventKind {
        self.kind
    }

    pub(crate) fn phase(mut self, phase: PhaseId) -> Self {
        self.phase_id = Some(phase);
        self
    }

    pub(crate) fn actor(mut self, actor: &Principal) -> Self {
        self.actor = Some(actor.clone());
        self
    }

    pub(crate) fn amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub(crate) fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn seal(self, seq: u64, at: Timestamp) -> EscrowEvent {
        EscrowEvent {
            seq,
            kind: self.kind,
            project_id: self.project_id,
            phase_id: self.phase_id,
            actor: self.actor,
            amount: self.amount,
            detail: self.detail,
            at,
        }
    }
}
