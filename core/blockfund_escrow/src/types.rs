//! # Types
//!
//! Shared identifiers and the read-only snapshots handed out by the engine.
//!
//! ## Design decisions
//!
//! ### Records vs snapshots
//!
//! Internally a project lives as a [`ProjectRecord`](crate::registry::ProjectRecord)
//! plus an [`EscrowAccount`](crate::ledger::EscrowAccount) in the ledger.
//! The public API never hands out references to either; readers get the owned
//! [`Project`] / [`Phase`] snapshots defined here, so a UI may cache them
//! between calls.
//!
//! ### Status as a Finite-State Machine
//!
//! [`ProjectStatus`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Active ──► Successful   (expiry observed, raised >= goal)
//!    ├─────► Failed       (expiry observed, raised <  goal)
//!    └─────► Withdrawn    (initiator cancelled before expiry)
//! ```
//!
//! `Successful`, `Failed` and `Withdrawn` are terminal. Archival and removal
//! are separate administrative flags layered on top of an inactive status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Project identifier. Assigned from 1 upwards and never reused.
pub type ProjectId = u64;

/// Phase identifier, sequential within its project starting at 1.
pub type PhaseId = u32;

/// Amount in the smallest currency unit.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Authenticated identity of a caller (initiator, backer or voter).
///
/// The engine never inspects the contents; it only compares principals.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle status of a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Accepting backing, phase proposals and votes.
    Active,
    /// Expired with `raised >= goal`; escrow is released phase by phase.
    Successful,
    /// Expired with `raised < goal`; backers may withdraw refunds.
    Failed,
    /// Cancelled by the initiator before expiry; refunds are open.
    Withdrawn,
}

impl ProjectStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Dispositions under which backers are owed their money back.
    pub fn refunds_open(self) -> bool {
        matches!(self, Self::Failed | Self::Withdrawn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Withdrawn => "withdrawn",
        }
    }
}

/// Snapshot of a milestone phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub note: String,
    /// Amount released to the initiator once the phase is approved.
    pub goal: Amount,
    pub approved: bool,
    /// Funds for this phase have been paid out. Terminal.
    pub withdrawn: bool,
    pub approvals: u32,
    pub rejections: u32,
    pub proposed_at: Timestamp,
}

/// Snapshot of a project as observed at a given `now`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub initiator: Principal,
    pub name: String,
    pub summary: String,
    pub goal: Amount,
    /// Sum of all non-refunded contributions.
    pub raised: Amount,
    pub created_at: Timestamp,
    pub expiry: Timestamp,
    /// Effective status; expiry is applied on read even before it is settled.
    pub status: ProjectStatus,
    pub active: bool,
    pub archived: bool,
    pub removed: bool,
    /// Distinct backers who have ever contributed.
    pub backers: u32,
    pub phases: Vec<Phase>,
}

/// Snapshot of one backer's position in one project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionView {
    pub amount: Amount,
    pub refunded: bool,
    /// What was actually returned on refund. Equals `amount` unless earlier
    /// phase payouts had already drawn down the escrow.
    pub refund_paid: Amount,
}

/// Money movements for one project's escrow account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSummary {
    /// Everything ever contributed.
    pub received: Amount,
    /// Still custodied by the engine.
    pub held: Amount,
    /// Released to the initiator through approved phases.
    pub paid_out: Amount,
    /// Returned to backers.
    pub refunded: Amount,
}
