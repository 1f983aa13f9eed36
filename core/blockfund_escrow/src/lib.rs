//! # BlockFund Escrow Core
//!
//! The authoritative state machine behind the BlockFund crowdfunding UI.
//! Projects raise funds until expiry; the initiator then draws the escrow
//! down phase by phase, each phase gated by a backer vote. Projects that
//! miss their goal (or are withdrawn) refund their backers.
//!
//! | Stage        | Entry point(s)                                           |
//! |--------------|----------------------------------------------------------|
//! | Launch       | [`EscrowEngine::launch_project`]                         |
//! | Funding      | [`EscrowEngine::back_project`]                           |
//! | Milestones   | `propose_phase`, `cast_vote`, `release_payment`          |
//! | Unwinding    | `withdraw_project`, `withdraw_refund`, `settle`          |
//! | Admin        | `archive`, `remove`                                      |
//! | Queries      | `fetch_project`, `fetch_phase`, `get_project_count`, ... |
//!
//! ## Architecture
//!
//! Rules live in [`registry`], [`phases`], [`voting`] and [`ledger`];
//! [`engine`] composes them into atomic operations and emits [`events`].
//! The engine is a plain value: callers serialise mutations through a single
//! owner (for example a write lock) and may share it for concurrent reads.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod phases;
pub mod registry;
pub mod types;
pub mod voting;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_events;
#[cfg(test)]
mod test_voting;

pub use clock::{Clock, ManualClock};
pub use config::EngineConfig;
pub use engine::EscrowEngine;
pub use error::{EscrowError, Result};
pub use events::{EscrowEvent, EventKind};
pub use types::{
    Amount, ContributionView, EscrowSummary, Phase, PhaseId, Principal, Project, ProjectId,
    ProjectStatus, Timestamp,
};
