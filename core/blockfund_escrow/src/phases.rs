//! # Phase manager
//!
//! Milestone phases within a project. A phase moves forward only:
//!
//! ```text
//! proposed ──(vote reaches majority + quorum)──► approved ──(release)──► withdrawn
//! ```
//!
//! `approved` is never unset and `withdrawn` is terminal, so
//! `withdrawn ⇒ approved` holds for every phase at every point.

use crate::config::{check_text, EngineConfig};
use crate::error::{EscrowError, Result};
use crate::ledger::EscrowAccount;
use crate::registry::ProjectRecord;
use crate::types::{Amount, Phase, PhaseId, Principal, ProjectStatus, Timestamp};
use crate::voting::{Ballot, Verdict};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseRecord {
    pub id: PhaseId,
    pub note: String,
    pub goal: Amount,
    pub proposed_at: Timestamp,
    pub approved: bool,
    pub withdrawn: bool,
    pub ballot: Ballot,
}

impl PhaseRecord {
    pub fn view(&self) -> Phase {
        Phase {
            id: self.id,
            note: self.note.clone(),
            goal: self.goal,
            approved: self.approved,
            withdrawn: self.withdrawn,
            approvals: self.ballot.approvals(),
            rejections: self.ballot.rejections(),
            proposed_at: self.proposed_at,
        }
    }

    /// Approved and not yet paid out.
    pub fn awaiting_release(&self) -> bool {
        self.approved && !self.withdrawn
    }
}

/// Append a new phase to `project`. Returns its id.
pub fn propose(
    project: &mut ProjectRecord,
    status: ProjectStatus,
    caller: &Principal,
    note: &str,
    goal: Amount,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<PhaseId> {
    if *caller != project.initiator {
        return Err(EscrowError::Unauthorized(project.id));
    }
    if !status.is_active() || project.removed {
        return Err(EscrowError::ProjectInactive(project.id));
    }
    check_text("note", note, config.max_note_len, true)?;
    if goal == 0 {
        return Err(EscrowError::InvalidInput(
            "phase goal must be positive".to_string(),
        ));
    }
    if project.phases.len() >= config.max_phases_per_project {
        return Err(EscrowError::InvalidInput(format!(
            "project {} already has {} phases",
            project.id,
            project.phases.len()
        )));
    }

    let id = project.phases.len() as PhaseId + 1;
    project.phases.push(PhaseRecord {
        id,
        note: note.to_string(),
        goal,
        proposed_at: now,
        approved: false,
        withdrawn: false,
        ballot: Ballot::new(),
    });
    Ok(id)
}

/// Re-tally a phase against the project's backer count.
///
/// Returns `true` only on the transition into `approved`.
pub fn evaluate_approval(phase: &mut PhaseRecord, distinct_backers: usize) -> bool {
    if phase.approved {
        return false;
    }
    if phase.ballot.verdict(distinct_backers) == Verdict::Approved {
        phase.approved = true;
        return true;
    }
    false
}

/// Pay the phase goal to the initiator and close the phase.
///
/// Both the escrow debit and the `withdrawn` flag land on the staged copies;
/// if the debit fails neither is kept.
pub fn release(
    project: &mut ProjectRecord,
    account: &mut EscrowAccount,
    phase_id: PhaseId,
    caller: &Principal,
) -> Result<Amount> {
    let project_id = project.id;
    if *caller != project.initiator {
        return Err(EscrowError::Unauthorized(project_id));
    }
    let phase = project.phase_mut(phase_id)?;
    if !phase.approved {
        return Err(EscrowError::NotApproved {
            project: project_id,
            phase: phase_id,
        });
    }
    if phase.withdrawn {
        return Err(EscrowError::AlreadyWithdrawn {
            project: project_id,
            phase: phase_id,
        });
    }

    account.pay_phase(phase.goal)?;
    phase.withdrawn = true;
    Ok(phase.goal)
}
