//! Voting subsystem: one final vote per backer per phase.

use std::collections::BTreeMap;

use crate::error::{EscrowError, Result};
use crate::ledger::EscrowAccount;
use crate::types::{PhaseId, Principal, ProjectId};

/// Votes recorded for a phase, with tallies kept in step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ballot {
    votes: BTreeMap<Principal, bool>,
    approvals: u32,
    rejections: u32,
}

impl Ballot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn approvals(&self) -> u32 {
        self.approvals
    }

    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    pub fn vote_of(&self, voter: &Principal) -> Option<bool> {
        self.votes.get(voter).copied()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Record a first vote. Votes cannot be changed.
    fn record(&mut self, voter: &Principal, support: bool) -> bool {
        if self.votes.contains_key(voter) {
            return false;
        }
        self.votes.insert(voter.clone(), support);
        if support {
            self.approvals += 1;
        } else {
            self.rejections += 1;
        }
        true
    }

    /// Strict majority of cast votes plus quorum over `distinct_backers`.
    pub fn verdict(&self, distinct_backers: usize) -> Verdict {
        let approvals = self.approvals as usize;
        if self.approvals > self.rejections && approvals >= quorum(distinct_backers) {
            Verdict::Approved
        } else {
            Verdict::Pending
        }
    }
}

/// Outcome of tallying a ballot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Approved,
}

/// Smallest approval count that is more than half of `distinct_backers`.
pub fn quorum(distinct_backers: usize) -> usize {
    distinct_backers / 2 + 1
}

/// Validate and record `voter`'s vote on a phase ballot.
///
/// `withdrawn` is the phase's terminal flag; the caller re-evaluates approval
/// afterwards.
pub fn cast_vote(
    ballot: &mut Ballot,
    account: &EscrowAccount,
    project: ProjectId,
    phase: PhaseId,
    withdrawn: bool,
    voter: &Principal,
    support: bool,
) -> Result<()> {
    if !account.has_active_contribution(voter) {
        return Err(EscrowError::NotEligible(format!(
            "{voter} holds no active contribution to project {project}"
        )));
    }
    if ballot.vote_of(voter).is_some() {
        return Err(EscrowError::AlreadyVoted { project, phase });
    }
    if withdrawn {
        return Err(EscrowError::PhaseClosed { project, phase });
    }
    ballot.record(voter, support);
    Ok(())
}
