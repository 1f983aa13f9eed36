//! # Project registry
//!
//! Owns every project ever launched, including archived and removed ones, so
//! ids `1..=count` always resolve.
//!
//! Expiry is observed lazily. A read derives the effective status from `now`
//! without writing; the first committed mutation that touches an expired
//! project settles it ([`ProjectRecord::settle_expiry`]).

use std::collections::BTreeMap;

use crate::config::{check_text, EngineConfig};
use crate::error::{EscrowError, Result};
use crate::ledger::EscrowAccount;
use crate::phases::PhaseRecord;
use crate::types::{Amount, PhaseId, Principal, Project, ProjectId, ProjectStatus, Timestamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub initiator: Principal,
    pub name: String,
    pub summary: String,
    pub goal: Amount,
    pub raised: Amount,
    pub created_at: Timestamp,
    pub expiry: Timestamp,
    /// Last settled status. May lag behind [`ProjectRecord::effective_status`].
    pub status: ProjectStatus,
    pub archived: bool,
    pub removed: bool,
    pub phases: Vec<PhaseRecord>,
}

impl ProjectRecord {
    pub fn new(
        id: ProjectId,
        initiator: Principal,
        name: String,
        summary: String,
        goal: Amount,
        created_at: Timestamp,
        expiry: Timestamp,
    ) -> Self {
        Self {
            id,
            initiator,
            name,
            summary,
            goal,
            raised: 0,
            created_at,
            expiry,
            status: ProjectStatus::Active,
            archived: false,
            removed: false,
            phases: Vec::new(),
        }
    }

    /// Status with expiry applied as of `now`.
    pub fn effective_status(&self, now: Timestamp) -> ProjectStatus {
        match self.status {
            ProjectStatus::Active if now >= self.expiry => {
                if self.raised >= self.goal {
                    ProjectStatus::Successful
                } else {
                    ProjectStatus::Failed
                }
            }
            status => status,
        }
    }

    pub fn is_active_at(&self, now: Timestamp) -> bool {
        !self.removed && self.effective_status(now).is_active()
    }

    /// Record the expiry disposition. Returns the new status on the first
    /// call after expiry, `None` otherwise.
    pub fn settle_expiry(&mut self, now: Timestamp) -> Option<ProjectStatus> {
        let effective = self.effective_status(now);
        if effective == self.status {
            return None;
        }
        self.status = effective;
        Some(effective)
    }

    pub fn phase(&self, id: PhaseId) -> Result<&PhaseRecord> {
        let project = self.id;
        id.checked_sub(1)
            .and_then(|idx| self.phases.get(idx as usize))
            .ok_or(EscrowError::PhaseNotFound { project, phase: id })
    }

    pub fn phase_mut(&mut self, id: PhaseId) -> Result<&mut PhaseRecord> {
        let project = self.id;
        id.checked_sub(1)
            .and_then(|idx| self.phases.get_mut(idx as usize))
            .ok_or(EscrowError::PhaseNotFound { project, phase: id })
    }

    pub fn view(&self, now: Timestamp, backers: usize) -> Project {
        let status = self.effective_status(now);
        Project {
            id: self.id,
            initiator: self.initiator.clone(),
            name: self.name.clone(),
            summary: self.summary.clone(),
            goal: self.goal,
            raised: self.raised,
            created_at: self.created_at,
            expiry: self.expiry,
            status,
            active: !self.removed && status.is_active(),
            archived: self.archived,
            removed: self.removed,
            backers: u32::try_from(backers).unwrap_or(u32::MAX),
            phases: self.phases.iter().map(PhaseRecord::view).collect(),
        }
    }

    fn require_initiator(&self, caller: &Principal) -> Result<()> {
        if *caller != self.initiator {
            return Err(EscrowError::Unauthorized(self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: BTreeMap<ProjectId, ProjectRecord>,
    count: u64,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and build the next project. Nothing is stored until
    /// [`ProjectRegistry::save`].
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_launch(
        &self,
        initiator: &Principal,
        name: &str,
        summary: &str,
        goal: Amount,
        duration_secs: u64,
        now: Timestamp,
        config: &EngineConfig,
    ) -> Result<ProjectRecord> {
        check_text("name", name, config.max_name_len, true)?;
        check_text("summary", summary, config.max_summary_len, false)?;
        if goal == 0 {
            return Err(EscrowError::InvalidInput("goal must be positive".to_string()));
        }
        if duration_secs == 0 {
            return Err(EscrowError::InvalidInput(
                "duration must be positive".to_string(),
            ));
        }
        let expiry = now
            .checked_add(duration_secs)
            .ok_or_else(|| EscrowError::InvalidInput("expiry overflows".to_string()))?;
        let id = self
            .count
            .checked_add(1)
            .ok_or_else(|| EscrowError::InvalidInput("project ids exhausted".to_string()))?;

        Ok(ProjectRecord::new(
            id,
            initiator.clone(),
            name.to_string(),
            summary.to_string(),
            goal,
            now,
            expiry,
        ))
    }

    pub fn get(&self, id: ProjectId) -> Result<&ProjectRecord> {
        self.projects.get(&id).ok_or(EscrowError::ProjectNotFound(id))
    }

    /// Copy of a project for staging a mutation.
    pub fn load(&self, id: ProjectId) -> Result<ProjectRecord> {
        self.get(id).cloned()
    }

    /// Store a staged project. New ids advance the counter.
    pub fn save(&mut self, record: ProjectRecord) {
        self.count = self.count.max(record.id);
        self.projects.insert(record.id, record);
    }

    /// Every project ever created, removed ones included.
    pub fn count(&self) -> u64 {
        self.count
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.projects.values()
    }

    /// Projects still flagged active whose expiry has passed.
    pub fn expired_unsettled(&self, now: Timestamp) -> Vec<ProjectId> {
        self.projects
            .values()
            .filter(|p| p.status.is_active() && now >= p.expiry)
            .map(|p| p.id)
            .collect()
    }
}

/// Initiator cancels a project before expiry.
pub fn withdraw(project: &mut ProjectRecord, caller: &Principal, now: Timestamp) -> Result<()> {
    project.require_initiator(caller)?;
    if !project.is_active_at(now) {
        return Err(EscrowError::ProjectInactive(project.id));
    }
    project.status = ProjectStatus::Withdrawn;
    Ok(())
}

pub fn archive(project: &mut ProjectRecord, caller: &Principal, now: Timestamp) -> Result<()> {
    project.require_initiator(caller)?;
    if project.removed || project.archived || project.is_active_at(now) {
        return Err(EscrowError::InvalidState {
            project: project.id,
            action: "archived",
        });
    }
    project.settle_expiry(now);
    project.archived = true;
    Ok(())
}

/// Remove an inactive project once nothing is owed on it.
pub fn remove(
    project: &mut ProjectRecord,
    account: &EscrowAccount,
    caller: &Principal,
    now: Timestamp,
) -> Result<()> {
    project.require_initiator(caller)?;
    if project.removed || project.is_active_at(now) {
        return Err(EscrowError::InvalidState {
            project: project.id,
            action: "removed",
        });
    }
    project.settle_expiry(now);

    // Once refunds open, approved phases can no longer be released.
    let refunds_open = project.status.refunds_open();
    let unreleased =
        !refunds_open && project.phases.iter().any(PhaseRecord::awaiting_release);
    let unpaid_refunds = refunds_open && account.unpaid_refunds() > 0;
    if unreleased || unpaid_refunds {
        return Err(EscrowError::OutstandingObligations(project.id));
    }

    project.removed = true;
    Ok(())
}
