//! # Escrow engine
//!
//! The single public entry point. Every mutating operation follows the same
//! shape:
//!
//! 1. load copies of the touched project and its escrow account, settling
//!    expiry on the copy;
//! 2. run the registry / phase / voting / ledger rules against the copies;
//! 3. check conservation and save both copies plus any credit together.
//!
//! Any error before step 3 drops the copies, so a failed call changes nothing
//! and emits no events.

use tracing::{debug, info};

use crate::clock::{Clock, HighWater};
use crate::config::EngineConfig;
use crate::error::{EscrowError, Result};
use crate::events::{Draft, EscrowEvent, EventKind};
use crate::ledger::{EscrowAccount, Ledger};
use crate::phases;
use crate::registry::{self, ProjectRecord, ProjectRegistry};
use crate::types::{
    Amount, ContributionView, EscrowSummary, Phase, PhaseId, Principal, Project, ProjectId,
    ProjectStatus, Timestamp,
};
use crate::voting;

/// Copies of one project's state being mutated by a single call.
struct Staged {
    now: Timestamp,
    project: ProjectRecord,
    account: EscrowAccount,
    credit: Option<(Principal, Amount)>,
    events: Vec<Draft>,
}

impl Staged {
    fn emit(&mut self, draft: Draft) {
        self.events.push(draft);
    }
}

pub struct EscrowEngine<C: Clock> {
    clock: C,
    high_water: HighWater,
    config: EngineConfig,
    registry: ProjectRegistry,
    ledger: Ledger,
    pending: Vec<EscrowEvent>,
    next_seq: u64,
}

impl<C: Clock> EscrowEngine<C> {
    pub fn new(clock: C, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(clock, config))
    }

    pub fn with_default_config(clock: C) -> Self {
        Self::build(clock, EngineConfig::default())
    }

    fn build(clock: C, config: EngineConfig) -> Self {
        Self {
            clock,
            high_water: HighWater::default(),
            config,
            registry: ProjectRegistry::new(),
            ledger: Ledger::new(),
            pending: Vec::new(),
            next_seq: 1,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Host time, clamped so it never moves backwards.
    pub fn now(&self) -> Timestamp {
        self.high_water.observe(self.clock.now())
    }

    // ─────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────

    /// Launch a project. `expiry = now + duration_secs`.
    pub fn launch_project(
        &mut self,
        initiator: &Principal,
        name: &str,
        summary: &str,
        goal: Amount,
        duration_secs: u64,
    ) -> Result<ProjectId> {
        let now = self.now();
        let record = match self.registry.prepare_launch(
            initiator,
            name,
            summary,
            goal,
            duration_secs,
            now,
            &self.config,
        ) {
            Ok(record) => record,
            Err(err) => return rejected("launch_project", err),
        };

        let id = record.id;
        let expiry = record.expiry;
        self.registry.save(record);
        self.ledger.open_account(id);
        self.publish(
            now,
            vec![Draft::new(EventKind::ProjectLaunched, id)
                .actor(initiator)
                .amount(goal)],
        );
        info!(project = id, initiator = %initiator, goal = %goal, expiry, "project launched");
        Ok(id)
    }

    /// Contribute `amount` to an active project. Returns the backer's total.
    pub fn back_project(
        &mut self,
        id: ProjectId,
        backer: &Principal,
        amount: Amount,
    ) -> Result<Amount> {
        let result = self.try_back(id, backer, amount);
        result.or_else(|err| rejected("back_project", err))
    }

    fn try_back(&mut self, id: ProjectId, backer: &Principal, amount: Amount) -> Result<Amount> {
        if amount == 0 {
            return Err(EscrowError::InvalidInput(
                "contribution must be positive".to_string(),
            ));
        }
        let mut staged = self.stage(id)?;
        if !staged.project.is_active_at(staged.now) {
            return Err(EscrowError::ProjectInactive(id));
        }

        let total = staged.account.record_contribution(backer, amount)?;
        staged.project.raised = staged
            .project
            .raised
            .checked_add(amount)
            .ok_or_else(|| EscrowError::InvalidInput("raised amount overflows".to_string()))?;
        staged.emit(
            Draft::new(EventKind::ProjectBacked, id)
                .actor(backer)
                .amount(amount),
        );
        self.commit(staged)?;
        debug!(project = id, backer = %backer, amount = %amount, "project backed");
        Ok(total)
    }

    /// Initiator appends a milestone phase. Returns its id.
    pub fn propose_phase(
        &mut self,
        id: ProjectId,
        caller: &Principal,
        note: &str,
        goal: Amount,
    ) -> Result<PhaseId> {
        let result = self.try_propose(id, caller, note, goal);
        result.or_else(|err| rejected("propose_phase", err))
    }

    fn try_propose(
        &mut self,
        id: ProjectId,
        caller: &Principal,
        note: &str,
        goal: Amount,
    ) -> Result<PhaseId> {
        let mut staged = self.stage(id)?;
        let status = staged.project.effective_status(staged.now);
        let phase = phases::propose(
            &mut staged.project,
            status,
            caller,
            note,
            goal,
            staged.now,
            &self.config,
        )?;
        staged.emit(
            Draft::new(EventKind::PhaseProposed, id)
                .phase(phase)
                .actor(caller)
                .amount(goal),
        );
        self.commit(staged)?;
        info!(project = id, phase, goal = %goal, "phase proposed");
        Ok(phase)
    }

    /// Record `voter`'s first and final vote on a phase, then re-evaluate
    /// approval. Returns the phase as it stands after the vote.
    pub fn cast_vote(
        &mut self,
        id: ProjectId,
        phase: PhaseId,
        voter: &Principal,
        support: bool,
    ) -> Result<Phase> {
        let result = self.try_vote(id, phase, voter, support);
        result.or_else(|err| rejected("cast_vote", err))
    }

    fn try_vote(
        &mut self,
        id: ProjectId,
        phase_id: PhaseId,
        voter: &Principal,
        support: bool,
    ) -> Result<Phase> {
        let mut staged = self.stage(id)?;
        if staged.project.removed || staged.project.status.refunds_open() {
            return Err(EscrowError::ProjectInactive(id));
        }

        let backers = staged.account.distinct_backers();
        let phase = staged.project.phase_mut(phase_id)?;
        let withdrawn = phase.withdrawn;
        voting::cast_vote(
            &mut phase.ballot,
            &staged.account,
            id,
            phase_id,
            withdrawn,
            voter,
            support,
        )?;
        let newly_approved = phases::evaluate_approval(phase, backers);
        let view = phase.view();

        staged.emit(
            Draft::new(EventKind::VoteCast, id)
                .phase(phase_id)
                .actor(voter)
                .detail(if support { "support" } else { "reject" }),
        );
        if newly_approved {
            staged.emit(Draft::new(EventKind::PhaseApproved, id).phase(phase_id));
        }
        self.commit(staged)?;

        debug!(project = id, phase = phase_id, voter = %voter, support, "vote cast");
        if newly_approved {
            info!(
                project = id,
                phase = phase_id,
                approvals = view.approvals,
                rejections = view.rejections,
                "phase approved"
            );
        }
        Ok(view)
    }

    /// Pay an approved phase to the initiator. Returns the amount paid.
    pub fn release_payment(
        &mut self,
        id: ProjectId,
        phase: PhaseId,
        caller: &Principal,
    ) -> Result<Amount> {
        let result = self.try_release(id, phase, caller);
        result.or_else(|err| rejected("release_payment", err))
    }

    fn try_release(&mut self, id: ProjectId, phase: PhaseId, caller: &Principal) -> Result<Amount> {
        let mut staged = self.stage(id)?;
        if staged.project.removed || staged.project.status.refunds_open() {
            return Err(EscrowError::ProjectInactive(id));
        }
        let amount = phases::release(&mut staged.project, &mut staged.account, phase, caller)?;
        let initiator = staged.project.initiator.clone();
        staged.credit = Some((initiator.clone(), amount));
        staged.emit(
            Draft::new(EventKind::PaymentReleased, id)
                .phase(phase)
                .actor(&initiator)
                .amount(amount),
        );
        self.commit(staged)?;
        info!(project = id, phase, amount = %amount, "phase payment released");
        Ok(amount)
    }

    /// Return `backer`'s contribution from a failed or withdrawn project.
    /// Returns the amount paid.
    pub fn withdraw_refund(&mut self, id: ProjectId, backer: &Principal) -> Result<Amount> {
        let result = self.try_refund(id, backer);
        result.or_else(|err| rejected("withdraw_refund", err))
    }

    fn try_refund(&mut self, id: ProjectId, backer: &Principal) -> Result<Amount> {
        let mut staged = self.stage(id)?;
        if !staged.project.status.refunds_open() {
            return Err(EscrowError::NotEligible(format!(
                "project {id} is {}, refunds are not open",
                staged.project.status.as_str()
            )));
        }

        let paid = staged.account.pay_refund(backer)?;
        staged.project.raised = staged.account.outstanding();
        staged.credit = Some((backer.clone(), paid));
        staged.emit(
            Draft::new(EventKind::RefundPaid, id)
                .actor(backer)
                .amount(paid),
        );
        self.commit(staged)?;
        info!(project = id, backer = %backer, amount = %paid, "refund paid");
        Ok(paid)
    }

    /// Initiator cancels an active project; refunds open for every backer.
    pub fn withdraw_project(&mut self, id: ProjectId, caller: &Principal) -> Result<()> {
        let result = self.try_withdraw(id, caller);
        result.or_else(|err| rejected("withdraw_project", err))
    }

    fn try_withdraw(&mut self, id: ProjectId, caller: &Principal) -> Result<()> {
        let mut staged = self.stage(id)?;
        registry::withdraw(&mut staged.project, caller, staged.now)?;
        staged.emit(Draft::new(EventKind::ProjectWithdrawn, id).actor(caller));
        self.commit(staged)?;
        info!(project = id, "project withdrawn by initiator");
        Ok(())
    }

    /// Record the expiry disposition if it is due. Idempotent.
    pub fn settle(&mut self, id: ProjectId) -> Result<ProjectStatus> {
        let result = self.try_settle(id);
        result.or_else(|err| rejected("settle", err))
    }

    fn try_settle(&mut self, id: ProjectId) -> Result<ProjectStatus> {
        let staged = self.stage(id)?;
        let status = staged.project.status;
        self.commit(staged)?;
        Ok(status)
    }

    /// Settle every project whose expiry has passed but is still flagged
    /// active. Returns the projects settled by this call.
    pub fn settle_expired(&mut self) -> Result<Vec<(ProjectId, ProjectStatus)>> {
        let now = self.now();
        let due = self.registry.expired_unsettled(now);
        let mut settled = Vec::with_capacity(due.len());
        for id in due {
            settled.push((id, self.settle(id)?));
        }
        Ok(settled)
    }

    pub fn archive(&mut self, id: ProjectId, caller: &Principal) -> Result<()> {
        let result = self.try_archive(id, caller);
        result.or_else(|err| rejected("archive", err))
    }

    fn try_archive(&mut self, id: ProjectId, caller: &Principal) -> Result<()> {
        let mut staged = self.stage(id)?;
        registry::archive(&mut staged.project, caller, staged.now)?;
        staged.emit(Draft::new(EventKind::ProjectArchived, id).actor(caller));
        self.commit(staged)?;
        info!(project = id, "project archived");
        Ok(())
    }

    /// Remove an inactive project with no outstanding payouts or refunds.
    pub fn remove(&mut self, id: ProjectId, caller: &Principal) -> Result<()> {
        let result = self.try_remove(id, caller);
        result.or_else(|err| rejected("remove", err))
    }

    fn try_remove(&mut self, id: ProjectId, caller: &Principal) -> Result<()> {
        let mut staged = self.stage(id)?;
        registry::remove(&mut staged.project, &staged.account, caller, staged.now)?;
        staged.emit(Draft::new(EventKind::ProjectRemoved, id).actor(caller));
        self.commit(staged)?;
        info!(project = id, "project removed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────

    pub fn fetch_project(&self, id: ProjectId) -> Result<Project> {
        let record = self.registry.get(id)?;
        let backers = self.ledger.account(id)?.distinct_backers();
        Ok(record.view(self.now(), backers))
    }

    pub fn fetch_phase(&self, id: ProjectId, phase: PhaseId) -> Result<Phase> {
        Ok(self.registry.get(id)?.phase(phase)?.view())
    }

    /// Every project ever created; ids `1..=count` are all fetchable.
    pub fn get_project_count(&self) -> u64 {
        self.registry.count()
    }

    /// `backer`'s position in a project; zero if they never contributed.
    pub fn fetch_contribution(&self, id: ProjectId, backer: &Principal) -> Result<ContributionView> {
        let account = self.ledger.account(id)?;
        Ok(account
            .contribution(backer)
            .map(|c| c.view())
            .unwrap_or_default())
    }

    pub fn escrow_summary(&self, id: ProjectId) -> Result<EscrowSummary> {
        Ok(self.ledger.account(id)?.summary())
    }

    /// Total the engine has paid out to `principal`.
    pub fn credited(&self, principal: &Principal) -> Amount {
        self.ledger.credited(principal)
    }

    /// Funds currently held across all projects.
    pub fn total_custodied(&self) -> Amount {
        self.ledger.custodied()
    }

    // ─────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────

    /// Events committed but not yet acknowledged, oldest first.
    pub fn pending_events(&self) -> &[EscrowEvent] {
        &self.pending
    }

    /// Drop pending events up to and including `seq`.
    pub fn acknowledge(&mut self, seq: u64) {
        self.pending.retain(|event| event.seq > seq);
    }

    pub fn drain_events(&mut self) -> Vec<EscrowEvent> {
        std::mem::take(&mut self.pending)
    }

    // ─────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn stage(&self, id: ProjectId) -> Result<Staged> {
        let now = self.now();
        let mut project = self.registry.load(id)?;
        let account = self.ledger.load_account(id)?;
        let mut events = Vec::new();
        if let Some(status) = project.settle_expiry(now) {
            events.push(Draft::new(EventKind::ProjectSettled, id).detail(status.as_str()));
        }
        Ok(Staged {
            now,
            project,
            account,
            credit: None,
            events,
        })
    }

    fn commit(&mut self, staged: Staged) -> Result<()> {
        let Staged {
            now,
            project,
            account,
            credit,
            events,
        } = staged;

        let custodied = self.ledger.prepare(
            &account,
            project.raised,
            credit.as_ref().map(|(principal, amount)| (principal, *amount)),
        )?;
        let settled = events
            .iter()
            .any(|draft| draft.kind() == EventKind::ProjectSettled)
            .then_some(project.status);

        let id = project.id;
        self.ledger.save_account(account, custodied, credit);
        self.registry.save(project);
        if let Some(status) = settled {
            info!(project = id, status = status.as_str(), "project settled");
        }
        self.publish(now, events);
        Ok(())
    }

    fn publish(&mut self, now: Timestamp, drafts: Vec<Draft>) {
        for draft in drafts {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.pending.push(draft.seal(seq, now));
        }
    }
}

fn rejected<T>(op: &'static str, err: EscrowError) -> Result<T> {
    debug!(op, code = err.code(), error = %err, "operation rejected");
    Err(err)
}
