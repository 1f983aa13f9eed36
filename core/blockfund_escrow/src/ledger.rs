//! # Ledger
//!
//! Typed tables for every unit of money the engine custodies.
//!
//! ## Tables
//!
//! | Key                   | Type            | Description                              |
//! |-----------------------|-----------------|------------------------------------------|
//! | `project`             | `EscrowAccount` | Escrow balance and movement totals       |
//! | `(project, backer)`   | `Contribution`  | Cumulative amount and refund flag        |
//! | `principal`           | `Amount`        | Total ever paid out to that principal    |
//!
//! plus a running `custodied` total across all accounts.
//!
//! ## Load / save
//!
//! Mutations never touch the tables in place. The engine loads a copy of an
//! account, applies the operation, checks conservation, and saves the copy
//! back. A failed operation simply drops its copy.
//!
//! ## Conservation
//!
//! For every account at every save:
//!
//! ```text
//! held + paid_out + refunded == received
//! outstanding == sum(contributions not yet refunded) == project.raised
//! ```

use std::collections::BTreeMap;

use crate::error::{EscrowError, Result};
use crate::types::{Amount, ContributionView, EscrowSummary, Principal, ProjectId};

/// One backer's position in one project.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Contribution {
    pub amount: Amount,
    pub refunded: bool,
    pub refund_paid: Amount,
}

impl Contribution {
    pub fn is_active(&self) -> bool {
        self.amount > 0 && !self.refunded
    }

    pub fn view(&self) -> ContributionView {
        ContributionView {
            amount: self.amount,
            refunded: self.refunded,
            refund_paid: self.refund_paid,
        }
    }
}

/// Escrow account of a single project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscrowAccount {
    project: ProjectId,
    contributions: BTreeMap<Principal, Contribution>,
    received: Amount,
    held: Amount,
    paid_out: Amount,
    refunded: Amount,
    /// Contributions not yet refunded. Mirrors `Project::raised`.
    outstanding: Amount,
}

impl EscrowAccount {
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            contributions: BTreeMap::new(),
            received: 0,
            held: 0,
            paid_out: 0,
            refunded: 0,
            outstanding: 0,
        }
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn contribution(&self, backer: &Principal) -> Option<&Contribution> {
        self.contributions.get(backer)
    }

    pub fn has_active_contribution(&self, backer: &Principal) -> bool {
        self.contributions
            .get(backer)
            .is_some_and(Contribution::is_active)
    }

    /// Every backer who ever contributed, refunded or not.
    pub fn distinct_backers(&self) -> usize {
        self.contributions.len()
    }

    /// Contributions that would still be owed back if refunds were open.
    pub fn unpaid_refunds(&self) -> usize {
        self.contributions.values().filter(|c| c.is_active()).count()
    }

    pub fn held(&self) -> Amount {
        self.held
    }

    pub fn outstanding(&self) -> Amount {
        self.outstanding
    }

    pub fn summary(&self) -> EscrowSummary {
        EscrowSummary {
            received: self.received,
            held: self.held,
            paid_out: self.paid_out,
            refunded: self.refunded,
        }
    }

    /// Add `amount` to `backer`'s running total. Returns the new total.
    ///
    /// The caller is responsible for the project being open for backing.
    pub fn record_contribution(&mut self, backer: &Principal, amount: Amount) -> Result<Amount> {
        if amount == 0 {
            return Err(EscrowError::InvalidInput(
                "contribution must be positive".to_string(),
            ));
        }
        let overflow = || EscrowError::InvalidInput("contribution overflows".to_string());
        let received = self.received.checked_add(amount).ok_or_else(overflow)?;
        let held = self.held.checked_add(amount).ok_or_else(overflow)?;
        let outstanding = self.outstanding.checked_add(amount).ok_or_else(overflow)?;

        let entry = self.contributions.entry(backer.clone()).or_default();
        let total = entry.amount.checked_add(amount).ok_or_else(overflow)?;
        entry.amount = total;

        self.received = received;
        self.held = held;
        self.outstanding = outstanding;
        Ok(total)
    }

    /// Return `backer`'s money exactly once. Returns the amount paid.
    ///
    /// While no phase has been paid out the full contribution comes back.
    /// Otherwise each backer receives the same fraction of their contribution
    /// that is still held, and the last one to claim takes the remainder.
    pub fn pay_refund(&mut self, backer: &Principal) -> Result<Amount> {
        let project = self.project;
        let contribution = match self.contributions.get(backer) {
            Some(c) if c.amount > 0 => c.clone(),
            _ => {
                return Err(EscrowError::NotEligible(format!(
                    "{backer} has no contribution to project {project}"
                )))
            }
        };
        if contribution.refunded {
            return Err(EscrowError::AlreadyRefunded(project));
        }

        let share = if self.held >= self.outstanding {
            contribution.amount
        } else if contribution.amount >= self.outstanding {
            self.held
        } else {
            mul_div_floor(contribution.amount, self.held, self.outstanding).ok_or_else(|| {
                EscrowError::LedgerImbalance {
                    project,
                    detail: "refund share overflows".to_string(),
                }
            })?
        };

        let imbalance = |detail: &str| EscrowError::LedgerImbalance {
            project,
            detail: detail.to_string(),
        };
        let held = self
            .held
            .checked_sub(share)
            .ok_or_else(|| imbalance("refund exceeds escrow"))?;
        let outstanding = self
            .outstanding
            .checked_sub(contribution.amount)
            .ok_or_else(|| imbalance("refund exceeds outstanding contributions"))?;
        let refunded = self
            .refunded
            .checked_add(share)
            .ok_or_else(|| imbalance("refund total overflows"))?;

        if let Some(entry) = self.contributions.get_mut(backer) {
            entry.refunded = true;
            entry.refund_paid = share;
        }
        self.held = held;
        self.outstanding = outstanding;
        self.refunded = refunded;
        Ok(share)
    }

    /// Move `amount` out of escrow toward the initiator.
    pub fn pay_phase(&mut self, amount: Amount) -> Result<()> {
        if self.held < amount {
            return Err(EscrowError::InsufficientEscrow {
                project: self.project,
                held: self.held,
                requested: amount,
            });
        }
        let paid_out = self
            .paid_out
            .checked_add(amount)
            .ok_or_else(|| EscrowError::LedgerImbalance {
                project: self.project,
                detail: "payout total overflows".to_string(),
            })?;
        self.held -= amount;
        self.paid_out = paid_out;
        Ok(())
    }

    /// Verify the conservation equations against the project's `raised`.
    pub fn check_conservation(&self, raised: Amount) -> Result<()> {
        let imbalance = |detail: String| EscrowError::LedgerImbalance {
            project: self.project,
            detail,
        };

        let accounted = self
            .held
            .checked_add(self.paid_out)
            .and_then(|v| v.checked_add(self.refunded))
            .ok_or_else(|| imbalance("accounted total overflows".to_string()))?;
        if accounted != self.received {
            return Err(imbalance(format!(
                "held {} + paid out {} + refunded {} != received {}",
                self.held, self.paid_out, self.refunded, self.received
            )));
        }

        let active: Amount = self
            .contributions
            .values()
            .filter(|c| !c.refunded)
            .map(|c| c.amount)
            .sum();
        if active != self.outstanding || self.outstanding != raised {
            return Err(imbalance(format!(
                "active contributions {active}, outstanding {}, raised {raised}",
                self.outstanding
            )));
        }
        Ok(())
    }
}

/// `floor(a * b / d)` without intermediate overflow. `None` if `d == 0` or
/// the result itself does not fit.
fn mul_div_floor(a: Amount, b: Amount, d: Amount) -> Option<Amount> {
    if d == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / d);
    }

    // a*b/d = (a/d)*b + (a%d)*b/d; the second term by binary long division.
    let base = (a / d).checked_mul(b)?;
    let a_rem = a % d;
    let mut quotient: Amount = 0;
    let mut rem: Amount = 0;
    for bit in (0..Amount::BITS).rev() {
        quotient = quotient.checked_mul(2)?;
        let (doubled, carried) = rem.overflowing_add(rem);
        rem = doubled;
        if carried || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient = quotient.checked_add(1)?;
        }
        if (b >> bit) & 1 == 1 {
            let (sum, carried) = rem.overflowing_add(a_rem);
            rem = sum;
            if carried || rem >= d {
                rem = rem.wrapping_sub(d);
                quotient = quotient.checked_add(1)?;
            }
        }
    }
    base.checked_add(quotient)
}

/// All escrow accounts plus per-principal credits.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: BTreeMap<ProjectId, EscrowAccount>,
    credits: BTreeMap<Principal, Amount>,
    custodied: Amount,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&mut self, project: ProjectId) {
        self.accounts
            .entry(project)
            .or_insert_with(|| EscrowAccount::new(project));
    }

    pub fn account(&self, project: ProjectId) -> Result<&EscrowAccount> {
        self.accounts
            .get(&project)
            .ok_or(EscrowError::ProjectNotFound(project))
    }

    /// Copy of an account for staging a mutation.
    pub fn load_account(&self, project: ProjectId) -> Result<EscrowAccount> {
        self.account(project).cloned()
    }

    /// Check a staged account before it is saved.
    ///
    /// Returns the custodied total that [`Ledger::save_account`] will record.
    pub fn prepare(
        &self,
        account: &EscrowAccount,
        raised: Amount,
        credit: Option<(&Principal, Amount)>,
    ) -> Result<Amount> {
        account.check_conservation(raised)?;
        let previous = self.account(account.project())?.held();
        let custodied = self
            .custodied
            .checked_sub(previous)
            .and_then(|v| v.checked_add(account.held()))
            .ok_or_else(|| EscrowError::LedgerImbalance {
                project: account.project(),
                detail: "custodied total out of range".to_string(),
            })?;
        if let Some((principal, amount)) = credit {
            let current = self.credited(principal);
            if current.checked_add(amount).is_none() {
                return Err(EscrowError::LedgerImbalance {
                    project: account.project(),
                    detail: format!("credit to {principal} overflows"),
                });
            }
        }
        Ok(custodied)
    }

    /// Commit a staged account. `custodied` must come from [`Ledger::prepare`]
    /// on the same account.
    pub fn save_account(
        &mut self,
        account: EscrowAccount,
        custodied: Amount,
        credit: Option<(Principal, Amount)>,
    ) {
        if let Some((principal, amount)) = credit {
            let balance = self.credits.entry(principal).or_default();
            *balance = balance.saturating_add(amount);
        }
        self.custodied = custodied;
        self.accounts.insert(account.project(), account);
    }

    /// Total ever paid out to `principal` (phase releases and refunds).
    pub fn credited(&self, principal: &Principal) -> Amount {
        self.credits.get(principal).copied().unwrap_or(0)
    }

    /// Funds currently held across every project.
    pub fn custodied(&self) -> Amount {
        self.custodied
    }

    #[cfg(test)]
    pub(crate) fn accounts(&self) -> impl Iterator<Item = &EscrowAccount> {
        self.accounts.values()
    }
}
