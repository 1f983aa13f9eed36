#![allow(dead_code)]

use crate::clock::Clock;
use crate::engine::EscrowEngine;
use crate::types::Amount;

/// INV-1: `raised` equals the sum of non-refunded contributions.
pub fn assert_raised_matches_contributions<C: Clock>(engine: &EscrowEngine<C>) {
    for project in engine.registry().iter() {
        let account = engine.ledger().account(project.id).expect("account exists");
        assert_eq!(
            project.raised,
            account.outstanding(),
            "INV-1 violated: project {} raised {} but {} outstanding",
            project.id,
            project.raised,
            account.outstanding()
        );
    }
}

/// INV-2: conservation per account.
pub fn assert_conservation<C: Clock>(engine: &EscrowEngine<C>) {
    for project in engine.registry().iter() {
        let account = engine.ledger().account(project.id).expect("account exists");
        let summary = account.summary();
        assert_eq!(
            summary.held + summary.paid_out + summary.refunded,
            summary.received,
            "INV-2 violated: project {} {:?}",
            project.id,
            summary
        );
        account
            .check_conservation(project.raised)
            .expect("INV-2 violated: ledger check failed");
    }
}

/// INV-3: the custodied total is the sum of every account's escrow.
pub fn assert_custody_total<C: Clock>(engine: &EscrowEngine<C>) {
    let held: Amount = engine.ledger().accounts().map(|a| a.held()).sum();
    assert_eq!(
        held,
        engine.total_custodied(),
        "INV-3 violated: accounts hold {} but custodied is {}",
        held,
        engine.total_custodied()
    );
}

/// INV-4: `withdrawn ⇒ approved` for every phase.
pub fn assert_withdrawn_implies_approved<C: Clock>(engine: &EscrowEngine<C>) {
    for project in engine.registry().iter() {
        for phase in &project.phases {
            assert!(
                !phase.withdrawn || phase.approved,
                "INV-4 violated: project {} phase {} withdrawn without approval",
                project.id,
                phase.id
            );
        }
    }
}

/// INV-5: tallies match the recorded votes.
pub fn assert_tallies_match_votes<C: Clock>(engine: &EscrowEngine<C>) {
    for project in engine.registry().iter() {
        for phase in &project.phases {
            let cast = phase.ballot.approvals() as usize + phase.ballot.rejections() as usize;
            assert_eq!(
                cast,
                phase.ballot.len(),
                "INV-5 violated: project {} phase {} tallies {} vs {} votes",
                project.id,
                phase.id,
                cast,
                phase.ballot.len()
            );
        }
    }
}

/// INV-6: project ids are sequential from 1 and the count covers them all.
pub fn assert_sequential_ids<C: Clock>(engine: &EscrowEngine<C>) {
    for (i, project) in engine.registry().iter().enumerate() {
        assert_eq!(
            project.id,
            i as u64 + 1,
            "INV-6 violated: expected id {}, got {}",
            i + 1,
            project.id
        );
    }
    assert_eq!(
        engine.get_project_count(),
        engine.registry().iter().count() as u64
    );
}

/// Run every invariant.
pub fn assert_all<C: Clock>(engine: &EscrowEngine<C>) {
    assert_raised_matches_contributions(engine);
    assert_conservation(engine);
    assert_custody_total(engine);
    assert_withdrawn_implies_approved(engine);
    assert_tallies_match_votes(engine);
    assert_sequential_ids(engine);
}
