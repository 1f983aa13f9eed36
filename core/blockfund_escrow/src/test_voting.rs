use crate::invariants::assert_all;
use crate::{EscrowEngine, EscrowError, ManualClock, PhaseId, Principal, ProjectId};

const HOUR: u64 = 3_600;

fn setup() -> (EscrowEngine<ManualClock>, ManualClock) {
    let clock = ManualClock::new(1_700_000_000);
    let engine = EscrowEngine::with_default_config(clock.clone());
    (engine, clock)
}

fn initiator() -> Principal {
    Principal::new("GINIT")
}

fn backers() -> [Principal; 3] {
    ["GB1", "GB2", "GB3"].map(Principal::from)
}

/// A funded project with three backers of 400 each and one proposed phase.
fn funded_with_phase(
    engine: &mut EscrowEngine<ManualClock>,
    phase_goal: u128,
) -> (ProjectId, PhaseId) {
    let id = engine
        .launch_project(&initiator(), "Bakery", "Ovens and a storefront", 1_000, HOUR)
        .unwrap();
    for backer in backers() {
        engine.back_project(id, &backer, 400).unwrap();
    }
    let phase = engine
        .propose_phase(id, &initiator(), "Buy ovens", phase_goal)
        .unwrap();
    (id, phase)
}

#[test]
fn scenario_c_majority_with_quorum_releases_once() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    let [b1, b2, b3] = backers();

    let after_first = engine.cast_vote(id, phase, &b1, true).unwrap();
    assert!(!after_first.approved);
    let after_second = engine.cast_vote(id, phase, &b2, false).unwrap();
    assert!(!after_second.approved);
    let after_third = engine.cast_vote(id, phase, &b3, true).unwrap();
    assert_eq!((after_third.approvals, after_third.rejections), (2, 1));
    assert!(after_third.approved);

    assert_eq!(engine.release_payment(id, phase, &initiator()), Ok(200));
    assert_eq!(
        engine.release_payment(id, phase, &initiator()),
        Err(EscrowError::AlreadyWithdrawn { project: id, phase })
    );

    let view = engine.fetch_phase(id, phase).unwrap();
    assert!(view.approved && view.withdrawn);
    assert_eq!(engine.escrow_summary(id).unwrap().held, 1_000);
    assert_eq!(engine.credited(&initiator()), 200);
    assert_all(&engine);
}

#[test]
fn scenario_d_release_before_votes_not_approved() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    assert_eq!(
        engine.release_payment(id, phase, &initiator()),
        Err(EscrowError::NotApproved { project: id, phase })
    );
    assert!(!engine.fetch_phase(id, phase).unwrap().withdrawn);
}

#[test]
fn second_vote_rejected_tallies_unchanged() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    let [b1, ..] = backers();

    engine.cast_vote(id, phase, &b1, false).unwrap();
    assert_eq!(
        engine.cast_vote(id, phase, &b1, true),
        Err(EscrowError::AlreadyVoted { project: id, phase })
    );
    let view = engine.fetch_phase(id, phase).unwrap();
    assert_eq!((view.approvals, view.rejections), (0, 1));
    assert_all(&engine);
}

#[test]
fn tie_does_not_approve() {
    let (mut engine, _clock) = setup();
    let id = engine
        .launch_project(&initiator(), "Duo", "", 100, HOUR)
        .unwrap();
    let (a, b) = (Principal::new("GA"), Principal::new("GB"));
    engine.back_project(id, &a, 50).unwrap();
    engine.back_project(id, &b, 50).unwrap();
    let phase = engine.propose_phase(id, &initiator(), "Tools", 10).unwrap();

    engine.cast_vote(id, phase, &a, true).unwrap();
    let view = engine.cast_vote(id, phase, &b, false).unwrap();
    assert!(!view.approved);
}

#[test]
fn quorum_counts_backers_who_never_vote() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    let extra = ["GB4", "GB5"].map(Principal::from);
    for backer in &extra {
        engine.back_project(id, backer, 10).unwrap();
    }
    let [b1, b2, b3] = backers();

    engine.cast_vote(id, phase, &b1, true).unwrap();
    let view = engine.cast_vote(id, phase, &b2, true).unwrap();
    // 2 of 5 backers is below quorum even with no rejections
    assert!(!view.approved);
    let view = engine.cast_vote(id, phase, &b3, true).unwrap();
    assert!(view.approved);
}

#[test]
fn approval_survives_later_rejections() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    let [b1, b2, b3] = backers();
    engine.cast_vote(id, phase, &b1, true).unwrap();
    assert!(engine.cast_vote(id, phase, &b2, true).unwrap().approved);

    let view = engine.cast_vote(id, phase, &b3, false).unwrap();
    assert!(view.approved);
    assert_eq!((view.approvals, view.rejections), (2, 1));
}

#[test]
fn non_backer_cannot_vote() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    assert!(matches!(
        engine.cast_vote(id, phase, &"GOUTSIDER".into(), true),
        Err(EscrowError::NotEligible(_))
    ));
    // the initiator has not contributed either
    assert!(matches!(
        engine.cast_vote(id, phase, &initiator(), true),
        Err(EscrowError::NotEligible(_))
    ));
}

#[test]
fn withdrawn_phase_is_closed_to_votes() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    let [b1, b2, b3] = backers();
    engine.cast_vote(id, phase, &b1, true).unwrap();
    engine.cast_vote(id, phase, &b2, true).unwrap();
    engine.release_payment(id, phase, &initiator()).unwrap();

    assert_eq!(
        engine.cast_vote(id, phase, &b3, true),
        Err(EscrowError::PhaseClosed { project: id, phase })
    );
}

#[test]
fn release_fails_atomically_on_insufficient_escrow() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 5_000);
    let [b1, b2, _] = backers();
    engine.cast_vote(id, phase, &b1, true).unwrap();
    engine.cast_vote(id, phase, &b2, true).unwrap();
    let events_before = engine.pending_events().len();

    assert_eq!(
        engine.release_payment(id, phase, &initiator()),
        Err(EscrowError::InsufficientEscrow {
            project: id,
            held: 1_200,
            requested: 5_000
        })
    );
    let view = engine.fetch_phase(id, phase).unwrap();
    assert!(view.approved);
    assert!(!view.withdrawn);
    assert_eq!(engine.credited(&initiator()), 0);
    assert_eq!(engine.pending_events().len(), events_before);
    assert_all(&engine);
}

#[test]
fn only_initiator_proposes_and_releases() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    let [b1, b2, _] = backers();

    assert_eq!(
        engine.propose_phase(id, &b1, "Mine", 10),
        Err(EscrowError::Unauthorized(id))
    );
    engine.cast_vote(id, phase, &b1, true).unwrap();
    engine.cast_vote(id, phase, &b2, true).unwrap();
    assert_eq!(
        engine.release_payment(id, phase, &b1),
        Err(EscrowError::Unauthorized(id))
    );
}

#[test]
fn proposals_close_at_expiry_but_votes_continue() {
    let (mut engine, clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    clock.advance(HOUR);

    assert_eq!(
        engine.propose_phase(id, &initiator(), "Late", 10),
        Err(EscrowError::ProjectInactive(id))
    );
    let [b1, b2, _] = backers();
    engine.cast_vote(id, phase, &b1, true).unwrap();
    assert!(engine.cast_vote(id, phase, &b2, true).unwrap().approved);
    assert_eq!(engine.release_payment(id, phase, &initiator()), Ok(200));
    assert_all(&engine);
}

#[test]
fn refunded_backer_cannot_vote() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    engine.withdraw_project(id, &initiator()).unwrap();
    let [b1, ..] = backers();
    engine.withdraw_refund(id, &b1).unwrap();

    // refunds open: the project no longer takes votes at all
    assert_eq!(
        engine.cast_vote(id, phase, &b1, true),
        Err(EscrowError::ProjectInactive(id))
    );
}

#[test]
fn unknown_phase_is_not_found() {
    let (mut engine, _clock) = setup();
    let (id, _) = funded_with_phase(&mut engine, 200);
    let [b1, ..] = backers();
    assert_eq!(
        engine.cast_vote(id, 9, &b1, true),
        Err(EscrowError::PhaseNotFound { project: id, phase: 9 })
    );
    assert_eq!(
        engine.release_payment(id, 9, &initiator()),
        Err(EscrowError::PhaseNotFound { project: id, phase: 9 })
    );
}

#[test]
fn approved_phase_cannot_drain_refunds_after_failure() {
    let (mut engine, clock) = setup();
    let id = engine
        .launch_project(&initiator(), "Bakery", "", 10_000, HOUR)
        .unwrap();
    for backer in backers() {
        engine.back_project(id, &backer, 400).unwrap();
    }
    let phase = engine.propose_phase(id, &initiator(), "Deposit", 900).unwrap();
    let [b1, b2, b3] = backers();
    engine.cast_vote(id, phase, &b1, true).unwrap();
    assert!(engine.cast_vote(id, phase, &b2, true).unwrap().approved);

    clock.advance(HOUR);
    assert_eq!(
        engine.release_payment(id, phase, &initiator()),
        Err(EscrowError::ProjectInactive(id))
    );
    assert_eq!(engine.credited(&initiator()), 0);
    for backer in [&b1, &b2, &b3] {
        assert_eq!(engine.withdraw_refund(id, backer), Ok(400));
    }

    // the stranded approval is not an obligation once refunds are paid
    engine.remove(id, &initiator()).unwrap();
    assert!(engine.fetch_project(id).unwrap().removed);
    assert_all(&engine);
}

#[test]
fn withdrawn_project_blocks_release() {
    let (mut engine, _clock) = setup();
    let (id, phase) = funded_with_phase(&mut engine, 200);
    let [b1, b2, _] = backers();
    engine.cast_vote(id, phase, &b1, true).unwrap();
    engine.cast_vote(id, phase, &b2, true).unwrap();
    engine.withdraw_project(id, &initiator()).unwrap();

    assert_eq!(
        engine.release_payment(id, phase, &initiator()),
        Err(EscrowError::ProjectInactive(id))
    );
    assert!(!engine.fetch_phase(id, phase).unwrap().withdrawn);
    assert_eq!(engine.withdraw_refund(id, &b1), Ok(400));
    assert_all(&engine);
}
