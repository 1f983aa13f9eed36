use crate::{EscrowEngine, EventKind, ManualClock, Principal};

const START: u64 = 1_700_000_000;
const HOUR: u64 = 3_600;

fn setup() -> (EscrowEngine<ManualClock>, ManualClock) {
    let clock = ManualClock::new(START);
    let engine = EscrowEngine::with_default_config(clock.clone());
    (engine, clock)
}

fn kinds(engine: &EscrowEngine<ManualClock>) -> Vec<EventKind> {
    engine.pending_events().iter().map(|e| e.kind).collect()
}

#[test]
fn test_project_launched_event() {
    let (mut engine, _clock) = setup();
    let creator = Principal::new("GCREATOR");
    let id = engine
        .launch_project(&creator, "Library", "Books", 5_000, HOUR)
        .unwrap();

    let last = engine.pending_events().last().expect("No events found");
    assert_eq!(last.seq, 1);
    assert_eq!(last.kind, EventKind::ProjectLaunched);
    assert_eq!(last.project_id, id);
    assert_eq!(last.actor.as_ref(), Some(&creator));
    assert_eq!(last.amount, Some(5_000));
    assert_eq!(last.at, START);
}

#[test]
fn test_project_backed_event() {
    let (mut engine, _clock) = setup();
    let donator = Principal::new("GDONOR");
    let id = engine
        .launch_project(&"GCREATOR".into(), "Library", "", 5_000, HOUR)
        .unwrap();
    engine.back_project(id, &donator, 1_000).unwrap();

    let last = engine.pending_events().last().expect("No events found");
    assert_eq!(last.seq, 2);
    assert_eq!(last.kind, EventKind::ProjectBacked);
    assert_eq!(last.actor.as_ref(), Some(&donator));
    assert_eq!(last.amount, Some(1_000));
}

#[test]
fn test_failed_call_emits_nothing() {
    let (mut engine, _clock) = setup();
    let id = engine
        .launch_project(&"GCREATOR".into(), "Library", "", 5_000, HOUR)
        .unwrap();
    let before = engine.pending_events().to_vec();

    assert!(engine.back_project(id, &"GDONOR".into(), 0).is_err());
    assert!(engine.propose_phase(id, &"GDONOR".into(), "x", 1).is_err());
    assert!(engine.withdraw_refund(id, &"GDONOR".into()).is_err());
    assert_eq!(engine.pending_events(), before.as_slice());
}

#[test]
fn test_vote_reaching_approval_emits_both_events() {
    let (mut engine, _clock) = setup();
    let creator = Principal::new("GCREATOR");
    let voter = Principal::new("GVOTER");
    let id = engine.launch_project(&creator, "Garden", "", 100, HOUR).unwrap();
    engine.back_project(id, &voter, 100).unwrap();
    let phase = engine.propose_phase(id, &creator, "Seeds", 50).unwrap();
    engine.drain_events();

    engine.cast_vote(id, phase, &voter, true).unwrap();
    assert_eq!(kinds(&engine), vec![EventKind::VoteCast, EventKind::PhaseApproved]);
    let vote = &engine.pending_events()[0];
    assert_eq!(vote.phase_id, Some(phase));
    assert_eq!(vote.detail.as_deref(), Some("support"));

    engine.release_payment(id, phase, &creator).unwrap();
    let released = engine.pending_events().last().unwrap();
    assert_eq!(released.kind, EventKind::PaymentReleased);
    assert_eq!(released.actor.as_ref(), Some(&creator));
    assert_eq!(released.amount, Some(50));
}

#[test]
fn test_settlement_emitted_once_with_first_mutation() {
    let (mut engine, clock) = setup();
    let backer = Principal::new("GBACKER");
    let id = engine
        .launch_project(&"GCREATOR".into(), "Garden", "", 1_000, HOUR)
        .unwrap();
    engine.back_project(id, &backer, 10).unwrap();
    engine.drain_events();

    clock.advance(HOUR);
    engine.withdraw_refund(id, &backer).unwrap();
    assert_eq!(kinds(&engine), vec![EventKind::ProjectSettled, EventKind::RefundPaid]);
    assert_eq!(engine.pending_events()[0].detail.as_deref(), Some("failed"));

    engine.drain_events();
    engine.settle(id).unwrap();
    assert!(engine.pending_events().is_empty());
}

#[test]
fn test_sequence_is_gapless_and_acknowledge_trims() {
    let (mut engine, _clock) = setup();
    let creator = Principal::new("GCREATOR");
    for name in ["A", "B", "C"] {
        engine.launch_project(&creator, name, "", 10, HOUR).unwrap();
    }
    let seqs: Vec<u64> = engine.pending_events().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    engine.acknowledge(2);
    assert_eq!(engine.pending_events().len(), 1);
    assert_eq!(engine.pending_events()[0].seq, 3);

    engine.launch_project(&creator, "D", "", 10, HOUR).unwrap();
    let drained = engine.drain_events();
    assert_eq!(drained.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
    assert!(engine.pending_events().is_empty());
}

#[test]
fn test_event_json_shape() {
    let (mut engine, _clock) = setup();
    engine
        .launch_project(&"GCREATOR".into(), "Garden", "", 1_000, HOUR)
        .unwrap();
    let json = serde_json::to_value(&engine.pending_events()[0]).unwrap();
    assert_eq!(json["kind"], "project_launched");
    assert_eq!(json["actor"], "GCREATOR");
    assert_eq!(json["project_id"], 1);
}
