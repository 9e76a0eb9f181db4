//! Property tests for the twin state machine

use celltwin_core::{
    BinDecision, CellState, Event, EventOutcome, EventType, PartStatus, SensorResult,
    SortOutcome, TwinState,
};
use proptest::prelude::*;
use std::collections::HashSet;

fn make_event(kind: EventType, t: f64, id: &str, ok: bool) -> Event {
    match kind {
        EventType::PartArrived => Event::part_arrived(t, id),
        EventType::SensorRead => Event::sensor_read(
            t,
            id,
            if ok { SensorResult::Ok } else { SensorResult::Nok },
        ),
        EventType::ActuatorTriggered => Event::actuator_triggered(
            t,
            id,
            if ok {
                BinDecision::OkBin
            } else {
                BinDecision::RejectBin
            },
        ),
        EventType::PartSorted => Event::part_sorted(
            t,
            id,
            if ok { SortOutcome::Ok } else { SortOutcome::Nok },
        ),
    }
}

fn arbitrary_event() -> impl Strategy<Value = (usize, usize, bool)> {
    (0..4usize, 0..4usize, any::<bool>())
}

proptest! {
    #[test]
    fn counters_and_flags_hold_for_any_sequence(
        events in prop::collection::vec(arbitrary_event(), 0..64)
    ) {
        let mut state = TwinState::new(5.0);
        let mut seen = HashSet::new();
        let mut sorted = 0u64;
        let mut sorted_nok = 0u64;
        let mut rejected_any = false;

        for (i, (part, kind, ok)) in events.iter().enumerate() {
            let id = format!("P{part}");
            seen.insert(id.clone());
            let before = state.part(&id).map(|p| p.status);
            let event = make_event(EventType::ALL[*kind], i as f64, &id, *ok);

            match state.handle_event(&event).unwrap() {
                EventOutcome::Applied { to, .. } => {
                    if to == PartStatus::SortedOk {
                        sorted += 1;
                    }
                    if to == PartStatus::SortedNok {
                        sorted += 1;
                        sorted_nok += 1;
                    }
                }
                EventOutcome::Rejected { status } => {
                    rejected_any = true;
                    prop_assert_eq!(Some(status), before.or(Some(PartStatus::Created)));
                    prop_assert_eq!(state.part(&id).unwrap().status, status);
                }
            }

            prop_assert!(state.total_rejected() <= state.total_processed());
            prop_assert_ne!(state.cell_state(), CellState::Idle);
            prop_assert_eq!(state.error_flag(), rejected_any);
            prop_assert_eq!(state.cell_state() == CellState::Error, rejected_any);
        }

        prop_assert_eq!(state.total_processed(), sorted);
        prop_assert_eq!(state.total_rejected(), sorted_nok);
        prop_assert_eq!(state.snapshot().parts_in_system, seen.len());
        if events.is_empty() {
            prop_assert_eq!(state.cell_state(), CellState::Idle);
        }
    }

    #[test]
    fn canonical_interleavings_never_error(
        outcomes in prop::collection::vec(any::<bool>(), 1..12),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..64),
    ) {
        let mut state = TwinState::new(5.0);
        // next lifecycle step per part
        let mut progress = vec![0usize; outcomes.len()];
        let mut t = 0.0;
        let mut picks = picks.into_iter();

        loop {
            let pending: Vec<usize> = (0..outcomes.len()).filter(|&p| progress[p] < 4).collect();
            if pending.is_empty() {
                break;
            }
            let part = match picks.next() {
                Some(index) => pending[index.index(pending.len())],
                None => pending[0],
            };
            let event = make_event(
                EventType::ALL[progress[part]],
                t,
                &format!("P{part}"),
                outcomes[part],
            );
            prop_assert!(
                matches!(state.handle_event(&event).unwrap(), EventOutcome::Applied { .. }),
                "canonical event rejected: {}",
                event
            );
            progress[part] += 1;
            t += 0.25;
        }

        let nok = outcomes.iter().filter(|ok| !**ok).count() as u64;
        prop_assert!(!state.error_flag());
        prop_assert_eq!(state.cell_state(), CellState::Running);
        prop_assert_eq!(state.total_processed(), outcomes.len() as u64);
        prop_assert_eq!(state.total_rejected(), nok);
    }
}
