// tests/property.rs
//! Property tests for the on/off reset law and callback overwrite

use petra_ac::*;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Step {
    SetActive(bool),
    Acknowledge,
    Confirm,
    WriteAcked(bool),
    WriteConfirmed(bool),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<bool>().prop_map(Step::SetActive),
        Just(Step::Acknowledge),
        Just(Step::Confirm),
        any::<bool>().prop_map(Step::WriteAcked),
        any::<bool>().prop_map(Step::WriteConfirmed),
    ]
}

proptest! {
    #[test]
    fn test_deactivation_resets_ack_and_confirm(
        steps in prop::collection::vec(step(), 0..20),
        severity in 1u16..=1000,
        message in proptest::option::of("[a-zA-Z ]{0,16}"),
    ) {
        let runtime = InMemoryServer::new();
        let server = runtime.handle();
        let source = runtime.add_event_source("Source").unwrap();
        let alarm = OnOffCondition::new(&server, &source, "Prop", None, severity).unwrap();

        for step in steps {
            // Already-acked / already-confirmed rejections are expected noise here
            match step {
                Step::SetActive(active) => { alarm.set_active(&source, active, message.as_deref()).unwrap(); }
                Step::Acknowledge => { let _ = runtime.acknowledge(alarm.id(), None, None); }
                Step::Confirm => { let _ = runtime.confirm(alarm.id(), None, None); }
                Step::WriteAcked(v) => { alarm.set_variable_field("AckedState", "Id", v).unwrap(); }
                Step::WriteConfirmed(v) => { alarm.set_variable_field("ConfirmedState", "Id", v).unwrap(); }
            }
        }

        alarm.set_active(&source, true, None).unwrap();
        alarm.set_active(&source, false, None).unwrap();

        prop_assert!(!alarm.two_state(TransitionKind::EnteringActive).unwrap());
        prop_assert!(!alarm.two_state(TransitionKind::EnteringAcked).unwrap());
        prop_assert!(!alarm.two_state(TransitionKind::EnteringConfirmed).unwrap());
        prop_assert_eq!(alarm.field("Retain").unwrap(), Variant::Boolean(false));
        prop_assert_eq!(alarm.field("Severity").unwrap(), Variant::UInt16(severity));
    }

    #[test]
    fn test_last_registration_wins(registrations in 1usize..8, kind_index in 0usize..4) {
        let runtime = InMemoryServer::new();
        let server = runtime.handle();
        let source = runtime.add_event_source("Source").unwrap();
        let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();
        // Start from the state the kind enters from
        runtime.disable(alarm.id()).unwrap();

        let kind = TransitionKind::ALL[kind_index];
        let counters: Vec<Arc<AtomicUsize>> = (0..registrations).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        for counter in &counters {
            let counter = counter.clone();
            alarm
                .register_transition(kind, &source, false, transition_callback(move |_, _, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::GOOD
                }))
                .unwrap();
        }

        match kind {
            TransitionKind::EnteringEnabled => { runtime.enable(alarm.id(), None).unwrap(); }
            TransitionKind::EnteringAcked => { runtime.acknowledge(alarm.id(), None, None).unwrap(); }
            TransitionKind::EnteringConfirmed => { runtime.confirm(alarm.id(), None, None).unwrap(); }
            TransitionKind::EnteringActive => { alarm.set_active(&source, true, None).unwrap(); }
        }

        let (last, earlier) = counters.split_last().unwrap();
        prop_assert_eq!(last.load(Ordering::SeqCst), 1);
        for counter in earlier {
            prop_assert_eq!(counter.load(Ordering::SeqCst), 0);
        }
    }
}
