// tests/integration.rs
//! Condition lifecycle, transition dispatch and on/off scenarios against the
//! in-memory runtime

use petra_ac::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn setup() -> (Arc<InMemoryServer>, ServerHandle, NodeId) {
    let runtime = InMemoryServer::new();
    let server = runtime.handle();
    let source = runtime.add_event_source("ConditionSource").unwrap();
    (runtime, server, source)
}

fn off_normal(server: &ServerHandle, source: &NodeId, name: &str) -> Condition {
    Condition::create(
        server,
        ConditionRequest::new(object_type_id::OFF_NORMAL_ALARM_TYPE, name, source.clone())
            .parent_reference(reference_type_id::HAS_COMPONENT),
    )
    .unwrap()
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_owning_condition_deletes_node_on_drop() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    let id = condition.id().clone();
    assert!(runtime.contains_node(&id));

    drop(condition);
    assert!(!runtime.contains_node(&id));
    assert_eq!(runtime.deleted_nodes(), 1);
}

#[test]
fn test_borrowed_condition_never_deletes() {
    let (runtime, server, source) = setup();
    let owner = off_normal(&server, &source, "Overheat");
    let id = owner.id().clone();

    let borrowed = owner.borrowed();
    assert!(!borrowed.owns_node());
    assert_eq!(borrowed, owner);
    drop(borrowed);

    let wrapped = Condition::wrap(&server, id.clone());
    drop(wrapped);
    assert!(runtime.contains_node(&id));
    assert_eq!(runtime.deleted_nodes(), 0);
}

#[test]
fn test_release_hands_over_the_node() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    let id = condition.release();
    assert!(runtime.contains_node(&id));
    assert_eq!(runtime.deleted_nodes(), 0);
}

#[test]
fn test_failed_write_after_create_still_deletes_once() {
    let (runtime, server, source) = setup();
    let mut created = None;

    let mut attempt = || -> Result<()> {
        let condition = off_normal(&server, &source, "Overheat");
        created = Some(condition.id().clone());
        condition.set_field("Severity", "not a number")?;
        Ok(())
    };
    let err = attempt().unwrap_err();

    assert!(matches!(err, AcError::FieldWriteFailed { .. }));
    assert_eq!(err.status(), Some(StatusCode::BAD_TYPE_MISMATCH));
    assert!(!runtime.contains_node(&created.unwrap()));
    assert_eq!(runtime.deleted_nodes(), 1);
}

#[test]
fn test_creation_failure_carries_status() {
    let (_runtime, server, _source) = setup();
    let err = Condition::create(
        &server,
        ConditionRequest::new(object_type_id::OFF_NORMAL_ALARM_TYPE, "Orphan", NodeId::numeric(4, 4)),
    )
    .unwrap_err();
    assert!(matches!(err, AcError::CreationFailed { .. }));
    assert_eq!(err.status(), Some(StatusCode::BAD_SOURCE_NODE_ID_INVALID));
}

#[test]
fn test_drop_erases_registry_record() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    let id = condition.id().clone();
    condition
        .on_active(&source, |_, _, _| StatusCode::GOOD, false)
        .unwrap();
    assert!(server.registry().contains(&id));

    drop(condition);
    assert!(!server.registry().contains(&id));
    assert!(runtime.hook(&id, TransitionKind::EnteringActive).is_none());
}

#[test]
fn test_field_round_trip_and_nested_errors() {
    let (_runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");

    condition
        .set_field("Severity", 750u16)
        .unwrap()
        .set_field("Message", LocalizedText::new("en", "Too hot"))
        .unwrap();
    assert_eq!(condition.field("Severity").unwrap(), Variant::UInt16(750));
    assert_eq!(condition.field("ConditionName").unwrap(), Variant::from("Overheat"));

    let err = condition.set_variable_field("ActiveState", "Colour", true).unwrap_err();
    assert!(matches!(err, AcError::NestedFieldWriteFailed { .. }));
    assert_eq!(err.status(), Some(StatusCode::BAD_NO_MATCH));

    let err = condition.field("NoSuchField").unwrap_err();
    assert!(matches!(err, AcError::FieldReadFailed { .. }));
}

// ============================================================================
// TRANSITION DISPATCH
// ============================================================================

#[test]
fn test_callback_runs_once_before_commit() {
    let (_runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    let observed = Arc::new(Mutex::new(Vec::new()));

    let seen = observed.clone();
    let probe = condition.borrowed();
    condition
        .on_active(
            &source,
            move |session, cb_source, remove_branch| {
                // Still the pre-transition value
                let active = probe.two_state(TransitionKind::EnteringActive).unwrap();
                seen.lock().unwrap().push((session.is_anonymous(), cb_source.clone(), remove_branch, active));
                StatusCode::GOOD
            },
            true,
        )
        .unwrap();

    condition.set_variable_field("ActiveState", "Id", true).unwrap();
    assert!(condition.two_state(TransitionKind::EnteringActive).unwrap());

    // Already true: no transition, no dispatch
    condition.set_variable_field("ActiveState", "Id", true).unwrap();

    let calls = observed.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (true, source.clone(), true, false));
}

#[test]
fn test_reregistration_overwrites() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = first.clone();
    condition
        .on_about_to_be_acked(
            &source,
            move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::GOOD
            },
            false,
        )
        .unwrap();
    let counter = second.clone();
    condition
        .on_about_to_be_acked(
            &object_id::SERVER,
            move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::GOOD
            },
            true,
        )
        .unwrap();

    runtime.acknowledge(condition.id(), None, None).unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    let hook = runtime.hook(condition.id(), TransitionKind::EnteringAcked).unwrap();
    assert_eq!(hook.source, object_id::SERVER);
    assert!(hook.remove_branch);
}

#[test]
fn test_veto_status_is_passed_verbatim() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    condition
        .on_about_to_be_confirmed(&source, |_, _, _| StatusCode::BAD_NOT_SUPPORTED, false)
        .unwrap();

    assert_eq!(
        runtime.confirm(condition.id(), None, None),
        Err(StatusCode::BAD_NOT_SUPPORTED)
    );
    assert!(!condition.two_state(TransitionKind::EnteringConfirmed).unwrap());
    assert_eq!(runtime.published_events(), 0);
}

#[test]
fn test_panicking_callback_becomes_internal_error() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    condition
        .on_enabled(&source, |_, _, _| panic!("callback blew up"), false)
        .unwrap();

    assert_eq!(runtime.enable(condition.id(), None), Err(StatusCode::BAD_INTERNAL_ERROR));
    assert!(!condition.two_state(TransitionKind::EnteringEnabled).unwrap());

    // The instance keeps working
    condition
        .on_enabled(&source, |_, _, _| StatusCode::GOOD, false)
        .unwrap();
    assert!(runtime.enable(condition.id(), None).is_ok());
}

#[test]
fn test_unregistered_kinds_proceed() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    condition
        .on_active(&source, |_, _, _| StatusCode::BAD_USER_ACCESS_DENIED, false)
        .unwrap();

    assert!(runtime.acknowledge(condition.id(), None, None).is_ok());
    assert_eq!(
        registry::dispatch(&server, TransitionKind::EnteringEnabled, condition.id(), None),
        StatusCode::GOOD
    );
    assert_eq!(
        registry::dispatch(&server, TransitionKind::EnteringActive, &NodeId::numeric(7, 7), None),
        StatusCode::GOOD
    );
}

#[test]
fn test_callback_sees_client_session() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    let session = SessionId::new();
    server.sessions().set(&session, "shift", "night");

    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    condition
        .on_about_to_be_acked(
            &source,
            move |session, _, _| {
                *slot.lock().unwrap() = session.attribute("shift").ok();
                session.set_attribute("acked", true);
                StatusCode::GOOD
            },
            false,
        )
        .unwrap();

    runtime.acknowledge(condition.id(), Some(&session), None).unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(AttributeValue::from("night")));
    assert!(server.sessions().get_bool(&session, "acked").unwrap());
}

#[test]
fn test_callback_may_reenter_condition_api() {
    let (runtime, server, source) = setup();
    let condition = off_normal(&server, &source, "Overheat");
    let inner = condition.borrowed();
    let inner_source = source.clone();
    condition
        .on_about_to_be_acked(
            &source,
            move |_, _, _| {
                inner.set_field("Severity", 10u16).unwrap();
                inner.trigger(&inner_source).unwrap();
                StatusCode::GOOD
            },
            false,
        )
        .unwrap();

    runtime.acknowledge(condition.id(), None, None).unwrap();
    assert_eq!(condition.field("Severity").unwrap(), Variant::UInt16(10));
    assert_eq!(runtime.published_events(), 2);
}

#[test]
fn test_callbacks_outlive_the_registering_handle() {
    let runtime = InMemoryServer::new();
    let source = runtime.add_event_source("ConditionSource").unwrap();
    let id = {
        let server = runtime.handle();
        let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();
        alarm
            .on_about_to_be_acked(|_, _, _| StatusCode::BAD_USER_ACCESS_DENIED, false)
            .unwrap();
        alarm.into_condition().release()
    };

    assert!(runtime.contains_node(&id));
    assert!(runtime.hook(&id, TransitionKind::EnteringAcked).is_some());
    assert_eq!(
        runtime.acknowledge(&id, None, None),
        Err(StatusCode::BAD_USER_ACCESS_DENIED)
    );
    assert!(runtime.handle().registry().contains(&id));
}

#[test]
fn test_registries_are_per_instance() {
    let (runtime_a, server_a, source_a) = setup();
    let (_runtime_b, server_b, _source_b) = setup();
    assert_ne!(server_a, server_b);

    let condition = off_normal(&server_a, &source_a, "Overheat");
    condition
        .on_active(&source_a, |_, _, _| StatusCode::GOOD, false)
        .unwrap();
    assert_eq!(server_a.registry().len(), 1);
    assert!(server_b.registry().is_empty());
    drop(condition);
    drop(runtime_a);
}

// ============================================================================
// ON/OFF SCENARIOS
// ============================================================================

#[test]
fn test_onoff_initial_state() {
    let (_runtime, server, source) = setup();
    let alarm = OnOffCondition::new(
        &server,
        &source,
        "OnOffCondition",
        Some(reference_type_id::HAS_COMPONENT),
        400,
    )
    .unwrap();

    assert_eq!(alarm.field("Severity").unwrap(), Variant::UInt16(400));
    assert!(alarm.two_state(TransitionKind::EnteringEnabled).unwrap());
    assert_eq!(
        alarm.field("Message").unwrap().as_text(),
        Some("Alarm inactive")
    );
    assert_eq!(alarm.field("Retain").unwrap(), Variant::Boolean(false));
    assert_eq!(alarm.state().unwrap(), OnOffState::Inactive);
}

#[test]
fn test_onoff_messages() {
    let (_runtime, server, source) = setup();
    let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();

    alarm.set_active(&source, true, Some("custom")).unwrap();
    assert_eq!(alarm.field("Message").unwrap().as_text(), Some("custom"));

    alarm.set_active(&source, true, None).unwrap();
    assert_eq!(alarm.field("Message").unwrap().as_text(), Some("Alarm active"));
    assert_eq!(alarm.field("Retain").unwrap(), Variant::Boolean(true));
}

#[test]
fn test_onoff_reset_clears_ack_and_confirm() {
    let (runtime, server, source) = setup();
    let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();

    alarm.set_active(&source, true, None).unwrap();
    runtime.acknowledge(alarm.id(), None, None).unwrap();
    runtime.confirm(alarm.id(), None, None).unwrap();
    alarm.set_active(&source, false, None).unwrap();

    assert!(!alarm.two_state(TransitionKind::EnteringActive).unwrap());
    assert!(!alarm.two_state(TransitionKind::EnteringAcked).unwrap());
    assert!(!alarm.two_state(TransitionKind::EnteringConfirmed).unwrap());
    assert_eq!(alarm.field("Retain").unwrap(), Variant::Boolean(false));
    assert_eq!(alarm.field("Message").unwrap().as_text(), Some("Alarm inactive"));
}

#[test]
fn test_onoff_fluent_registration_of_all_kinds() {
    let (runtime, server, source) = setup();
    let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let (h1, h2, h3, h4) = (hits.clone(), hits.clone(), hits.clone(), hits.clone());

    alarm
        .on_enabled(move |_, _, _| { h1.fetch_add(1, Ordering::SeqCst); StatusCode::GOOD }, false)
        .unwrap()
        .on_about_to_be_acked(move |_, _, _| { h2.fetch_add(1, Ordering::SeqCst); StatusCode::GOOD }, false)
        .unwrap()
        .on_about_to_be_confirmed(move |_, _, _| { h3.fetch_add(1, Ordering::SeqCst); StatusCode::GOOD }, false)
        .unwrap()
        .on_active(move |_, _, _| { h4.fetch_add(1, Ordering::SeqCst); StatusCode::GOOD }, false)
        .unwrap();

    let callbacks = server.registry().callbacks(alarm.id()).unwrap();
    assert_eq!(callbacks.registered_kinds(), TransitionKind::ALL.to_vec());
    for kind in TransitionKind::ALL {
        assert_eq!(callbacks.get(kind).unwrap().source, source);
    }

    alarm.set_active(&source, true, None).unwrap();
    runtime.acknowledge(alarm.id(), None, None).unwrap();
    runtime.confirm(alarm.id(), None, None).unwrap();
    runtime.disable(alarm.id()).unwrap();
    runtime.enable(alarm.id(), None).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[test]
fn test_vetoed_activation_leaves_fields_but_not_state() {
    let (runtime, server, source) = setup();
    let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();
    alarm
        .on_active(|_, _, _| StatusCode::BAD_USER_ACCESS_DENIED, false)
        .unwrap();

    let err = alarm.set_active(&source, true, None).unwrap_err();
    assert!(matches!(err, AcError::NestedFieldWriteFailed { .. }));
    assert_eq!(err.status(), Some(StatusCode::BAD_USER_ACCESS_DENIED));
    assert_eq!(alarm.state().unwrap(), OnOffState::Inactive);
    assert_eq!(alarm.field("Retain").unwrap(), Variant::Boolean(true));
    assert_eq!(runtime.published_events(), 0);
}

#[tokio::test]
async fn test_set_active_publishes_one_event() {
    let (runtime, server, source) = setup();
    let mut events = runtime.subscribe();
    let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();

    let event_id = alarm.set_active(&source, true, Some("Pressure high")).unwrap();
    let event = events.recv().await.unwrap();

    assert_eq!(event.event_id, event_id);
    assert_eq!(&event.condition, alarm.id());
    assert_eq!(event.source, source);
    assert_eq!(event.event_type, object_type_id::OFF_NORMAL_ALARM_TYPE);
    assert_eq!(event.field("ActiveState/Id"), Some(&Variant::Boolean(true)));
    assert_eq!(
        event.field("ActiveState"),
        Some(&Variant::LocalizedText(LocalizedText::new("en", "Active")))
    );
    assert_eq!(event.field("Message").and_then(Variant::as_text), Some("Pressure high"));
    assert_eq!(
        event.field("EventId"),
        Some(&Variant::ByteString(event_id.as_bytes().to_vec()))
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_field_writes_alone_never_publish() {
    let (runtime, server, source) = setup();
    let mut events = runtime.subscribe();
    let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();

    alarm.set_field("Severity", 900u16).unwrap();
    alarm.set_variable_field("AckedState", "Id", true).unwrap();
    assert!(events.try_recv().is_err());
    assert_eq!(runtime.published_events(), 0);
}

#[test]
fn test_hidden_condition_is_not_a_component() {
    let (runtime, server, source) = setup();
    let alarm = OnOffCondition::new(&server, &source, "Hidden", None, 100).unwrap();
    let refs = runtime.references(&source);
    assert!(refs.contains(&(reference_type_id::HAS_CONDITION, alarm.id().clone())));
    assert!(!refs.contains(&(reference_type_id::HAS_COMPONENT, alarm.id().clone())));
}
