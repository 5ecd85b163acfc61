// src/memory.rs - In-memory OPC UA runtime
//
// Purpose:
// --------
// Reference implementation of the `ServerRuntime` interface. It keeps a small
// address space (objects, variables, condition instances) in concurrent maps,
// runs the installed pre-commit hooks before committing two-state changes,
// and publishes condition events on a broadcast channel. The demo binary and
// the integration tests run the condition core against it.
//
// Interactions:
// -------------
// - Implements: runtime.rs `ServerRuntime`
// - Calls back into: registry.rs through the `TwoStateHook`s it stores
// - Used by: main.rs, tests/
//
// Key Responsibilities:
// ---------------------
// 1. Node store with references and event-notifier flags
// 2. Condition type schemas and typed field storage
// 3. Hook dispatch strictly before commit, veto on non-good status
// 4. Client-method equivalents (enable, disable, acknowledge, confirm)
// 5. Event publication
//
// No map guard is ever held while a hook or write callback runs: callbacks
// are expected to re-enter the runtime through the condition API.

use crate::{
    access::AccessLevel,
    node::{
        object_id, object_type_id, reference_type_id, EventId, LocalizedText, NodeId, QualifiedName,
        RuntimeResult, SessionId, StatusCode,
    },
    runtime::{ConditionEvent, ConditionRequest, ServerRuntime, TransitionKind, TwoStateHook},
    registry::TransitionRegistry,
    server::ServerHandle,
    session::SessionAttributeStore,
    value::{Variant, VariantType},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, trace};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const FIRST_ASSIGNED_ID: u32 = 50_000;

// ============================================================================
// CONDITION TYPE SCHEMAS
// ============================================================================

/// Declared field of a condition type
#[derive(Debug, Clone, Copy)]
struct FieldDef {
    name: &'static str,
    data_type: VariantType,
}

const fn field(name: &'static str, data_type: VariantType) -> FieldDef {
    FieldDef { name, data_type }
}

const CONDITION_FIELDS: &[FieldDef] = &[
    field("EventId", VariantType::ByteString),
    field("EventType", VariantType::NodeId),
    field("SourceNode", VariantType::NodeId),
    field("SourceName", VariantType::String),
    field("Time", VariantType::DateTime),
    field("ReceiveTime", VariantType::DateTime),
    field("Message", VariantType::LocalizedText),
    field("Severity", VariantType::UInt16),
    field("LastSeverity", VariantType::UInt16),
    field("ConditionName", VariantType::String),
    field("BranchId", VariantType::NodeId),
    field("Retain", VariantType::Boolean),
    field("Comment", VariantType::LocalizedText),
    field("ClientUserId", VariantType::String),
    field("Quality", VariantType::UInt32),
];

const ALARM_FIELDS: &[FieldDef] = &[
    field("InputNode", VariantType::NodeId),
    field("SuppressedOrShelved", VariantType::Boolean),
];

const OFF_NORMAL_FIELDS: &[FieldDef] = &[field("NormalState", VariantType::NodeId)];

#[derive(Debug, Clone)]
struct TypeSchema {
    fields: Vec<FieldDef>,
    two_states: Vec<TransitionKind>,
}

impl TypeSchema {
    /// Schema of a supported condition type, walking the subtype chain
    fn for_type(condition_type: &NodeId) -> Option<Self> {
        let chain = [
            object_type_id::CONDITION_TYPE,
            object_type_id::ACKNOWLEDGEABLE_CONDITION_TYPE,
            object_type_id::ALARM_CONDITION_TYPE,
            object_type_id::DISCRETE_ALARM_TYPE,
            object_type_id::OFF_NORMAL_ALARM_TYPE,
        ];
        let depth = chain.iter().position(|t| t == condition_type)?;

        let mut schema = TypeSchema {
            fields: CONDITION_FIELDS.to_vec(),
            two_states: vec![TransitionKind::EnteringEnabled],
        };
        if depth >= 1 {
            schema.two_states.push(TransitionKind::EnteringAcked);
            schema.two_states.push(TransitionKind::EnteringConfirmed);
        }
        if depth >= 2 {
            schema.fields.extend_from_slice(ALARM_FIELDS);
            schema.two_states.push(TransitionKind::EnteringActive);
        }
        if depth >= 4 {
            schema.fields.extend_from_slice(OFF_NORMAL_FIELDS);
        }
        Some(schema)
    }

    fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|def| def.name == name)
    }

    fn has_two_state(&self, kind: TransitionKind) -> bool {
        self.two_states.contains(&kind)
    }
}

// ============================================================================
// NODE STORE
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct TwoStateValue {
    id: bool,
    transition_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct ConditionNode {
    condition_type: NodeId,
    source: NodeId,
    schema: TypeSchema,
    fields: HashMap<&'static str, Variant>,
    two_states: BTreeMap<TransitionKind, TwoStateValue>,
}

impl ConditionNode {
    fn two_state(&self, kind: TransitionKind) -> RuntimeResult<TwoStateValue> {
        self.two_states
            .get(&kind)
            .copied()
            .ok_or(StatusCode::BAD_NO_MATCH)
    }

    fn snapshot(&self) -> BTreeMap<String, Variant> {
        let mut fields = BTreeMap::new();
        for def in &self.schema.fields {
            let value = self.fields.get(def.name).cloned().unwrap_or_default();
            fields.insert(def.name.to_string(), value);
        }
        for (kind, state) in &self.two_states {
            fields.insert(
                kind.variable().to_string(),
                LocalizedText::new("en", kind.state_text(state.id)).into(),
            );
            fields.insert(format!("{}/Id", kind.variable()), state.id.into());
            if let Some(time) = state.transition_time {
                fields.insert(format!("{}/TransitionTime", kind.variable()), time.into());
            }
        }
        fields
    }
}

#[derive(Debug)]
struct VariableNode {
    value: Variant,
    access_level: AccessLevel,
}

#[derive(Debug)]
enum NodeKind {
    Object,
    Variable(VariableNode),
    Condition(Box<ConditionNode>),
}

#[derive(Debug)]
struct NodeRecord {
    browse_name: QualifiedName,
    display_name: LocalizedText,
    /// Forward references as (reference type, target)
    references: Vec<(NodeId, NodeId)>,
    event_notifier: bool,
    kind: NodeKind,
}

impl NodeRecord {
    fn new(browse_name: QualifiedName, kind: NodeKind) -> Self {
        let display_name = LocalizedText::new("", browse_name.name.clone());
        Self {
            browse_name,
            display_name,
            references: Vec::new(),
            event_notifier: false,
            kind,
        }
    }

    fn condition(&self) -> RuntimeResult<&ConditionNode> {
        match &self.kind {
            NodeKind::Condition(c) => Ok(&**c),
            _ => Err(StatusCode::BAD_TYPE_DEFINITION_INVALID),
        }
    }

    fn condition_mut(&mut self) -> RuntimeResult<&mut ConditionNode> {
        match &mut self.kind {
            NodeKind::Condition(c) => Ok(&mut **c),
            _ => Err(StatusCode::BAD_TYPE_DEFINITION_INVALID),
        }
    }
}

fn is_known_reference_type(id: &NodeId) -> bool {
    [
        reference_type_id::ORGANIZES,
        reference_type_id::HAS_EVENT_SOURCE,
        reference_type_id::HAS_COMPONENT,
        reference_type_id::HAS_NOTIFIER,
        reference_type_id::HAS_CONDITION,
    ]
    .contains(id)
}

type WriteCallback = Arc<dyn Fn(&NodeId, &Variant) + Send + Sync>;

// ============================================================================
// RUNTIME
// ============================================================================

/// In-memory server runtime
///
/// # Examples
///
/// ```rust
/// use petra_ac::{InMemoryServer, OnOffCondition};
///
/// let runtime = InMemoryServer::new();
/// let server = runtime.handle();
/// let source = runtime.add_event_source("Pump")?;
/// let mut events = runtime.subscribe();
///
/// let alarm = OnOffCondition::with_defaults(&server, &source)?;
/// alarm.set_active(&source, true, None)?;
///
/// let event = events.try_recv().expect("one event");
/// assert_eq!(event.field("ActiveState/Id"), Some(&true.into()));
/// # Ok::<(), petra_ac::AcError>(())
/// ```
pub struct InMemoryServer {
    nodes: DashMap<NodeId, NodeRecord>,
    hooks: DashMap<(NodeId, TransitionKind), TwoStateHook>,
    write_callbacks: DashMap<NodeId, WriteCallback>,
    events: broadcast::Sender<ConditionEvent>,
    next_id: AtomicU32,
    published: AtomicU64,
    deleted: AtomicU64,
    registry: TransitionRegistry,
    sessions: SessionAttributeStore,
}

impl InMemoryServer {
    /// Create a runtime holding the Objects folder and the Server object
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let server = Self {
            nodes: DashMap::new(),
            hooks: DashMap::new(),
            write_callbacks: DashMap::new(),
            events,
            next_id: AtomicU32::new(FIRST_ASSIGNED_ID),
            published: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            registry: TransitionRegistry::new(),
            sessions: SessionAttributeStore::new(),
        };

        let mut objects = NodeRecord::new(QualifiedName::new(0, "Objects"), NodeKind::Object);
        objects
            .references
            .push((reference_type_id::ORGANIZES, object_id::SERVER));
        let mut server_object = NodeRecord::new(QualifiedName::new(0, "Server"), NodeKind::Object);
        server_object.event_notifier = true;

        server.nodes.insert(object_id::OBJECTS_FOLDER, objects);
        server.nodes.insert(object_id::SERVER, server_object);
        Arc::new(server)
    }

    /// Condition-core handle bound to this runtime
    ///
    /// Every handle shares the runtime's own callback registry and session
    /// store, so registered callbacks stay in force while the runtime lives.
    pub fn handle(self: &Arc<Self>) -> ServerHandle {
        ServerHandle::from_parts(self.clone(), self.registry.clone(), self.sessions.clone())
    }

    /// Receiver for every condition event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConditionEvent> {
        self.events.subscribe()
    }

    pub fn published_events(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn deleted_nodes(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn references(&self, from: &NodeId) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .get(from)
            .map(|node| node.references.clone())
            .unwrap_or_default()
    }

    /// Hook currently installed for `(condition, kind)`
    pub fn hook(&self, condition: &NodeId, kind: TransitionKind) -> Option<TwoStateHook> {
        self.hooks
            .get(&(condition.clone(), kind))
            .map(|hook| hook.value().clone())
    }

    fn allocate_id(&self) -> NodeId {
        NodeId::numeric(1, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert_child(
        &self,
        parent: &NodeId,
        reference_type: NodeId,
        record: NodeRecord,
    ) -> RuntimeResult<NodeId> {
        if !self.nodes.contains_key(parent) {
            return Err(StatusCode::BAD_NODE_ID_UNKNOWN);
        }
        let id = self.allocate_id();
        self.nodes.insert(id.clone(), record);
        if let Some(mut parent) = self.nodes.get_mut(parent) {
            parent.references.push((reference_type, id.clone()));
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Objects and variables
    // ------------------------------------------------------------------------

    pub fn add_object(&self, parent: &NodeId, browse_name: impl Into<QualifiedName>) -> RuntimeResult<NodeId> {
        let record = NodeRecord::new(browse_name.into(), NodeKind::Object);
        self.insert_child(parent, reference_type_id::HAS_COMPONENT, record)
    }

    pub fn set_event_notifier(&self, node: &NodeId, enabled: bool) -> RuntimeResult<()> {
        let mut node = self.nodes.get_mut(node).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        node.event_notifier = enabled;
        Ok(())
    }

    /// Object under Objects that notifies events and is linked from Server by HasNotifier
    pub fn add_event_source(&self, browse_name: impl Into<QualifiedName>) -> RuntimeResult<NodeId> {
        let id = self.add_object(&object_id::OBJECTS_FOLDER, browse_name)?;
        self.set_event_notifier(&id, true)?;
        self.add_reference(&object_id::SERVER, &id, &reference_type_id::HAS_NOTIFIER)?;
        Ok(id)
    }

    pub fn add_variable(
        &self,
        parent: &NodeId,
        browse_name: impl Into<QualifiedName>,
        initial: Variant,
        access_level: AccessLevel,
    ) -> RuntimeResult<NodeId> {
        let record = NodeRecord::new(
            browse_name.into(),
            NodeKind::Variable(VariableNode {
                value: initial,
                access_level,
            }),
        );
        self.insert_child(parent, reference_type_id::HAS_COMPONENT, record)
    }

    pub fn read_value(&self, node: &NodeId) -> RuntimeResult<Variant> {
        let node = self.nodes.get(node).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        match &node.kind {
            NodeKind::Variable(var) => Ok(var.value.clone()),
            _ => Err(StatusCode::BAD_NOT_SUPPORTED),
        }
    }

    /// Write a variable value and run its on-write callback, if any
    pub fn write_value(&self, id: &NodeId, value: Variant) -> RuntimeResult<()> {
        {
            let mut node = self.nodes.get_mut(id).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
            let NodeKind::Variable(var) = &mut node.kind else {
                return Err(StatusCode::BAD_NOT_SUPPORTED);
            };
            if !var.access_level.can_write() {
                return Err(StatusCode::BAD_NOT_WRITABLE);
            }
            if !var.value.is_empty() && var.value.variant_type() != value.variant_type() {
                return Err(StatusCode::BAD_TYPE_MISMATCH);
            }
            var.value = value.clone();
        }

        let callback = self.write_callbacks.get(id).map(|cb| cb.value().clone());
        if let Some(callback) = callback {
            callback(id, &value);
        }
        Ok(())
    }

    pub fn access_level(&self, id: &NodeId) -> RuntimeResult<AccessLevel> {
        let node = self.nodes.get(id).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        match &node.kind {
            NodeKind::Variable(var) => Ok(var.access_level),
            _ => Err(StatusCode::BAD_NOT_SUPPORTED),
        }
    }

    /// Run `callback` after every successful write to the variable
    pub fn on_write<F>(&self, id: &NodeId, callback: F) -> RuntimeResult<()>
    where
        F: Fn(&NodeId, &Variant) + Send + Sync + 'static,
    {
        if !self.nodes.contains_key(id) {
            return Err(StatusCode::BAD_NODE_ID_UNKNOWN);
        }
        self.write_callbacks.insert(id.clone(), Arc::new(callback));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Client methods on conditions
    // ------------------------------------------------------------------------

    pub fn enable(&self, condition: &NodeId, session: Option<&SessionId>) -> RuntimeResult<EventId> {
        self.enter_two_state(condition, TransitionKind::EnteringEnabled, session)?;
        self.publish_from_own_source(condition)
    }

    pub fn disable(&self, condition: &NodeId) -> RuntimeResult<EventId> {
        let enabled = self.two_state(condition, TransitionKind::EnteringEnabled)?;
        if !enabled {
            return Err(StatusCode::BAD_CONDITION_ALREADY_DISABLED);
        }
        self.commit_two_state(condition, TransitionKind::EnteringEnabled, false)?;
        self.publish_from_own_source(condition)
    }

    pub fn acknowledge(
        &self,
        condition: &NodeId,
        session: Option<&SessionId>,
        comment: Option<&str>,
    ) -> RuntimeResult<EventId> {
        self.enter_two_state(condition, TransitionKind::EnteringAcked, session)?;
        self.store_comment(condition, comment)?;
        self.publish_from_own_source(condition)
    }

    pub fn confirm(
        &self,
        condition: &NodeId,
        session: Option<&SessionId>,
        comment: Option<&str>,
    ) -> RuntimeResult<EventId> {
        self.enter_two_state(condition, TransitionKind::EnteringConfirmed, session)?;
        self.store_comment(condition, comment)?;
        self.publish_from_own_source(condition)
    }

    fn store_comment(&self, condition: &NodeId, comment: Option<&str>) -> RuntimeResult<()> {
        match comment {
            Some(text) => self.set_condition_field(
                condition,
                &QualifiedName::new(0, "Comment"),
                &LocalizedText::new("", text).into(),
            ),
            None => Ok(()),
        }
    }

    fn two_state(&self, condition: &NodeId, kind: TransitionKind) -> RuntimeResult<bool> {
        let node = self.nodes.get(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        Ok(node.condition()?.two_state(kind)?.id)
    }

    /// Method-driven entry into a true state; already being there is an error
    fn enter_two_state(
        &self,
        condition: &NodeId,
        kind: TransitionKind,
        session: Option<&SessionId>,
    ) -> RuntimeResult<()> {
        if self.two_state(condition, kind)? {
            return Err(match kind {
                TransitionKind::EnteringEnabled => StatusCode::BAD_CONDITION_ALREADY_ENABLED,
                TransitionKind::EnteringAcked => StatusCode::BAD_CONDITION_BRANCH_ALREADY_ACKED,
                TransitionKind::EnteringConfirmed => StatusCode::BAD_CONDITION_BRANCH_ALREADY_CONFIRMED,
                TransitionKind::EnteringActive => StatusCode::BAD_INVALID_ARGUMENT,
            });
        }
        self.run_hook(condition, kind, session)?;
        self.commit_two_state(condition, kind, true)
    }

    /// Invoke the pre-commit hook, if installed; a non-good status vetoes
    fn run_hook(
        &self,
        condition: &NodeId,
        kind: TransitionKind,
        session: Option<&SessionId>,
    ) -> RuntimeResult<()> {
        let Some(hook) = self.hook(condition, kind) else {
            return Ok(());
        };
        let status = hook.invoke(session);
        if status.is_good() {
            Ok(())
        } else {
            debug!("{} of {} vetoed: {}", kind, condition, status);
            Err(status)
        }
    }

    fn commit_two_state(&self, condition: &NodeId, kind: TransitionKind, id: bool) -> RuntimeResult<()> {
        let mut node = self.nodes.get_mut(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        let cond = node.condition_mut()?;
        let state = cond.two_states.get_mut(&kind).ok_or(StatusCode::BAD_NO_MATCH)?;
        if state.id != id {
            state.id = id;
            state.transition_time = Some(Utc::now());
        }
        trace!("{} {}/Id = {}", condition, kind, id);
        Ok(())
    }

    fn publish_from_own_source(&self, condition: &NodeId) -> RuntimeResult<EventId> {
        let source = {
            let node = self.nodes.get(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
            node.condition()?.source.clone()
        };
        self.publish(condition, &source)
    }

    fn publish(&self, condition: &NodeId, source: &NodeId) -> RuntimeResult<EventId> {
        let event = {
            let mut node = self.nodes.get_mut(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
            let cond = node.condition_mut()?;
            let now = Utc::now();
            let event_id = EventId::random();
            cond.fields
                .insert("EventId", Variant::ByteString(event_id.as_bytes().to_vec()));
            cond.fields.insert("ReceiveTime", now.into());
            let time = cond
                .fields
                .get("Time")
                .and_then(Variant::as_datetime)
                .unwrap_or(now);
            ConditionEvent {
                event_id,
                condition: condition.clone(),
                source: source.clone(),
                event_type: cond.condition_type.clone(),
                time,
                fields: cond.snapshot(),
            }
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        debug!("Published event for condition {} from {}", condition, source);
        // Nobody listening is fine
        let _ = self.events.send(event.clone());
        Ok(event.event_id)
    }

    /// `source` must notify events and either be the condition's source or
    /// hold a notifier/event-source reference to it
    fn check_notifier(&self, source: &NodeId, condition_source: &NodeId) -> RuntimeResult<()> {
        let node = self
            .nodes
            .get(source)
            .ok_or(StatusCode::BAD_SOURCE_NODE_ID_INVALID)?;
        if !node.event_notifier {
            return Err(StatusCode::BAD_SOURCE_NODE_ID_INVALID);
        }
        if source == condition_source {
            return Ok(());
        }
        let linked = node.references.iter().any(|(reference_type, target)| {
            target == condition_source
                && (*reference_type == reference_type_id::HAS_NOTIFIER
                    || *reference_type == reference_type_id::HAS_EVENT_SOURCE)
        });
        if linked {
            Ok(())
        } else {
            Err(StatusCode::BAD_SOURCE_NODE_ID_INVALID)
        }
    }
}

impl ServerRuntime for InMemoryServer {
    fn create_condition(&self, request: &ConditionRequest) -> RuntimeResult<NodeId> {
        let schema =
            TypeSchema::for_type(&request.condition_type).ok_or(StatusCode::BAD_TYPE_DEFINITION_INVALID)?;

        let source_name = self
            .nodes
            .get(&request.source)
            .map(|node| node.browse_name.name.clone())
            .ok_or(StatusCode::BAD_SOURCE_NODE_ID_INVALID)?;

        if let Some(reference_type) = &request.parent_reference {
            if !is_known_reference_type(reference_type) {
                return Err(StatusCode::BAD_REFERENCE_TYPE_ID_INVALID);
            }
        }

        let duplicate = self.nodes.iter().any(|entry| {
            entry.browse_name == request.browse_name
                && matches!(&entry.kind, NodeKind::Condition(c) if c.source == request.source)
        });
        if duplicate {
            return Err(StatusCode::BAD_BROWSE_NAME_DUPLICATED);
        }

        let id = match &request.requested_id {
            Some(id) if self.nodes.contains_key(id) => return Err(StatusCode::BAD_NODE_ID_EXISTS),
            Some(id) if !id.is_null() => id.clone(),
            _ => self.allocate_id(),
        };

        let mut fields = HashMap::new();
        fields.insert("EventType", Variant::NodeId(request.condition_type.clone()));
        fields.insert("SourceNode", Variant::NodeId(request.source.clone()));
        fields.insert("SourceName", Variant::String(source_name));
        fields.insert("ConditionName", Variant::String(request.browse_name.name.clone()));
        fields.insert("Time", Utc::now().into());
        fields.insert("Message", LocalizedText::default().into());
        fields.insert("Severity", Variant::UInt16(0));
        fields.insert("Retain", Variant::Boolean(false));
        let two_states = schema
            .two_states
            .iter()
            .map(|kind| (*kind, TwoStateValue::default()))
            .collect();

        let condition = ConditionNode {
            condition_type: request.condition_type.clone(),
            source: request.source.clone(),
            schema,
            fields,
            two_states,
        };
        self.nodes.insert(
            id.clone(),
            NodeRecord::new(
                request.browse_name.clone(),
                NodeKind::Condition(Box::new(condition)),
            ),
        );

        if let Some(mut source) = self.nodes.get_mut(&request.source) {
            source
                .references
                .push((reference_type_id::HAS_CONDITION, id.clone()));
            if let Some(reference_type) = &request.parent_reference {
                source.references.push((reference_type.clone(), id.clone()));
            }
        }

        debug!(
            "Condition {} ({}) created under {}",
            request.browse_name, id, request.source
        );
        Ok(id)
    }

    fn delete_node(&self, id: &NodeId, delete_references: bool) -> RuntimeResult<()> {
        self.nodes.remove(id).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        self.hooks.retain(|(condition, _), _| condition != id);
        self.write_callbacks.remove(id);
        if delete_references {
            for mut node in self.nodes.iter_mut() {
                node.references.retain(|(_, target)| target != id);
            }
        }
        self.deleted.fetch_add(1, Ordering::Relaxed);
        debug!("Deleted node {}", id);
        Ok(())
    }

    fn add_reference(&self, source: &NodeId, target: &NodeId, reference_type: &NodeId) -> RuntimeResult<()> {
        if !is_known_reference_type(reference_type) {
            return Err(StatusCode::BAD_REFERENCE_TYPE_ID_INVALID);
        }
        if !self.nodes.contains_key(target) {
            return Err(StatusCode::BAD_NODE_ID_UNKNOWN);
        }
        let mut node = self.nodes.get_mut(source).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        let reference = (reference_type.clone(), target.clone());
        if !node.references.contains(&reference) {
            node.references.push(reference);
        }
        Ok(())
    }

    fn read_display_name(&self, id: &NodeId) -> RuntimeResult<LocalizedText> {
        self.nodes
            .get(id)
            .map(|node| node.display_name.clone())
            .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)
    }

    fn read_browse_name(&self, id: &NodeId) -> RuntimeResult<QualifiedName> {
        self.nodes
            .get(id)
            .map(|node| node.browse_name.clone())
            .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)
    }

    fn set_condition_field(&self, condition: &NodeId, field: &QualifiedName, value: &Variant) -> RuntimeResult<()> {
        let mut node = self.nodes.get_mut(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        let cond = node.condition_mut()?;

        if TransitionKind::from_variable(&field.name).is_some_and(|kind| cond.schema.has_two_state(kind)) {
            return Err(StatusCode::BAD_NOT_WRITABLE);
        }
        let def = *cond.schema.field(&field.name).ok_or(StatusCode::BAD_NO_MATCH)?;
        if value.variant_type() != def.data_type {
            return Err(StatusCode::BAD_TYPE_MISMATCH);
        }

        let previous = cond.fields.insert(def.name, value.clone());
        if def.name == "Severity" {
            if let Some(previous) = previous {
                cond.fields.insert("LastSeverity", previous);
            }
        }
        trace!("{} {} = {}", condition, field, value);
        Ok(())
    }

    fn set_condition_variable_field_property(
        &self,
        condition: &NodeId,
        variable: &QualifiedName,
        property: &QualifiedName,
        value: &Variant,
    ) -> RuntimeResult<()> {
        let kind = TransitionKind::from_variable(&variable.name).ok_or(StatusCode::BAD_NO_MATCH)?;
        let current = {
            let node = self.nodes.get(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
            node.condition()?.two_state(kind)?
        };

        match property.name.as_str() {
            "Id" => {
                let id = value.as_bool().ok_or(StatusCode::BAD_TYPE_MISMATCH)?;
                if id && !current.id {
                    self.run_hook(condition, kind, None)?;
                }
                self.commit_two_state(condition, kind, id)
            }
            "TransitionTime" => {
                let time = value.as_datetime().ok_or(StatusCode::BAD_TYPE_MISMATCH)?;
                let mut node = self.nodes.get_mut(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
                let state = node
                    .condition_mut()?
                    .two_states
                    .get_mut(&kind)
                    .ok_or(StatusCode::BAD_NO_MATCH)?;
                state.transition_time = Some(time);
                Ok(())
            }
            _ => Err(StatusCode::BAD_NO_MATCH),
        }
    }

    fn read_condition_field(&self, condition: &NodeId, field: &QualifiedName) -> RuntimeResult<Variant> {
        let node = self.nodes.get(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        let cond = node.condition()?;
        if let Some(kind) = TransitionKind::from_variable(&field.name) {
            let state = cond.two_state(kind)?;
            return Ok(LocalizedText::new("en", kind.state_text(state.id)).into());
        }
        let def = cond.schema.field(&field.name).ok_or(StatusCode::BAD_NO_MATCH)?;
        Ok(cond.fields.get(def.name).cloned().unwrap_or_default())
    }

    fn read_condition_variable_field_property(
        &self,
        condition: &NodeId,
        variable: &QualifiedName,
        property: &QualifiedName,
    ) -> RuntimeResult<Variant> {
        let kind = TransitionKind::from_variable(&variable.name).ok_or(StatusCode::BAD_NO_MATCH)?;
        let node = self.nodes.get(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        let state = node.condition()?.two_state(kind)?;
        match property.name.as_str() {
            "Id" => Ok(state.id.into()),
            "TransitionTime" => Ok(state.transition_time.map(Variant::from).unwrap_or_default()),
            _ => Err(StatusCode::BAD_NO_MATCH),
        }
    }

    fn install_two_state_hook(&self, hook: TwoStateHook) -> RuntimeResult<()> {
        {
            let node = self
                .nodes
                .get(&hook.condition)
                .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
            if !node.condition()?.schema.has_two_state(hook.kind) {
                return Err(StatusCode::BAD_NO_MATCH);
            }
        }
        if !self.nodes.contains_key(&hook.source) {
            return Err(StatusCode::BAD_SOURCE_NODE_ID_INVALID);
        }
        debug!("Installing {} hook on {}", hook.kind, hook.condition);
        self.hooks.insert((hook.condition.clone(), hook.kind), hook);
        Ok(())
    }

    fn trigger_condition_event(&self, condition: &NodeId, source: &NodeId) -> RuntimeResult<EventId> {
        let condition_source = {
            let node = self.nodes.get(condition).ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
            node.condition()?.source.clone()
        };
        self.check_notifier(source, &condition_source)?;
        self.publish(condition, source)
    }
}
