// src/runtime.rs - Interface to the hosting OPC UA server runtime
//
// Purpose:
// --------
// The condition core never touches address-space storage, sessions or the
// wire itself. Everything it needs from the server runtime is expressed by the
// `ServerRuntime` trait below, the same way PETRA's protocol drivers sit behind
// a single driver trait.
//
// Interactions:
// -------------
// - Implemented by: memory.rs (in-memory runtime), test mocks
// - Used by: condition.rs (lifecycle, field writes, trigger), registry.rs
//   (hook installation, display names), access.rs (browse names)
//
// Key Responsibilities:
// ---------------------
// 1. Condition instantiation and node deletion
// 2. Condition field and nested-property reads and writes
// 3. Installation of the synchronous pre-commit two-state hooks
// 4. Publication of condition events

use crate::node::{EventId, LocalizedText, NodeId, QualifiedName, RuntimeResult, SessionId, StatusCode};
use crate::value::Variant;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// TRANSITION KINDS
// ============================================================================

/// Two-state sub-variable of a condition becoming true
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TransitionKind {
    EnteringEnabled,
    EnteringAcked,
    EnteringConfirmed,
    EnteringActive,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 4] = [
        TransitionKind::EnteringEnabled,
        TransitionKind::EnteringAcked,
        TransitionKind::EnteringConfirmed,
        TransitionKind::EnteringActive,
    ];

    /// Position in enum-indexed tables
    pub const fn index(self) -> usize {
        match self {
            TransitionKind::EnteringEnabled => 0,
            TransitionKind::EnteringAcked => 1,
            TransitionKind::EnteringConfirmed => 2,
            TransitionKind::EnteringActive => 3,
        }
    }

    /// Browse name of the two-state variable this kind drives
    pub const fn variable(self) -> &'static str {
        match self {
            TransitionKind::EnteringEnabled => "EnabledState",
            TransitionKind::EnteringAcked => "AckedState",
            TransitionKind::EnteringConfirmed => "ConfirmedState",
            TransitionKind::EnteringActive => "ActiveState",
        }
    }

    pub fn from_variable(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.variable() == name)
    }

    /// Display text of the variable for a given `Id` value
    pub const fn state_text(self, id: bool) -> &'static str {
        match (self, id) {
            (TransitionKind::EnteringEnabled, true) => "Enabled",
            (TransitionKind::EnteringEnabled, false) => "Disabled",
            (TransitionKind::EnteringAcked, true) => "Acknowledged",
            (TransitionKind::EnteringAcked, false) => "Unacknowledged",
            (TransitionKind::EnteringConfirmed, true) => "Confirmed",
            (TransitionKind::EnteringConfirmed, false) => "Unconfirmed",
            (TransitionKind::EnteringActive, true) => "Active",
            (TransitionKind::EnteringActive, false) => "Inactive",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.variable())
    }
}

// ============================================================================
// PRE-COMMIT HOOKS
// ============================================================================

/// Receiver of the runtime's synchronous pre-commit call
///
/// The runtime calls this exactly once per transition attempt, before it
/// commits the new sub-variable value. A non-good status vetoes the commit.
pub trait TransitionInterceptor: Send + Sync {
    fn before_transition(
        &self,
        kind: TransitionKind,
        condition: &NodeId,
        session: Option<&SessionId>,
    ) -> StatusCode;
}

/// Binding installed into the runtime for one (condition, kind) pair
#[derive(Clone)]
pub struct TwoStateHook {
    pub condition: NodeId,
    pub source: NodeId,
    pub remove_branch: bool,
    pub kind: TransitionKind,
    pub interceptor: Arc<dyn TransitionInterceptor>,
}

impl TwoStateHook {
    /// Forward the runtime's call to the bound interceptor
    pub fn invoke(&self, session: Option<&SessionId>) -> StatusCode {
        self.interceptor
            .before_transition(self.kind, &self.condition, session)
    }
}

impl fmt::Debug for TwoStateHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoStateHook")
            .field("condition", &self.condition)
            .field("source", &self.source)
            .field("remove_branch", &self.remove_branch)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CONDITION CREATION AND EVENTS
// ============================================================================

/// Parameters for instantiating a condition
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRequest {
    pub condition_type: NodeId,
    pub browse_name: QualifiedName,
    pub source: NodeId,
    /// Reference exposing the condition below its source; `None` keeps it hidden
    pub parent_reference: Option<NodeId>,
    /// Explicit id; `None` lets the runtime assign one
    pub requested_id: Option<NodeId>,
}

impl ConditionRequest {
    pub fn new(
        condition_type: NodeId,
        browse_name: impl Into<QualifiedName>,
        source: NodeId,
    ) -> Self {
        Self {
            condition_type,
            browse_name: browse_name.into(),
            source,
            parent_reference: None,
            requested_id: None,
        }
    }

    pub fn parent_reference(mut self, reference_type: NodeId) -> Self {
        self.parent_reference = Some(reference_type);
        self
    }

    pub fn requested_id(mut self, id: NodeId) -> Self {
        self.requested_id = Some(id);
        self
    }
}

/// Condition event as delivered to subscribers of its source
#[derive(Debug, Clone, Serialize)]
pub struct ConditionEvent {
    pub event_id: EventId,
    pub condition: NodeId,
    pub source: NodeId,
    pub event_type: NodeId,
    pub time: DateTime<Utc>,
    /// Snapshot of all condition fields; nested properties as `Variable/Property`
    pub fields: BTreeMap<String, Variant>,
}

impl ConditionEvent {
    pub fn field(&self, name: &str) -> Option<&Variant> {
        self.fields.get(name)
    }
}

// ============================================================================
// RUNTIME TRAIT
// ============================================================================

/// Address-space operations the condition core consumes from the server runtime
///
/// Failures are reported as bare status codes; the condition layer maps them
/// onto [`crate::AcError`].
pub trait ServerRuntime: Send + Sync {
    /// Instantiate a condition and return its node id
    fn create_condition(&self, request: &ConditionRequest) -> RuntimeResult<NodeId>;

    /// Delete a node, optionally together with all references to and from it
    fn delete_node(&self, id: &NodeId, delete_references: bool) -> RuntimeResult<()>;

    fn add_reference(
        &self,
        source: &NodeId,
        target: &NodeId,
        reference_type: &NodeId,
    ) -> RuntimeResult<()>;

    fn read_display_name(&self, id: &NodeId) -> RuntimeResult<LocalizedText>;

    fn read_browse_name(&self, id: &NodeId) -> RuntimeResult<QualifiedName>;

    fn set_condition_field(
        &self,
        condition: &NodeId,
        field: &QualifiedName,
        value: &Variant,
    ) -> RuntimeResult<()>;

    fn set_condition_variable_field_property(
        &self,
        condition: &NodeId,
        variable: &QualifiedName,
        property: &QualifiedName,
        value: &Variant,
    ) -> RuntimeResult<()>;

    fn read_condition_field(&self, condition: &NodeId, field: &QualifiedName) -> RuntimeResult<Variant>;

    fn read_condition_variable_field_property(
        &self,
        condition: &NodeId,
        variable: &QualifiedName,
        property: &QualifiedName,
    ) -> RuntimeResult<Variant>;

    /// Install (or replace) the pre-commit hook for `hook.condition` and `hook.kind`
    fn install_two_state_hook(&self, hook: TwoStateHook) -> RuntimeResult<()>;

    /// Publish a condition event carrying the current field values
    fn trigger_condition_event(&self, condition: &NodeId, source: &NodeId) -> RuntimeResult<EventId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tables_line_up() {
        for (i, kind) in TransitionKind::ALL.into_iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(TransitionKind::from_variable(kind.variable()), Some(kind));
        }
        assert_eq!(TransitionKind::from_variable("Severity"), None);
        assert_eq!(TransitionKind::EnteringActive.state_text(false), "Inactive");
    }

    #[test]
    fn request_builder() {
        let request = ConditionRequest::new(NodeId::numeric(0, 10637), "Pump", NodeId::numeric(1, 1))
            .parent_reference(NodeId::numeric(0, 47));
        assert_eq!(request.browse_name, QualifiedName::new(0, "Pump"));
        assert_eq!(request.parent_reference, Some(NodeId::numeric(0, 47)));
        assert!(request.requested_id.is_none());
    }
}
