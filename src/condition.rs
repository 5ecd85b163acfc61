// src/condition.rs - Alarms & Conditions entity
//
// Purpose:
// --------
// Identity and field-mutation API of one condition instance living in the
// runtime's address space. The entity caches nothing: every field write goes
// straight to the runtime, and the only local state is the node id plus the
// ownership flag that decides whether dropping the value deletes the node.
//
// Interactions:
// -------------
// - Uses: runtime.rs through ServerHandle, registry.rs for transition callbacks
// - Used by: onoff.rs, the demo binary, integration tests

use crate::{
    error::{AcError, Result},
    node::{EventId, NodeId, QualifiedName, StatusCode},
    registry::{self, TransitionCallback},
    runtime::{ConditionRequest, TransitionKind},
    server::ServerHandle,
    session::Session,
    value::Variant,
};
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;

/// Handle to a condition node
///
/// An owning condition deletes its node exactly once when dropped (unless it
/// was [released](Condition::release)); a borrowed one never does.
///
/// # Examples
///
/// ```rust
/// use petra_ac::{object_type_id, reference_type_id, Condition, ConditionRequest, InMemoryServer};
///
/// let runtime = InMemoryServer::new();
/// let server = runtime.handle();
/// let source = runtime.add_object(&petra_ac::object_id::OBJECTS_FOLDER, "Boiler")?;
///
/// let condition = Condition::create(
///     &server,
///     ConditionRequest::new(object_type_id::OFF_NORMAL_ALARM_TYPE, "HighTemp", source.clone())
///         .parent_reference(reference_type_id::HAS_COMPONENT),
/// )?;
/// condition.set_field("Severity", 500u16)?;
/// # Ok::<(), petra_ac::AcError>(())
/// ```
pub struct Condition {
    server: ServerHandle,
    id: NodeId,
    owns: bool,
}

impl Condition {
    /// Instantiate a new condition node and take ownership of it
    pub fn create(server: &ServerHandle, request: ConditionRequest) -> Result<Self> {
        let id = server
            .runtime()
            .create_condition(&request)
            .map_err(|status| AcError::CreationFailed {
                browse_name: request.browse_name.to_string(),
                status,
            })?;
        debug!("Created condition {} ({})", request.browse_name, id);
        Ok(Self {
            server: server.clone(),
            id,
            owns: true,
        })
    }

    /// Wrap an existing condition node without taking ownership
    pub fn wrap(server: &ServerHandle, id: NodeId) -> Self {
        Self {
            server: server.clone(),
            id,
            owns: false,
        }
    }

    /// Borrowing handle to the same node
    pub fn borrowed(&self) -> Self {
        Self::wrap(&self.server, self.id.clone())
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    pub fn owns_node(&self) -> bool {
        self.owns && !self.id.is_null()
    }

    /// Give up ownership and return the id; dropping `self` then deletes nothing
    #[must_use]
    pub fn release(mut self) -> NodeId {
        self.owns = false;
        std::mem::take(&mut self.id)
    }

    // ------------------------------------------------------------------------
    // Field access
    // ------------------------------------------------------------------------

    /// Write a direct field such as `Message`, `Severity`, `Retain` or `Time`
    pub fn set_field(&self, field: impl Into<QualifiedName>, value: impl Into<Variant>) -> Result<&Self> {
        let field = field.into();
        self.server
            .runtime()
            .set_condition_field(&self.id, &field, &value.into())
            .map_err(|status| AcError::FieldWriteFailed {
                field: field.to_string(),
                status,
            })?;
        Ok(self)
    }

    /// Write a property of a compound variable field, e.g. `ActiveState/Id`
    pub fn set_variable_field(
        &self,
        variable: impl Into<QualifiedName>,
        property: impl Into<QualifiedName>,
        value: impl Into<Variant>,
    ) -> Result<&Self> {
        let variable = variable.into();
        let property = property.into();
        self.server
            .runtime()
            .set_condition_variable_field_property(&self.id, &variable, &property, &value.into())
            .map_err(|status| AcError::NestedFieldWriteFailed {
                variable: variable.to_string(),
                property: property.to_string(),
                status,
            })?;
        Ok(self)
    }

    pub fn field(&self, field: impl Into<QualifiedName>) -> Result<Variant> {
        let field = field.into();
        self.server
            .runtime()
            .read_condition_field(&self.id, &field)
            .map_err(|status| AcError::FieldReadFailed {
                field: field.to_string(),
                status,
            })
    }

    pub fn variable_field(
        &self,
        variable: impl Into<QualifiedName>,
        property: impl Into<QualifiedName>,
    ) -> Result<Variant> {
        let variable = variable.into();
        let property = property.into();
        self.server
            .runtime()
            .read_condition_variable_field_property(&self.id, &variable, &property)
            .map_err(|status| AcError::FieldReadFailed {
                field: format!("{}/{}", variable, property),
                status,
            })
    }

    /// `Id` of the two-state variable driven by `kind`
    pub fn two_state(&self, kind: TransitionKind) -> Result<bool> {
        let value = self.variable_field(kind.variable(), "Id")?;
        value.as_bool().ok_or(AcError::TypeMismatch {
            expected: "Boolean",
            actual: value.type_name(),
        })
    }

    /// Publish a condition event carrying the current field values
    pub fn trigger(&self, source: &NodeId) -> Result<EventId> {
        self.server
            .runtime()
            .trigger_condition_event(&self.id, source)
            .map_err(|status| AcError::TriggerFailed {
                source_node: source.to_string(),
                status,
            })
    }

    // ------------------------------------------------------------------------
    // Transition callbacks
    // ------------------------------------------------------------------------

    /// Register the callback run before `kind`'s variable becomes true
    ///
    /// Replaces any callback previously registered for the same kind.
    pub fn register_transition(
        &self,
        kind: TransitionKind,
        source: &NodeId,
        remove_branch: bool,
        callback: TransitionCallback,
    ) -> Result<&Self> {
        registry::register_transition(&self.server, &self.id, kind, source, remove_branch, callback)?;
        Ok(self)
    }

    pub fn on_enabled<F>(&self, source: &NodeId, callback: F, remove_branch: bool) -> Result<&Self>
    where
        F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.register_transition(TransitionKind::EnteringEnabled, source, remove_branch, Arc::new(callback))
    }

    pub fn on_about_to_be_acked<F>(&self, source: &NodeId, callback: F, remove_branch: bool) -> Result<&Self>
    where
        F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.register_transition(TransitionKind::EnteringAcked, source, remove_branch, Arc::new(callback))
    }

    pub fn on_about_to_be_confirmed<F>(&self, source: &NodeId, callback: F, remove_branch: bool) -> Result<&Self>
    where
        F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.register_transition(TransitionKind::EnteringConfirmed, source, remove_branch, Arc::new(callback))
    }

    pub fn on_active<F>(&self, source: &NodeId, callback: F, remove_branch: bool) -> Result<&Self>
    where
        F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.register_transition(TransitionKind::EnteringActive, source, remove_branch, Arc::new(callback))
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        if !self.owns_node() {
            return;
        }
        match self.server.runtime().delete_node(&self.id, true) {
            Ok(()) => {
                self.server.registry().remove(&self.id);
            }
            // The node and its hooks survive, so its callbacks stay registered
            Err(status) => warn!("Failed to delete condition {}: {}", self.id, status),
        }
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server && self.id == other.id
    }
}

impl Eq for Condition {}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("id", &self.id)
            .field("owns", &self.owns)
            .finish()
    }
}
