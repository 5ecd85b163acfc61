// src/onoff.rs - Two-state on/off alarm
//
// Inactive -> Active -> Inactive, driven by `set_active`. Leaving the active
// state also clears acknowledgement and confirmation so an inactive alarm is
// never reported as acked or confirmed.

use crate::{
    condition::Condition,
    error::Result,
    node::{object_type_id, reference_type_id, EventId, LocalizedText, NodeId, QualifiedName, StatusCode},
    runtime::{ConditionRequest, TransitionKind},
    server::ServerHandle,
    session::Session,
};
use chrono::Utc;
use log::debug;
use serde::Serialize;
use std::fmt;
use std::ops::Deref;

pub const DEFAULT_NAME: &str = "OnOffCondition";
pub const DEFAULT_SEVERITY: u16 = 400;

const ACTIVE_MESSAGE: &str = "Alarm active";
const INACTIVE_MESSAGE: &str = "Alarm inactive";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OnOffState {
    Inactive,
    Active,
}

impl OnOffState {
    fn default_message(self) -> &'static str {
        match self {
            OnOffState::Active => ACTIVE_MESSAGE,
            OnOffState::Inactive => INACTIVE_MESSAGE,
        }
    }
}

impl From<bool> for OnOffState {
    fn from(active: bool) -> Self {
        if active {
            OnOffState::Active
        } else {
            OnOffState::Inactive
        }
    }
}

impl fmt::Display for OnOffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnOffState::Active => write!(f, "Active"),
            OnOffState::Inactive => write!(f, "Inactive"),
        }
    }
}

/// Off-normal alarm with a single `set_active` mutation
///
/// # Examples
///
/// ```rust
/// use petra_ac::{InMemoryServer, OnOffCondition, OnOffState};
///
/// let runtime = InMemoryServer::new();
/// let server = runtime.handle();
/// let source = runtime.add_event_source("Compressor")?;
///
/// let alarm = OnOffCondition::with_defaults(&server, &source)?;
/// assert_eq!(alarm.state()?, OnOffState::Inactive);
///
/// alarm.set_active(&source, true, Some("Discharge pressure high"))?;
/// assert_eq!(alarm.state()?, OnOffState::Active);
/// # Ok::<(), petra_ac::AcError>(())
/// ```
#[derive(Debug)]
pub struct OnOffCondition {
    condition: Condition,
    source: NodeId,
}

impl OnOffCondition {
    /// Create the condition and put it in its initial state
    ///
    /// Initial state: enabled, `Severity = initial_severity`,
    /// `Message = "Alarm inactive"`, `Retain = false`.
    pub fn new(
        server: &ServerHandle,
        source: &NodeId,
        browse_name: impl Into<QualifiedName>,
        parent_reference: Option<NodeId>,
        initial_severity: u16,
    ) -> Result<Self> {
        let mut request =
            ConditionRequest::new(object_type_id::OFF_NORMAL_ALARM_TYPE, browse_name, source.clone());
        if let Some(reference_type) = parent_reference {
            request = request.parent_reference(reference_type);
        }
        let condition = Condition::create(server, request)?;

        // A failed write here drops `condition`, which deletes the node again
        condition
            .set_variable_field(TransitionKind::EnteringEnabled.variable(), "Id", true)?
            .set_field("Severity", initial_severity)?
            .set_field("Message", LocalizedText::new("", INACTIVE_MESSAGE))?
            .set_field("Retain", false)?;

        Ok(Self {
            condition,
            source: source.clone(),
        })
    }

    /// `OnOffCondition` exposed under its source with severity 400
    pub fn with_defaults(server: &ServerHandle, source: &NodeId) -> Result<Self> {
        Self::new(
            server,
            source,
            DEFAULT_NAME,
            Some(reference_type_id::HAS_COMPONENT),
            DEFAULT_SEVERITY,
        )
    }

    /// Move to `active` and publish the new state from `source`
    ///
    /// An empty or missing message falls back to "Alarm active" / "Alarm inactive".
    pub fn set_active(&self, source: &NodeId, active: bool, message: Option<&str>) -> Result<EventId> {
        let target = OnOffState::from(active);
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| target.default_message());
        debug!(
            "Condition {} -> {} ({})",
            self.condition.id(),
            target,
            message
        );

        self.condition
            .set_field("Message", LocalizedText::new("", message))?
            .set_field("Time", Utc::now())?
            .set_field("Retain", active)?
            .set_variable_field(TransitionKind::EnteringActive.variable(), "Id", active)?;

        if !active {
            self.condition
                .set_variable_field(TransitionKind::EnteringAcked.variable(), "Id", false)?
                .set_variable_field(TransitionKind::EnteringConfirmed.variable(), "Id", false)?;
        }

        self.condition.trigger(source)
    }

    pub fn state(&self) -> Result<OnOffState> {
        Ok(self.condition.two_state(TransitionKind::EnteringActive)?.into())
    }

    /// Source node the condition was created for
    pub fn source(&self) -> &NodeId {
        &self.source
    }

    pub fn into_condition(self) -> Condition {
        self.condition
    }

    // Callback registration bound to the condition's own source

    pub fn on_enabled<F>(&self, callback: F, remove_branch: bool) -> Result<&Self>
    where
        F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.condition.on_enabled(&self.source, callback, remove_branch)?;
        Ok(self)
    }

    pub fn on_about_to_be_acked<F>(&self, callback: F, remove_branch: bool) -> Result<&Self>
    where
        F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.condition.on_about_to_be_acked(&self.source, callback, remove_branch)?;
        Ok(self)
    }

    pub fn on_about_to_be_confirmed<F>(&self, callback: F, remove_branch: bool) -> Result<&Self>
    where
        F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.condition.on_about_to_be_confirmed(&self.source, callback, remove_branch)?;
        Ok(self)
    }

    pub fn on_active<F>(&self, callback: F, remove_branch: bool) -> Result<&Self>
    where
        F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.condition.on_active(&self.source, callback, remove_branch)?;
        Ok(self)
    }
}

impl Deref for OnOffCondition {
    type Target = Condition;

    fn deref(&self) -> &Condition {
        &self.condition
    }
}
