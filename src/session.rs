// src/session.rs - Per-session attribute store
use crate::{
    error::{AcError, Result},
    node::{QualifiedName, SessionId},
};
use dashmap::DashMap;
use log::{debug, trace};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Value of a free-form session attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    UInt32(u32),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "String",
            AttributeValue::Bool(_) => "Bool",
            AttributeValue::UInt32(_) => "UInt32",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::UInt32(v)
    }
}

/// Kind of identity a session authenticated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdentityType {
    Unknown,
    Anonymous,
    UserName,
    X509,
    Issued,
}

impl IdentityType {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityType::Unknown => "Unknown",
            IdentityType::Anonymous => "Anonymous",
            IdentityType::UserName => "UserName",
            IdentityType::X509 => "X509",
            IdentityType::Issued => "Issued",
        }
    }
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized identity facts recorded at session activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    pub identity_type: IdentityType,
    pub is_admin: bool,
    pub user_name: Option<String>,
    pub certificate_size: Option<u32>,
    pub issued_token_size: Option<u32>,
    pub issued_encryption_algorithm: Option<String>,
}

impl SessionIdentity {
    pub fn new(identity_type: IdentityType, is_admin: bool) -> Self {
        Self {
            identity_type,
            is_admin,
            user_name: None,
            certificate_size: None,
            issued_token_size: None,
            issued_encryption_algorithm: None,
        }
    }

    /// Key/value view under the attribute names clients of the store expect
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        match key {
            "identityType" => Some(self.identity_type.as_str().into()),
            "isAdmin" => Some(self.is_admin.into()),
            "userName" => self.user_name.clone().map(AttributeValue::String),
            "certSize" => self.certificate_size.map(AttributeValue::UInt32),
            "issuedTokenSize" => self.issued_token_size.map(AttributeValue::UInt32),
            "issuedEncAlgo" => self
                .issued_encryption_algorithm
                .clone()
                .map(AttributeValue::String),
            _ => None,
        }
    }
}

/// Everything stored for one session
#[derive(Debug, Clone, Default)]
pub struct SessionAttributes {
    pub identity: Option<SessionIdentity>,
    pub values: HashMap<QualifiedName, AttributeValue>,
}

impl SessionAttributes {
    fn lookup(&self, key: &QualifiedName) -> Option<AttributeValue> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        if key.namespace != 0 {
            return None;
        }
        self.identity.as_ref().and_then(|id| id.attribute(&key.name))
    }
}

/// Thread-safe per-session scratch space
///
/// Entries are created implicitly on first write and dropped when the session
/// closes. Nothing is persisted across sessions.
///
/// # Examples
///
/// ```rust
/// use petra_ac::{SessionAttributeStore, SessionId};
///
/// let store = SessionAttributeStore::new();
/// let session = SessionId::new();
/// store.set(&session, "shift", "night");
/// assert_eq!(store.get_string(&session, "shift")?, "night");
/// assert!(store.get(&session, "missing").is_err());
/// # Ok::<(), petra_ac::AcError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionAttributeStore {
    sessions: Arc<DashMap<SessionId, SessionAttributes>>,
}

impl SessionAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty entry for a freshly activated session
    pub fn open(&self, session: &SessionId) {
        self.sessions.entry(session.clone()).or_default();
    }

    /// Drop everything stored for the session
    pub fn close(&self, session: &SessionId) -> Option<SessionAttributes> {
        debug!("Dropping attributes of session {}", session);
        self.sessions.remove(session).map(|(_, attrs)| attrs)
    }

    pub fn contains(&self, session: &SessionId) -> bool {
        self.sessions.contains_key(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn set(
        &self,
        session: &SessionId,
        key: impl Into<QualifiedName>,
        value: impl Into<AttributeValue>,
    ) {
        let key = key.into();
        let value = value.into();
        trace!("Session {} attribute {} = {:?}", session, key, value);
        self.sessions
            .entry(session.clone())
            .or_default()
            .values
            .insert(key, value);
    }

    pub fn get(&self, session: &SessionId, key: impl Into<QualifiedName>) -> Result<AttributeValue> {
        let key = key.into();
        self.sessions
            .get(session)
            .and_then(|attrs| attrs.lookup(&key))
            .ok_or_else(|| AcError::AttributeNotFound(key.to_string()))
    }

    pub fn get_bool(&self, session: &SessionId, key: impl Into<QualifiedName>) -> Result<bool> {
        match self.get(session, key)? {
            AttributeValue::Bool(b) => Ok(b),
            other => Err(AcError::TypeMismatch {
                expected: "Bool",
                actual: other.type_name(),
            }),
        }
    }

    pub fn get_string(&self, session: &SessionId, key: impl Into<QualifiedName>) -> Result<String> {
        match self.get(session, key)? {
            AttributeValue::String(s) => Ok(s),
            other => Err(AcError::TypeMismatch {
                expected: "String",
                actual: other.type_name(),
            }),
        }
    }

    pub fn get_u32(&self, session: &SessionId, key: impl Into<QualifiedName>) -> Result<u32> {
        match self.get(session, key)? {
            AttributeValue::UInt32(v) => Ok(v),
            other => Err(AcError::TypeMismatch {
                expected: "UInt32",
                actual: other.type_name(),
            }),
        }
    }

    /// Session handle for `id`, or the anonymous placeholder when there is none
    pub fn session(&self, id: Option<&SessionId>) -> Session {
        match id {
            Some(id) => Session::new(id.clone(), self.clone()),
            None => Session::anonymous(self.clone()),
        }
    }

    pub fn record_identity(&self, session: &SessionId, identity: SessionIdentity) {
        self.sessions.entry(session.clone()).or_default().identity = Some(identity);
    }

    pub fn identity(&self, session: &SessionId) -> Option<SessionIdentity> {
        self.sessions
            .get(session)
            .and_then(|attrs| attrs.identity.clone())
    }
}

/// Session handle passed to transition callbacks
///
/// Built by the dispatch layer from the id the runtime supplies; transitions
/// driven by the server itself carry the anonymous placeholder (no id).
#[derive(Debug, Clone)]
pub struct Session {
    id: Option<SessionId>,
    store: SessionAttributeStore,
}

impl Session {
    pub fn new(id: SessionId, store: SessionAttributeStore) -> Self {
        Self { id: Some(id), store }
    }

    pub fn anonymous(store: SessionAttributeStore) -> Self {
        Self { id: None, store }
    }

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        self.id.as_ref().and_then(|id| self.store.identity(id))
    }

    /// Admin flag recorded at activation; absent means not admin
    pub fn is_admin(&self) -> bool {
        self.identity().map(|id| id.is_admin).unwrap_or(false)
    }

    pub fn attribute(&self, key: impl Into<QualifiedName>) -> Result<AttributeValue> {
        let key = key.into();
        match &self.id {
            Some(id) => self.store.get(id, key),
            None => Err(AcError::AttributeNotFound(key.to_string())),
        }
    }

    /// No-op on the anonymous placeholder
    pub fn set_attribute(&self, key: impl Into<QualifiedName>, value: impl Into<AttributeValue>) {
        match &self.id {
            Some(id) => self.store.set(id, key, value),
            None => debug!("Ignoring attribute write on the anonymous session"),
        }
    }
}
