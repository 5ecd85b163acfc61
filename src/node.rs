// src/node.rs - Address-space identifiers and status codes
//
// Purpose:
// --------
// Plain value types shared by every other module: node identifiers, qualified
// and localized names, OPC UA status codes, session ids and event ids. The
// well-known numeric ids used by the condition core live here as well.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// NODE IDENTIFIERS
// ============================================================================

/// Identifier part of a [`NodeId`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(Uuid),
}

/// Globally unique address-space node identifier
///
/// The null id (`ns=0;i=0`) is the [`Default`] and stands for "no node".
///
/// # Examples
///
/// ```rust
/// use petra_ac::NodeId;
///
/// let id = NodeId::numeric(1, 2001);
/// assert_eq!(id.to_string(), "ns=1;i=2001");
/// assert!(NodeId::null().is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub const fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    pub fn guid(namespace: u16, value: Uuid) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(value),
        }
    }

    pub const fn null() -> Self {
        Self::numeric(0, 0)
    }

    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "ns={};i={}", self.namespace, v),
            Identifier::String(v) => write!(f, "ns={};s={}", self.namespace, v),
            Identifier::Guid(v) => write!(f, "ns={};g={}", self.namespace, v),
        }
    }
}

/// Standard objects of namespace 0
pub mod object_id {
    use super::NodeId;

    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);
}

/// Standard reference types of namespace 0
pub mod reference_type_id {
    use super::NodeId;

    pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);
    pub const HAS_EVENT_SOURCE: NodeId = NodeId::numeric(0, 36);
    pub const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);
    pub const HAS_NOTIFIER: NodeId = NodeId::numeric(0, 48);
    pub const HAS_CONDITION: NodeId = NodeId::numeric(0, 9006);
}

/// Standard condition types of namespace 0
pub mod object_type_id {
    use super::NodeId;

    pub const BASE_OBJECT_TYPE: NodeId = NodeId::numeric(0, 58);
    pub const CONDITION_TYPE: NodeId = NodeId::numeric(0, 2782);
    pub const ACKNOWLEDGEABLE_CONDITION_TYPE: NodeId = NodeId::numeric(0, 2881);
    pub const ALARM_CONDITION_TYPE: NodeId = NodeId::numeric(0, 2915);
    pub const DISCRETE_ALARM_TYPE: NodeId = NodeId::numeric(0, 10523);
    pub const OFF_NORMAL_ALARM_TYPE: NodeId = NodeId::numeric(0, 10637);
}

// ============================================================================
// NAMES
// ============================================================================

/// Namespace-qualified browse name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub namespace: u16,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

impl From<&str> for QualifiedName {
    fn from(name: &str) -> Self {
        Self::new(0, name)
    }
}

impl From<String> for QualifiedName {
    fn from(name: String) -> Self {
        Self::new(0, name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.namespace, self.name)
        }
    }
}

/// Human readable text with an optional locale
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub locale: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }
}

impl From<&str> for LocalizedText {
    fn from(text: &str) -> Self {
        Self::new("", text)
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ============================================================================
// STATUS CODES
// ============================================================================

/// OPC UA status code
///
/// The top two bits carry the severity: `00` good, `01` uncertain, `10` bad.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: Self = Self(0x0000_0000);
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    pub const BAD_USER_ACCESS_DENIED: Self = Self(0x801F_0000);
    pub const BAD_IDENTITY_TOKEN_INVALID: Self = Self(0x8020_0000);
    pub const BAD_IDENTITY_TOKEN_REJECTED: Self = Self(0x8021_0000);
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    pub const BAD_NOT_SUPPORTED: Self = Self(0x803D_0000);
    pub const BAD_NOT_FOUND: Self = Self(0x803E_0000);
    pub const BAD_NOT_WRITABLE: Self = Self(0x803B_0000);
    pub const BAD_REFERENCE_TYPE_ID_INVALID: Self = Self(0x804C_0000);
    pub const BAD_NODE_ID_EXISTS: Self = Self(0x805E_0000);
    pub const BAD_BROWSE_NAME_DUPLICATED: Self = Self(0x8061_0000);
    pub const BAD_SOURCE_NODE_ID_INVALID: Self = Self(0x8064_0000);
    pub const BAD_NO_MATCH: Self = Self(0x806F_0000);
    pub const BAD_TYPE_MISMATCH: Self = Self(0x8074_0000);
    pub const BAD_TYPE_DEFINITION_INVALID: Self = Self(0x8075_0000);
    pub const BAD_CONDITION_ALREADY_DISABLED: Self = Self(0x8098_0000);
    pub const BAD_CONDITION_ALREADY_ENABLED: Self = Self(0x8099_0000);
    pub const BAD_INVALID_ARGUMENT: Self = Self(0x80AB_0000);
    pub const BAD_CONDITION_BRANCH_ALREADY_ACKED: Self = Self(0x80CF_0000);
    pub const BAD_CONDITION_BRANCH_ALREADY_CONFIRMED: Self = Self(0x80D0_0000);

    pub fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub fn is_uncertain(self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Symbolic name for the codes this crate produces
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::GOOD => "Good",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_USER_ACCESS_DENIED => "BadUserAccessDenied",
            Self::BAD_IDENTITY_TOKEN_INVALID => "BadIdentityTokenInvalid",
            Self::BAD_IDENTITY_TOKEN_REJECTED => "BadIdentityTokenRejected",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_NOT_SUPPORTED => "BadNotSupported",
            Self::BAD_NOT_FOUND => "BadNotFound",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_REFERENCE_TYPE_ID_INVALID => "BadReferenceTypeIdInvalid",
            Self::BAD_NODE_ID_EXISTS => "BadNodeIdExists",
            Self::BAD_BROWSE_NAME_DUPLICATED => "BadBrowseNameDuplicated",
            Self::BAD_SOURCE_NODE_ID_INVALID => "BadSourceNodeIdInvalid",
            Self::BAD_NO_MATCH => "BadNoMatch",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            Self::BAD_TYPE_DEFINITION_INVALID => "BadTypeDefinitionInvalid",
            Self::BAD_CONDITION_ALREADY_DISABLED => "BadConditionAlreadyDisabled",
            Self::BAD_CONDITION_ALREADY_ENABLED => "BadConditionAlreadyEnabled",
            Self::BAD_INVALID_ARGUMENT => "BadInvalidArgument",
            Self::BAD_CONDITION_BRANCH_ALREADY_ACKED => "BadConditionBranchAlreadyAcked",
            Self::BAD_CONDITION_BRANCH_ALREADY_CONFIRMED => "BadConditionBranchAlreadyConfirmed",
            _ => return None,
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Result type used at the runtime boundary, where failures are bare status codes
pub type RuntimeResult<T> = std::result::Result<T, StatusCode>;

// ============================================================================
// SESSION AND EVENT IDS
// ============================================================================

/// Identifier of a client session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub NodeId);

impl SessionId {
    /// Allocate a fresh GUID-based session id
    pub fn new() -> Self {
        Self(NodeId::guid(1, Uuid::new_v4()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque correlation id of a published condition event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Vec<u8>);

impl EventId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_node_id() {
        assert!(NodeId::default().is_null());
        assert!(!NodeId::numeric(1, 0).is_null());
        assert!(!object_id::SERVER.is_null());
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::string(2, "Boiler").to_string(), "ns=2;s=Boiler");
        assert_eq!(reference_type_id::HAS_COMPONENT.to_string(), "ns=0;i=47");
    }

    #[test]
    fn status_severity_bits() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(StatusCode::BAD_INTERNAL_ERROR.is_bad());
        assert!(StatusCode(0x4000_0000).is_uncertain());
        assert_eq!(
            StatusCode::BAD_TYPE_MISMATCH.to_string(),
            "BadTypeMismatch (0x80740000)"
        );
        assert_eq!(StatusCode(0x8123_0000).to_string(), "0x81230000");
    }

    #[test]
    fn event_ids_are_unique() {
        let a = EventId::random();
        let b = EventId::random();
        assert_eq!(a.as_bytes().len(), 16);
        assert_ne!(a, b);
    }
}
