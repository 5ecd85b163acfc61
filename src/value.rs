// src/value.rs - Typed scalar values written into condition fields
use crate::node::{LocalizedText, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value carried by condition fields and session attributes
///
/// Each variant maps to one built-in OPC UA data type. Field writes are
/// checked against the declared [`VariantType`] of the target field.
///
/// # Examples
///
/// ```rust
/// use petra_ac::{Variant, VariantType};
///
/// let severity = Variant::from(400u16);
/// assert_eq!(severity.variant_type(), VariantType::UInt16);
/// assert_eq!(Variant::from(true).as_bool(), Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    #[default]
    Empty,
    Boolean(bool),
    UInt16(u16),
    UInt32(u32),
    Int32(i32),
    Double(f64),
    String(String),
    LocalizedText(LocalizedText),
    DateTime(DateTime<Utc>),
    ByteString(Vec<u8>),
    NodeId(NodeId),
}

/// Type tag of a [`Variant`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantType {
    Empty,
    Boolean,
    UInt16,
    UInt32,
    Int32,
    Double,
    String,
    LocalizedText,
    DateTime,
    ByteString,
    NodeId,
}

impl VariantType {
    pub fn name(self) -> &'static str {
        match self {
            VariantType::Empty => "Empty",
            VariantType::Boolean => "Boolean",
            VariantType::UInt16 => "UInt16",
            VariantType::UInt32 => "UInt32",
            VariantType::Int32 => "Int32",
            VariantType::Double => "Double",
            VariantType::String => "String",
            VariantType::LocalizedText => "LocalizedText",
            VariantType::DateTime => "DateTime",
            VariantType::ByteString => "ByteString",
            VariantType::NodeId => "NodeId",
        }
    }
}

impl Variant {
    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::Empty => VariantType::Empty,
            Variant::Boolean(_) => VariantType::Boolean,
            Variant::UInt16(_) => VariantType::UInt16,
            Variant::UInt32(_) => VariantType::UInt32,
            Variant::Int32(_) => VariantType::Int32,
            Variant::Double(_) => VariantType::Double,
            Variant::String(_) => VariantType::String,
            Variant::LocalizedText(_) => VariantType::LocalizedText,
            Variant::DateTime(_) => VariantType::DateTime,
            Variant::ByteString(_) => VariantType::ByteString,
            Variant::NodeId(_) => VariantType::NodeId,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.variant_type().name()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Unsigned view over the integer variants
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Variant::UInt16(v) => Some(u32::from(*v)),
            Variant::UInt32(v) => Some(*v),
            Variant::Int32(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Text view over `String` and `LocalizedText`
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            Variant::LocalizedText(t) => Some(&t.text),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Variant::DateTime(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Empty => write!(f, "<empty>"),
            Variant::Boolean(b) => write!(f, "{}", b),
            Variant::UInt16(v) => write!(f, "{}", v),
            Variant::UInt32(v) => write!(f, "{}", v),
            Variant::Int32(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(s) => write!(f, "{}", s),
            Variant::LocalizedText(t) => write!(f, "{}", t),
            Variant::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
            Variant::ByteString(b) => write!(f, "<{} bytes>", b.len()),
            Variant::NodeId(id) => write!(f, "{}", id),
        }
    }
}

// Conversions used by the fluent field-write API

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Boolean(v)
    }
}

impl From<u16> for Variant {
    fn from(v: u16) -> Self {
        Variant::UInt16(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::UInt32(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<LocalizedText> for Variant {
    fn from(v: LocalizedText) -> Self {
        Variant::LocalizedText(v)
    }
}

impl From<DateTime<Utc>> for Variant {
    fn from(v: DateTime<Utc>) -> Self {
        Variant::DateTime(v)
    }
}

impl From<Vec<u8>> for Variant {
    fn from(v: Vec<u8>) -> Self {
        Variant::ByteString(v)
    }
}

impl From<NodeId> for Variant {
    fn from(v: NodeId) -> Self {
        Variant::NodeId(v)
    }
}
