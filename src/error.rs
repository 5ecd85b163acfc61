use crate::node::StatusCode;
use thiserror::Error;

/// Application level error type used throughout the crate.
#[derive(Error, Debug)]
pub enum AcError {
    /// The runtime refused to instantiate a condition
    #[error("Condition '{browse_name}' could not be created: {status}")]
    CreationFailed { browse_name: String, status: StatusCode },

    /// A direct condition field could not be written
    #[error("Field '{field}' write failed: {status}")]
    FieldWriteFailed { field: String, status: StatusCode },

    /// A property of a compound variable field could not be written
    #[error("Field '{variable}/{property}' write failed: {status}")]
    NestedFieldWriteFailed {
        variable: String,
        property: String,
        status: StatusCode,
    },

    /// A condition field could not be read back
    #[error("Field '{field}' read failed: {status}")]
    FieldReadFailed { field: String, status: StatusCode },

    /// The condition event could not be published
    #[error("Trigger from source {source_node} failed: {status}")]
    TriggerFailed { source_node: String, status: StatusCode },

    /// A two-state transition hook could not be installed
    #[error("Transition hook for {kind} could not be installed: {status}")]
    HookInstallFailed { kind: String, status: StatusCode },

    /// Any other runtime call failed
    #[error("Runtime call failed: {0}")]
    Runtime(StatusCode),

    /// A user transition callback panicked
    #[error("Transition callback fault: {0}")]
    CallbackFault(String),

    /// Requested session attribute is not present
    #[error("Session attribute not found: {0}")]
    AttributeNotFound(String),

    /// Returned value type does not match the expected type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: &'static str, actual: &'static str },

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AcError {
    /// Runtime status code carried by the error, if it originated in the runtime.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AcError::CreationFailed { status, .. }
            | AcError::FieldWriteFailed { status, .. }
            | AcError::NestedFieldWriteFailed { status, .. }
            | AcError::FieldReadFailed { status, .. }
            | AcError::TriggerFailed { status, .. }
            | AcError::HookInstallFailed { status, .. }
            | AcError::Runtime(status) => Some(*status),
            AcError::CallbackFault(_) => Some(StatusCode::BAD_INTERNAL_ERROR),
            _ => None,
        }
    }
}

impl From<StatusCode> for AcError {
    fn from(status: StatusCode) -> Self {
        AcError::Runtime(status)
    }
}

/// Convenient alias over [`Result`] using [`AcError`]
pub type Result<T> = std::result::Result<T, AcError>;
