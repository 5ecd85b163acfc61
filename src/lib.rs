//! PETRA A&C - OPC UA Alarms & Conditions core
//!
//! Condition entities, the two-state transition callback registry with its
//! dispatcher, the on/off alarm state machine and the identity-annotating
//! access-control layer, written against an abstract server runtime. An
//! in-memory runtime is included for the demo binary and the tests.
//!
//! # Examples
//!
//! ```rust
//! use petra_ac::{InMemoryServer, OnOffCondition, StatusCode};
//!
//! petra_ac::init_logging();
//!
//! let runtime = InMemoryServer::new();
//! let server = runtime.handle();
//! let source = runtime.add_event_source("ConditionSource")?;
//!
//! let alarm = OnOffCondition::with_defaults(&server, &source)?;
//! alarm
//!     .on_enabled(|_, _, _| StatusCode::GOOD, false)?
//!     .on_about_to_be_acked(|session, _, _| {
//!         if session.is_admin() { StatusCode::GOOD } else { StatusCode::BAD_USER_ACCESS_DENIED }
//!     }, false)?;
//!
//! alarm.set_active(&source, true, None)?;
//! # Ok::<(), petra_ac::AcError>(())
//! ```

// ============================================================================
// CORE TYPES
// ============================================================================

/// Error type and crate-wide `Result`
pub mod error;

/// Node ids, names, status codes
pub mod node;

/// Typed values carried by condition fields
pub mod value;

// ============================================================================
// CONDITION CORE
// ============================================================================

/// Interface the core needs from an OPC UA server runtime
pub mod runtime;

/// Per-instance handle bundling runtime, registry and sessions
pub mod server;

/// Session attribute store and session handles
pub mod session;

/// Transition callback registry and dispatch
pub mod registry;

/// Condition entity
pub mod condition;

/// On/off alarm state machine
pub mod onoff;

/// Identity annotation and access control
pub mod access;

// ============================================================================
// RUNTIME & CONFIGURATION
// ============================================================================

/// In-memory server runtime
pub mod memory;

/// YAML configuration for the demo server
pub mod config;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use access::{
    decide_identity, AccessControl, AccessLevel, DefaultAccessControl, IdentityAccessControl, IdentityToken,
};
pub use condition::Condition;
pub use config::{AccessControlConfig, ConditionConfig, Config, ServerConfig, UserLogin};
pub use error::{AcError, Result};
pub use memory::InMemoryServer;
pub use node::{
    object_id, object_type_id, reference_type_id, EventId, Identifier, LocalizedText, NodeId, QualifiedName,
    RuntimeResult, SessionId, StatusCode,
};
pub use onoff::{OnOffCondition, OnOffState};
pub use registry::{transition_callback, TransitionCallback, TransitionRegistry};
pub use runtime::{
    ConditionEvent, ConditionRequest, ServerRuntime, TransitionInterceptor, TransitionKind, TwoStateHook,
};
pub use server::ServerHandle;
pub use session::{AttributeValue, IdentityType, Session, SessionAttributeStore, SessionIdentity};
pub use value::{Variant, VariantType};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the `env_logger` backend
///
/// Honours `RUST_LOG`; defaults to `info`. Calling it more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .try_init();
}
