// src/access.rs - Session identity annotation and access control
//
// Purpose:
// --------
// Decodes the identity token a client activates with into a plain
// `SessionIdentity`, records it in the session attribute store, and answers
// per-node access-level questions from the recorded admin flag. Accepting or
// rejecting the session stays with the wrapped collaborator.
//
// Interactions:
// -------------
// - Uses: session.rs (attribute store), server.rs (browse names for logging)
// - Used by: main.rs, tests/access_control.rs
//
// Demo policy: user name "admin" and every certificate or issued token are
// admins, everything else is not. This is not a security guarantee.

use crate::{
    config::AccessControlConfig,
    node::{NodeId, SessionId, StatusCode},
    server::ServerHandle,
    session::{IdentityType, SessionIdentity},
};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr};

const ADMIN_USER: &str = "admin";

// ============================================================================
// IDENTITY TOKENS
// ============================================================================

/// Identity token negotiated at session activation
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityToken {
    Anonymous,
    UserName { user_name: String, password: String },
    X509 { certificate: Vec<u8> },
    Issued {
        token_data: Vec<u8>,
        encryption_algorithm: String,
    },
}

impl IdentityToken {
    pub fn user_name(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        IdentityToken::UserName {
            user_name: user_name.into(),
            password: password.into(),
        }
    }

    pub fn identity_type(&self) -> IdentityType {
        match self {
            IdentityToken::Anonymous => IdentityType::Anonymous,
            IdentityToken::UserName { .. } => IdentityType::UserName,
            IdentityToken::X509 { .. } => IdentityType::X509,
            IdentityToken::Issued { .. } => IdentityType::Issued,
        }
    }
}

// Passwords and token bytes stay out of logs
impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityToken::Anonymous => write!(f, "Anonymous"),
            IdentityToken::UserName { user_name, .. } => f
                .debug_struct("UserName")
                .field("user_name", user_name)
                .finish_non_exhaustive(),
            IdentityToken::X509 { certificate } => f
                .debug_struct("X509")
                .field("certificate_size", &certificate.len())
                .finish(),
            IdentityToken::Issued {
                token_data,
                encryption_algorithm,
            } => f
                .debug_struct("Issued")
                .field("token_size", &token_data.len())
                .field("encryption_algorithm", encryption_algorithm)
                .finish(),
        }
    }
}

/// Decode a token into the identity record stored for the session
pub fn decide_identity(token: &IdentityToken) -> SessionIdentity {
    match token {
        IdentityToken::Anonymous => SessionIdentity::new(IdentityType::Anonymous, false),
        IdentityToken::UserName { user_name, .. } => {
            let mut identity = SessionIdentity::new(IdentityType::UserName, user_name == ADMIN_USER);
            identity.user_name = Some(user_name.clone());
            identity
        }
        IdentityToken::X509 { certificate } => {
            let mut identity = SessionIdentity::new(IdentityType::X509, true);
            identity.certificate_size = Some(saturating_len(certificate));
            identity
        }
        IdentityToken::Issued {
            token_data,
            encryption_algorithm,
        } => {
            let mut identity = SessionIdentity::new(IdentityType::Issued, true);
            identity.issued_token_size = Some(saturating_len(token_data));
            identity.issued_encryption_algorithm = Some(encryption_algorithm.clone());
            identity
        }
    }
}

fn saturating_len(bytes: &[u8]) -> u32 {
    u32::try_from(bytes.len()).unwrap_or(u32::MAX)
}

// ============================================================================
// ACCESS LEVELS
// ============================================================================

/// Variable access-level bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessLevel(u8);

impl AccessLevel {
    pub const NONE: AccessLevel = AccessLevel(0);
    pub const CURRENT_READ: AccessLevel = AccessLevel(0x01);
    pub const CURRENT_WRITE: AccessLevel = AccessLevel(0x02);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: AccessLevel) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn can_read(self) -> bool {
        self.contains(Self::CURRENT_READ)
    }

    pub const fn can_write(self) -> bool {
        self.contains(Self::CURRENT_WRITE)
    }
}

impl BitOr for AccessLevel {
    type Output = AccessLevel;

    fn bitor(self, rhs: Self) -> Self {
        AccessLevel(self.0 | rhs.0)
    }
}

impl BitAnd for AccessLevel {
    type Output = AccessLevel;

    fn bitand(self, rhs: Self) -> Self {
        AccessLevel(self.0 & rhs.0)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.can_read(), self.can_write()) {
            (true, true) => write!(f, "read/write"),
            (true, false) => write!(f, "read-only"),
            (false, true) => write!(f, "write-only"),
            (false, false) => write!(f, "none"),
        }
    }
}

// ============================================================================
// ACCESS CONTROL
// ============================================================================

/// Session-level access-control decisions made by the server
#[cfg_attr(test, mockall::automock)]
pub trait AccessControl: Send + Sync {
    /// Accept (`Good`) or reject the session's identity token
    fn activate_session(&self, session: &SessionId, token: &IdentityToken) -> StatusCode;

    fn close_session(&self, session: &SessionId);

    fn user_access_level(&self, session: &SessionId, node: &NodeId) -> AccessLevel;
}

/// Login-table policy
#[derive(Debug, Clone, Default)]
pub struct DefaultAccessControl {
    allow_anonymous: bool,
    allow_token_identities: bool,
    logins: HashMap<String, String>,
}

impl DefaultAccessControl {
    pub fn new(allow_anonymous: bool) -> Self {
        Self {
            allow_anonymous,
            ..Self::default()
        }
    }

    pub fn from_config(config: &AccessControlConfig) -> Self {
        config
            .users
            .iter()
            .fold(Self::new(config.allow_anonymous), |ac, login| {
                ac.with_login(&login.user_name, &login.password)
            })
            .allow_token_identities(config.allow_token_identities)
    }

    pub fn with_login(mut self, user_name: impl Into<String>, password: impl Into<String>) -> Self {
        self.logins.insert(user_name.into(), password.into());
        self
    }

    /// Accept certificate and issued-token identities
    pub fn allow_token_identities(mut self, allow: bool) -> Self {
        self.allow_token_identities = allow;
        self
    }
}

impl AccessControl for DefaultAccessControl {
    fn activate_session(&self, session: &SessionId, token: &IdentityToken) -> StatusCode {
        let status = match token {
            IdentityToken::Anonymous if self.allow_anonymous => StatusCode::GOOD,
            IdentityToken::Anonymous => StatusCode::BAD_IDENTITY_TOKEN_INVALID,
            IdentityToken::UserName { user_name, password } => {
                match self.logins.get(user_name) {
                    Some(expected) if expected == password => StatusCode::GOOD,
                    _ => StatusCode::BAD_USER_ACCESS_DENIED,
                }
            }
            IdentityToken::X509 { .. } | IdentityToken::Issued { .. } if self.allow_token_identities => {
                StatusCode::GOOD
            }
            IdentityToken::X509 { .. } | IdentityToken::Issued { .. } => {
                StatusCode::BAD_IDENTITY_TOKEN_REJECTED
            }
        };
        if status.is_bad() {
            warn!("Session {} rejected ({:?}): {}", session, token, status);
        }
        status
    }

    fn close_session(&self, session: &SessionId) {
        debug!("Session {} closed", session);
    }

    fn user_access_level(&self, _session: &SessionId, _node: &NodeId) -> AccessLevel {
        AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE
    }
}

/// Identity-annotating layer over another access-control policy
///
/// Records the decoded identity of every activating session and restricts
/// non-admin sessions to read-only access. Acceptance is left to `D`.
pub struct IdentityAccessControl<D> {
    inner: D,
    server: ServerHandle,
}

impl<D: AccessControl> IdentityAccessControl<D> {
    pub fn new(inner: D, server: &ServerHandle) -> Self {
        Self {
            inner,
            server: server.clone(),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Decode `token` and store the result for `session`
    pub fn decide_and_record_identity(&self, session: &SessionId, token: &IdentityToken) -> SessionIdentity {
        let identity = decide_identity(token);
        info!(
            "Session {} identity={} user={} admin={}",
            session,
            identity.identity_type,
            identity.user_name.as_deref().unwrap_or("-"),
            identity.is_admin
        );
        self.server.sessions().record_identity(session, identity.clone());
        identity
    }

    fn is_admin(&self, session: &SessionId) -> bool {
        // Not annotated yet means least privilege
        self.server
            .sessions()
            .get_bool(session, "isAdmin")
            .unwrap_or(false)
    }
}

impl<D: AccessControl> AccessControl for IdentityAccessControl<D> {
    fn activate_session(&self, session: &SessionId, token: &IdentityToken) -> StatusCode {
        self.decide_and_record_identity(session, token);
        let status = self.inner.activate_session(session, token);
        if !status.is_good() {
            // A rejected session never gets a close call
            self.server.sessions().close(session);
        }
        status
    }

    fn close_session(&self, session: &SessionId) {
        let identity = self.server.sessions().identity(session);
        info!(
            "Closing session {} identity={} user={}",
            session,
            identity
                .as_ref()
                .map(|id| id.identity_type)
                .unwrap_or(IdentityType::Unknown),
            identity
                .as_ref()
                .and_then(|id| id.user_name.as_deref())
                .unwrap_or("-")
        );
        self.inner.close_session(session);
        self.server.sessions().close(session);
    }

    fn user_access_level(&self, session: &SessionId, node: &NodeId) -> AccessLevel {
        let granted = if self.is_admin(session) {
            AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE
        } else {
            AccessLevel::CURRENT_READ
        };
        let level = granted & self.inner.user_access_level(session, node);

        let browse_name = self
            .server
            .runtime()
            .read_browse_name(node)
            .map(|name| name.to_string())
            .unwrap_or_else(|_| "<unavailable>".to_string());
        info!("Session {} access to {}: {}", session, browse_name, level);
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryServer;
    use mockall::predicate::*;

    #[test]
    fn identity_policy() {
        assert!(!decide_identity(&IdentityToken::Anonymous).is_admin);
        assert!(decide_identity(&IdentityToken::user_name("admin", "x")).is_admin);
        assert!(!decide_identity(&IdentityToken::user_name("guest", "x")).is_admin);

        let cert = decide_identity(&IdentityToken::X509 {
            certificate: vec![0; 12],
        });
        assert!(cert.is_admin);
        assert_eq!(cert.certificate_size, Some(12));

        let issued = decide_identity(&IdentityToken::Issued {
            token_data: vec![1, 2, 3],
            encryption_algorithm: "RSA-OAEP".to_string(),
        });
        assert_eq!(issued.identity_type, IdentityType::Issued);
        assert_eq!(issued.issued_token_size, Some(3));
        assert_eq!(issued.issued_encryption_algorithm.as_deref(), Some("RSA-OAEP"));
    }

    #[test]
    fn access_level_bits() {
        let rw = AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE;
        assert!(rw.can_read() && rw.can_write());
        assert_eq!((rw & AccessLevel::CURRENT_READ).to_string(), "read-only");
        assert_eq!(AccessLevel::NONE.to_string(), "none");
        assert_eq!(rw.bits(), 0x03);
    }

    #[test]
    fn login_table() {
        let ac = DefaultAccessControl::new(false).with_login("admin", "admin");
        let id = SessionId::new();
        assert_eq!(
            ac.activate_session(&id, &IdentityToken::user_name("admin", "admin")),
            StatusCode::GOOD
        );
        assert_eq!(
            ac.activate_session(&id, &IdentityToken::user_name("admin", "wrong")),
            StatusCode::BAD_USER_ACCESS_DENIED
        );
        assert_eq!(
            ac.activate_session(&id, &IdentityToken::Anonymous),
            StatusCode::BAD_IDENTITY_TOKEN_INVALID
        );
        assert_eq!(
            ac.activate_session(&id, &IdentityToken::X509 { certificate: vec![] }),
            StatusCode::BAD_IDENTITY_TOKEN_REJECTED
        );
    }

    #[test]
    fn adapter_delegates_acceptance() {
        let runtime = InMemoryServer::new();
        let server = runtime.handle();
        let session = SessionId::new();

        let mut inner = MockAccessControl::new();
        inner
            .expect_activate_session()
            .with(eq(session.clone()), always())
            .times(1)
            .return_const(StatusCode::GOOD);
        inner.expect_close_session().times(1).return_const(());

        let ac = IdentityAccessControl::new(inner, &server);
        assert_eq!(
            ac.activate_session(&session, &IdentityToken::user_name("guest", "pw")),
            StatusCode::GOOD
        );
        assert!(!server.session(Some(&session)).is_admin());

        ac.close_session(&session);
        assert!(!server.sessions().contains(&session));
    }

    #[test]
    fn rejected_session_is_forgotten() {
        let runtime = InMemoryServer::new();
        let server = runtime.handle();
        let session = SessionId::new();

        let mut inner = MockAccessControl::new();
        inner
            .expect_activate_session()
            .times(1)
            .return_const(StatusCode::BAD_USER_ACCESS_DENIED);

        let ac = IdentityAccessControl::new(inner, &server);
        assert_eq!(
            ac.activate_session(&session, &IdentityToken::user_name("admin", "nope")),
            StatusCode::BAD_USER_ACCESS_DENIED
        );
        assert!(!server.sessions().contains(&session));
    }

    #[test]
    fn access_level_follows_admin_flag() {
        let runtime = InMemoryServer::new();
        let server = runtime.handle();
        let ac = IdentityAccessControl::new(DefaultAccessControl::new(true), &server);
        let node = crate::node::object_id::SERVER;

        let unknown = SessionId::new();
        assert_eq!(ac.user_access_level(&unknown, &node), AccessLevel::CURRENT_READ);

        let admin = SessionId::new();
        ac.decide_and_record_identity(&admin, &IdentityToken::X509 { certificate: vec![7] });
        assert!(ac.user_access_level(&admin, &node).can_write());

        // Missing nodes still get an answer
        assert_eq!(
            ac.user_access_level(&unknown, &NodeId::numeric(9, 9)),
            AccessLevel::CURRENT_READ
        );
    }
}
