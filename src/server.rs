// src/server.rs - Handle to one server instance
use crate::{
    node::SessionId,
    registry::TransitionRegistry,
    runtime::ServerRuntime,
    session::{Session, SessionAttributeStore},
};
use std::fmt;
use std::sync::Arc;

struct ServerContext {
    runtime: Arc<dyn ServerRuntime>,
    registry: TransitionRegistry,
    sessions: SessionAttributeStore,
}

/// Shared handle to a server runtime and its per-instance condition state
///
/// Every condition holds one of these. The transition registry and the
/// session attribute store are shared tables: every handle built from the
/// same parts sees the same callbacks, and two server instances never see
/// each other's. Runtimes that own their tables (see
/// [`InMemoryServer::handle`](crate::InMemoryServer::handle)) keep them alive
/// for as long as the runtime itself, independent of any handle.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<ServerContext>,
}

impl ServerHandle {
    /// Handle with fresh tables; clone it rather than calling this twice for one runtime
    pub fn new(runtime: Arc<dyn ServerRuntime>) -> Self {
        Self::from_parts(runtime, TransitionRegistry::new(), SessionAttributeStore::new())
    }

    /// Build a handle around tables owned elsewhere
    pub fn from_parts(
        runtime: Arc<dyn ServerRuntime>,
        registry: TransitionRegistry,
        sessions: SessionAttributeStore,
    ) -> Self {
        Self {
            inner: Arc::new(ServerContext {
                runtime,
                registry,
                sessions,
            }),
        }
    }

    pub fn runtime(&self) -> &dyn ServerRuntime {
        self.inner.runtime.as_ref()
    }

    pub(crate) fn runtime_arc(&self) -> &Arc<dyn ServerRuntime> {
        &self.inner.runtime
    }

    pub fn registry(&self) -> &TransitionRegistry {
        &self.inner.registry
    }

    pub fn sessions(&self) -> &SessionAttributeStore {
        &self.inner.sessions
    }

    /// Session handle for `id`, or the anonymous placeholder when there is none
    pub fn session(&self, id: Option<&SessionId>) -> Session {
        self.inner.sessions.session(id)
    }
}

/// Same runtime instance, whichever handle it was reached through
impl PartialEq for ServerHandle {
    fn eq(&self, other: &Self) -> bool {
        let this = Arc::as_ptr(&self.inner.runtime) as *const ();
        let that = Arc::as_ptr(&other.inner.runtime) as *const ();
        std::ptr::eq(this, that)
    }
}

impl Eq for ServerHandle {}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("runtime", &(Arc::as_ptr(&self.inner.runtime) as *const ()))
            .field("conditions_with_callbacks", &self.inner.registry.len())
            .field("sessions", &self.inner.sessions.len())
            .finish()
    }
}
