// src/registry.rs - Two-state transition callback registry and dispatch
//
// Purpose:
// --------
// Single interception point between the runtime's pre-commit hooks and user
// transition callbacks. The registry maps a condition id to one optional
// callback slot per transition kind; the dispatcher is the only thing the
// runtime ever calls.
//
// Interactions:
// -------------
// - Uses: runtime.rs (hook installation, display names), session.rs (session handles)
// - Used by: condition.rs (fluent registration), memory.rs (through the installed hooks)
//
// Key Responsibilities:
// ---------------------
// 1. Lazy per-condition records with replace-on-register slots
// 2. Hook installation bound to a kind-tagged dispatcher
// 3. Fixed instrumentation line on every dispatch
// 4. Panic isolation: callback faults become BadInternalError

use crate::{
    error::{AcError, Result},
    node::{NodeId, SessionId, StatusCode},
    runtime::{ServerRuntime, TransitionInterceptor, TransitionKind, TwoStateHook},
    server::ServerHandle,
    session::{Session, SessionAttributeStore},
};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// User function invoked before a two-state transition commits
///
/// Receives the session (anonymous for server-driven changes), the source
/// node the slot was registered with and its remove-branch flag. A non-good
/// return vetoes the transition.
pub type TransitionCallback = Arc<dyn Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync>;

/// Wrap a closure as a [`TransitionCallback`]
pub fn transition_callback<F>(f: F) -> TransitionCallback
where
    F: Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One registered callback
#[derive(Clone)]
pub struct CallbackSlot {
    pub source: NodeId,
    pub remove_branch: bool,
    pub callback: TransitionCallback,
}

impl fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("source", &self.source)
            .field("remove_branch", &self.remove_branch)
            .finish_non_exhaustive()
    }
}

/// Up to four slots, indexed by [`TransitionKind::index`]
#[derive(Debug, Clone, Default)]
pub struct ConditionCallbacks {
    slots: [Option<CallbackSlot>; 4],
}

impl ConditionCallbacks {
    pub fn get(&self, kind: TransitionKind) -> Option<&CallbackSlot> {
        self.slots[kind.index()].as_ref()
    }

    /// Store a slot and hand back the one it replaced
    pub fn set(&mut self, kind: TransitionKind, slot: CallbackSlot) -> Option<CallbackSlot> {
        self.slots[kind.index()].replace(slot)
    }

    pub fn registered_kinds(&self) -> Vec<TransitionKind> {
        TransitionKind::ALL
            .into_iter()
            .filter(|kind| self.slots[kind.index()].is_some())
            .collect()
    }
}

/// Per-server-instance table of transition callbacks
///
/// Clones share one table. The lock only covers lookup-and-copy and insert;
/// callbacks always run outside it so they may re-enter the condition API.
#[derive(Clone, Default)]
pub struct TransitionRegistry {
    conditions: Arc<Mutex<HashMap<NodeId, ConditionCallbacks>>>,
}

impl TransitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, condition: &NodeId, kind: TransitionKind, slot: CallbackSlot) -> Option<CallbackSlot> {
        self.conditions
            .lock()
            .entry(condition.clone())
            .or_default()
            .set(kind, slot)
    }

    pub fn slot(&self, condition: &NodeId, kind: TransitionKind) -> Option<CallbackSlot> {
        self.conditions
            .lock()
            .get(condition)
            .and_then(|callbacks| callbacks.get(kind).cloned())
    }

    pub fn callbacks(&self, condition: &NodeId) -> Option<ConditionCallbacks> {
        self.conditions.lock().get(condition).cloned()
    }

    /// Erase a condition's record; called when its node is deleted
    pub fn remove(&self, condition: &NodeId) -> bool {
        // Callbacks may own conditions; drop them after the lock is released
        let removed = self.conditions.lock().remove(condition);
        removed.is_some()
    }

    pub fn contains(&self, condition: &NodeId) -> bool {
        self.conditions.lock().contains_key(condition)
    }

    pub fn len(&self) -> usize {
        self.conditions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.lock().is_empty()
    }
}

// ============================================================================
// REGISTRATION
// ============================================================================

/// Store the callback for `(condition, kind)` and install the runtime hook
///
/// Re-registering a kind replaces both the stored callback and the hook.
///
/// The registry keeps the callback alive until the condition's node is
/// deleted. A callback that captures an owning [`Condition`](crate::Condition)
/// or [`OnOffCondition`](crate::OnOffCondition) therefore keeps that node
/// alive forever: capture a `Weak` pointer instead and upgrade it inside the
/// callback, as the demo binary does for its `AlarmActive` write handler.
pub fn register_transition(
    server: &ServerHandle,
    condition: &NodeId,
    kind: TransitionKind,
    source: &NodeId,
    remove_branch: bool,
    callback: TransitionCallback,
) -> Result<()> {
    let replaced = server.registry().store(
        condition,
        kind,
        CallbackSlot {
            source: source.clone(),
            remove_branch,
            callback,
        },
    );
    if replaced.is_some() {
        debug!("Replacing {} callback of condition {}", kind, condition);
    }

    let hook = TwoStateHook {
        condition: condition.clone(),
        source: source.clone(),
        remove_branch,
        kind,
        interceptor: Arc::new(TransitionDispatcher::new(server)),
    };
    server
        .runtime()
        .install_two_state_hook(hook)
        .map_err(|status| AcError::HookInstallFailed {
            kind: kind.to_string(),
            status,
        })
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Interceptor installed into the runtime for every registered kind
///
/// Holds the instance's tables directly and only a weak pointer to the
/// runtime, which owns the hook.
pub struct TransitionDispatcher {
    runtime: Weak<dyn ServerRuntime>,
    registry: TransitionRegistry,
    sessions: SessionAttributeStore,
}

impl TransitionDispatcher {
    pub fn new(server: &ServerHandle) -> Self {
        Self {
            runtime: Arc::downgrade(server.runtime_arc()),
            registry: server.registry().clone(),
            sessions: server.sessions().clone(),
        }
    }
}

impl TransitionInterceptor for TransitionDispatcher {
    fn before_transition(
        &self,
        kind: TransitionKind,
        condition: &NodeId,
        session: Option<&SessionId>,
    ) -> StatusCode {
        let runtime = self.runtime.upgrade();
        dispatch_in(
            runtime.as_deref(),
            &self.registry,
            &self.sessions,
            kind,
            condition,
            session,
        )
    }
}

/// Route one pre-commit call to the registered callback, if any
///
/// Missing records and empty slots resolve to `Good`. The returned status of
/// a callback is passed through untouched.
pub fn dispatch(
    server: &ServerHandle,
    kind: TransitionKind,
    condition: &NodeId,
    session_id: Option<&SessionId>,
) -> StatusCode {
    dispatch_in(
        Some(server.runtime()),
        server.registry(),
        server.sessions(),
        kind,
        condition,
        session_id,
    )
}

fn dispatch_in(
    runtime: Option<&dyn ServerRuntime>,
    registry: &TransitionRegistry,
    sessions: &SessionAttributeStore,
    kind: TransitionKind,
    condition: &NodeId,
    session_id: Option<&SessionId>,
) -> StatusCode {
    let session = sessions.session(session_id);

    let display_name = runtime
        .and_then(|runtime| runtime.read_display_name(condition).ok())
        .map(|name| name.text)
        .unwrap_or_else(|| condition.to_string());
    info!("[A&C] {}=true | condition={}", kind, display_name);

    let Some(slot) = registry.slot(condition, kind) else {
        return StatusCode::GOOD;
    };

    let status = invoke_guarded(&slot, &session);
    if !status.is_good() {
        debug!("{} of {} rejected by callback: {}", kind, display_name, status);
    }
    status
}

fn invoke_guarded(slot: &CallbackSlot, session: &Session) -> StatusCode {
    let call = AssertUnwindSafe(|| (slot.callback)(session, &slot.source, slot.remove_branch));
    match panic::catch_unwind(call) {
        Ok(status) => status,
        Err(payload) => {
            let fault = AcError::CallbackFault(panic_message(payload.as_ref()));
            error!("{}", fault);
            StatusCode::BAD_INTERNAL_ERROR
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
