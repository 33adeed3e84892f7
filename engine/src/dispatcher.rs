//! Dispatcher - the synchronous action bus.
//!
//! Every state-changing intent enters the system through [`Dispatcher::dispatch`].
//! The dispatcher holds no domain state, only listener callbacks. It is cheap
//! to clone; clones share the same registry, so one instance constructed at
//! startup can be handed to every component that needs it.

use crate::Action;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A registered listener.
pub type Listener = Arc<dyn Fn(&Action) + Send + Sync>;

/// Handle returned by [`Dispatcher::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchToken(u64);

impl DispatchToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct Registry {
    next_token: AtomicU64,
    listeners: Mutex<Vec<(DispatchToken, Listener)>>,
}

/// Synchronous publish/subscribe bus for [`Action`]s.
///
/// Ordering rules:
/// 1. Listeners run in registration order, on the calling thread.
/// 2. A dispatch works on a snapshot of the registry taken when it starts;
///    registering or unregistering from inside a listener affects only later
///    dispatches.
/// 3. A listener that panics is logged and skipped; the remaining listeners
///    still receive the action.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns the token needed to unregister it.
    pub fn register<F>(&self, listener: F) -> DispatchToken
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        let token = DispatchToken(self.registry.next_token.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((token, Arc::new(listener)));
        tracing::trace!(token = token.0, "Dispatcher listener registered");
        token
    }

    /// Unregister a listener. Returns false if the token was unknown.
    pub fn unregister(&self, token: DispatchToken) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(t, _)| *t != token);
        let removed = listeners.len() != before;
        if removed {
            tracing::trace!(token = token.0, "Dispatcher listener unregistered");
        }
        removed
    }

    /// Deliver an action to every registered listener.
    pub fn dispatch(&self, action: Action) {
        // Snapshot so listeners can (un)register without deadlocking or
        // changing this delivery.
        let snapshot: Vec<(DispatchToken, Listener)> = self.listeners().clone();

        tracing::debug!(
            action = action.kind(),
            listeners = snapshot.len(),
            "Dispatching action"
        );

        for (token, listener) in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(&action)));
            if let Err(cause) = outcome {
                tracing::error!(
                    token = token.0,
                    action = action.kind(),
                    cause = %panic_message(cause.as_ref()),
                    "Dispatcher listener panicked"
                );
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(DispatchToken, Listener)>> {
        // Listeners never run under this lock, so a poisoned guard still
        // holds a consistent list.
        self.registry
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
