//! Identity collaborator.
//!
//! The sync layer only needs to know who is signed in and when that changes.
//! Authentication itself happens elsewhere.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tandem_engine::{Identity, IdentityId};
use tokio::sync::broadcast;

/// Transitions buffered per subscriber before it starts lagging.
pub const TRANSITION_CAPACITY: usize = 64;

/// The identity at subscription time plus every transition after it.
#[derive(Debug)]
pub struct IdentityFeed {
    pub current: Option<Identity>,
    /// `Some` for identity present, `None` for identity absent. Every
    /// transition is delivered, including a sign-out immediately followed
    /// by a sign-in of the same identity.
    pub transitions: broadcast::Receiver<Option<Identity>>,
}

/// Source of "identity present / absent" transitions.
pub trait IdentityProvider: Send + Sync {
    /// The identity signed in right now, if any.
    fn current_identity(&self) -> Option<Identity>;

    /// Current identity and later transitions, with nothing lost between
    /// the two.
    fn subscribe(&self) -> IdentityFeed;

    fn current_identity_id(&self) -> Option<IdentityId> {
        self.current_identity().map(|identity| identity.id)
    }
}

#[derive(Debug)]
struct Shared {
    current: Mutex<Option<Identity>>,
    transitions: broadcast::Sender<Option<Identity>>,
}

/// Identity provider driven by explicit sign-in / sign-out calls.
///
/// Used by tests and the demo binary, and as the adapter point for a real
/// authentication SDK: forward its callbacks into [`IdentityHandle::sign_in`]
/// and [`IdentityHandle::sign_out`].
#[derive(Debug, Clone)]
pub struct IdentityHandle {
    shared: Arc<Shared>,
}

impl IdentityHandle {
    /// Start signed out.
    pub fn new() -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                current: Mutex::new(None),
                transitions,
            }),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::info!(identity = %identity.id, "Identity present");
        self.transition(Some(identity));
    }

    pub fn sign_out(&self) {
        tracing::info!("Identity absent");
        self.transition(None);
    }

    fn transition(&self, next: Option<Identity>) {
        // Published under the lock so `subscribe` never misses or repeats one.
        let mut current = self.current();
        *current = next.clone();
        // No subscribers yet is fine.
        let _ = self.shared.transitions.send(next);
    }

    fn current(&self) -> MutexGuard<'_, Option<Identity>> {
        self.shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for IdentityHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for IdentityHandle {
    fn current_identity(&self) -> Option<Identity> {
        self.current().clone()
    }

    fn subscribe(&self) -> IdentityFeed {
        let current = self.current();
        IdentityFeed {
            current: current.clone(),
            transitions: self.shared.transitions.subscribe(),
        }
    }
}
