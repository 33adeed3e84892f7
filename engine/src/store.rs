//! Store - the in-memory state container for the current profile.
//!
//! The Store registers itself with a [`Dispatcher`] and reduces the profile
//! actions into a [`StoreState`]. Its state is mutated only inside that
//! reduction; readers always get copies. After every transition the Store
//! notifies its own subscribers with the new state.

use crate::dispatcher::panic_message;
use crate::{Action, DispatchToken, Dispatcher, LocalCache, Profile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Default cache key for the warm-start copy of the profile.
pub const DEFAULT_CACHE_KEY: &str = "tandem.currentProfile";

/// Everything the store knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    /// `None` whenever no identity is signed in
    pub current_profile: Option<Profile>,
    pub is_loading: bool,
    /// Last local error (cache failures), or one set via `SET_ERROR`
    pub error: Option<String>,
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Key under which the profile is cached locally
    pub cache_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_key: DEFAULT_CACHE_KEY.to_string(),
        }
    }
}

/// A store subscriber.
pub type Subscriber = Arc<dyn Fn(&StoreState) + Send + Sync>;

/// Identifies one subscriber of a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Disposer for a store subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    store: Weak<Store>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}

/// The profile store.
pub struct Store {
    state: Mutex<StoreState>,
    subscribers: Mutex<Vec<(SubscriberId, Subscriber)>>,
    next_subscriber: AtomicU64,
    cache: Arc<dyn LocalCache>,
    config: StoreConfig,
    dispatcher: Dispatcher,
    token: Mutex<Option<DispatchToken>>,
}

impl Store {
    /// Create a store and register it with the dispatcher.
    ///
    /// The store stays registered until it is dropped or [`Store::detach`]
    /// is called.
    pub fn new(
        dispatcher: &Dispatcher,
        cache: Arc<dyn LocalCache>,
        config: StoreConfig,
    ) -> Arc<Self> {
        let store = Arc::new(Self {
            state: Mutex::new(StoreState::default()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            cache,
            config,
            dispatcher: dispatcher.clone(),
            token: Mutex::new(None),
        });

        let weak = Arc::downgrade(&store);
        let token = dispatcher.register(move |action| {
            if let Some(store) = weak.upgrade() {
                store.handle(action);
            }
        });
        *lock(&store.token) = Some(token);

        store
    }

    /// Copy of the full state.
    pub fn get_state(&self) -> StoreState {
        lock(&self.state).clone()
    }

    /// Copy of the current profile.
    pub fn current_profile(&self) -> Option<Profile> {
        lock(&self.state).current_profile.clone()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Subscribe to state changes. Subscribers run in subscription order.
    pub fn subscribe<F>(self: &Arc<Self>, subscriber: F) -> Subscription
    where
        F: Fn(&StoreState) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push((id, Arc::new(subscriber)));
        Subscription {
            id,
            store: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Stop listening to the dispatcher.
    pub fn detach(&self) {
        if let Some(token) = lock(&self.token).take() {
            self.dispatcher.unregister(token);
        }
    }

    fn handle(&self, action: &Action) {
        let next = {
            let mut state = lock(&self.state);
            if !self.reduce(&mut state, action) {
                return;
            }
            state.clone()
        };
        self.notify(&next);
    }

    /// Apply an action to the state. Returns false for actions this store
    /// does not own.
    fn reduce(&self, state: &mut StoreState, action: &Action) -> bool {
        match action {
            Action::LoadProfile => {
                match self.read_cached() {
                    Ok(cached) => {
                        state.current_profile = cached;
                        state.error = None;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to load cached profile");
                        state.error = Some(e.to_string());
                    }
                }
                state.is_loading = false;
            }
            Action::UpdateProfile(profile) | Action::SyncFromRemote(profile) => {
                state.current_profile = Some(profile.clone());
                state.error = None;
                state.last_sync_time = Some(Utc::now());
                if let Err(e) = self.write_cached(profile) {
                    tracing::warn!(error = %e, "Failed to cache profile");
                    state.error = Some(e.to_string());
                }
            }
            Action::ClearProfile => {
                *state = StoreState::default();
                if let Err(e) = self.cache.remove(&self.config.cache_key) {
                    tracing::warn!(error = %e, "Failed to purge cached profile");
                    state.error = Some(e.to_string());
                }
            }
            Action::SetLoading(flag) => state.is_loading = *flag,
            Action::SetError(error) => state.error = error.clone(),
            Action::SetSyncing(flag) => state.is_syncing = *flag,
            Action::Extension { .. } => return false,
        }
        true
    }

    fn read_cached(&self) -> crate::Result<Option<Profile>> {
        match self.cache.get(&self.config.cache_key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_cached(&self, profile: &Profile) -> crate::Result<()> {
        let raw = serde_json::to_string(profile)?;
        self.cache.set(&self.config.cache_key, &raw)
    }

    fn notify(&self, state: &StoreState) {
        let snapshot: Vec<(SubscriberId, Subscriber)> = lock(&self.subscribers).clone();
        for (id, subscriber) in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber(state)));
            if let Err(cause) = outcome {
                tracing::error!(
                    subscriber = id.0,
                    cause = %panic_message(cause.as_ref()),
                    "Store subscriber panicked"
                );
            }
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.get_state())
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Subscribers and listeners never run under these locks.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
