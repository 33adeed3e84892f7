//! # Tandem Engine
//!
//! The synchronous half of Tandem: a dispatcher and a profile store.
//!
//! This crate holds the in-memory state that UI code reads and the single
//! path through which it changes. It has no async code and no knowledge of
//! the network; the `tandem-sync` crate bridges it to a remote document.
//!
//! ## Design Principles
//!
//! - **Single writer**: state changes only inside the store's reduction of a
//!   dispatched [`Action`]
//! - **Copies out**: readers and subscribers receive copies of the state
//! - **Failure is state**: cache errors land in [`StoreState::error`], public
//!   methods never fail
//! - **Injected, not global**: the [`Dispatcher`] is constructed once and
//!   passed to whoever needs it
//!
//! ## Core Concepts
//!
//! ### Actions
//!
//! Changes are expressed as a closed set of actions:
//! - [`Action::LoadProfile`] - warm-start from the local cache
//! - [`Action::UpdateProfile`] - a local edit
//! - [`Action::SyncFromRemote`] - an edit that arrived from the remote
//! - [`Action::ClearProfile`] - sign-out
//! - [`Action::SetLoading`], [`Action::SetError`], [`Action::SetSyncing`] - flags
//!
//! ### Dispatcher
//!
//! [`Dispatcher`] delivers each action to every registered listener in
//! registration order. A panicking listener is logged and skipped.
//!
//! ### Store
//!
//! [`Store`] reduces actions into a [`StoreState`] and notifies its
//! subscribers. Subscriptions are RAII handles.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tandem_engine::{Action, Dispatcher, MemoryCache, Profile, Role, Store, StoreConfig};
//!
//! let dispatcher = Dispatcher::new();
//! let store = Store::new(&dispatcher, Arc::new(MemoryCache::new()), StoreConfig::default());
//!
//! let _subscription = store.subscribe(|state| {
//!     println!("profile is now {:?}", state.current_profile);
//! });
//!
//! let profile = Profile::new("taqueria", "La Taqueria", Role::Restaurant);
//! dispatcher.dispatch(Action::UpdateProfile(profile.clone()));
//!
//! assert_eq!(store.current_profile(), Some(profile));
//! ```

pub mod action;
pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod profile;
pub mod store;

// Re-export main types at crate root
pub use action::{Action, WireAction};
pub use cache::{LocalCache, MemoryCache};
pub use dispatcher::{DispatchToken, Dispatcher, Listener};
pub use error::{Error, Result};
pub use profile::{Identity, Profile, Role};
pub use store::{
    Store, StoreConfig, StoreState, Subscriber, SubscriberId, Subscription, DEFAULT_CACHE_KEY,
};

/// Opaque id of an authenticated identity.
pub type IdentityId = String;
