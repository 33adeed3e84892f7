//! # Tandem Sync
//!
//! Keeps a [`tandem_engine::Store`] and a remote per-identity document in
//! step, in both directions.
//!
//! - Local edits are debounced and written through a serial queue.
//! - Remote changes are converted into profiles and applied through the
//!   dispatcher, unless they are echoes of our own writes.
//! - Sign-in attaches the session to the identity's document (creating it
//!   if missing); sign-out detaches and clears local state.
//!
//! Remote failures never escape as errors; they show up in [`SyncState`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_engine::{Action, Dispatcher, Identity, MemoryCache, Store};
//! use tandem_sync::{IdentityHandle, MemoryDocumentStore, SyncConfig, SyncService};
//!
//! # async fn demo() -> Result<(), tandem_sync::SyncError> {
//! let config = SyncConfig::default();
//! let dispatcher = Dispatcher::new();
//! let store = Store::new(&dispatcher, Arc::new(MemoryCache::new()), config.store_config());
//! let identity = IdentityHandle::new();
//! let remote = Arc::new(MemoryDocumentStore::new());
//!
//! let service = SyncService::spawn(config, dispatcher.clone(), store.clone(), remote, &identity);
//! dispatcher.dispatch(Action::LoadProfile);
//! identity.sign_in(Identity::new("u1"));
//! // ... edits dispatched as Action::UpdateProfile are written after the debounce window
//! service.shutdown().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod remote;
pub mod session;

pub use config::{ConfigError, SyncConfig};
pub use error::{RemoteError, Result, SyncError};
pub use identity::{IdentityFeed, IdentityHandle, IdentityProvider};
pub use remote::{DocumentChannel, DocumentEvent, DocumentStream, MemoryDocumentStore, WriteRecord};
pub use session::{SessionPhase, SyncService, SyncState};
