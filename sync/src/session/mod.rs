//! Sync session: binds a [`Store`] to the signed-in identity's remote document.
//!
//! [`SyncService::spawn`] starts the controller task and wires its inputs:
//! identity transitions from an [`IdentityProvider`], change notifications
//! from the store, and the remote document stream for the attached identity.
//!
//! Loop prevention rests on one private value, the last synced snapshot:
//! the profile last confirmed identical on both sides. Outbound writes are
//! skipped when the store already equals it; inbound changes that equal it
//! are discarded as echoes; inbound changes that are applied update it
//! before the store sees them.

mod controller;
mod inbound;
mod outbound;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_engine::{Dispatcher, Identity, IdentityId, Store, Subscription};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::identity::{IdentityFeed, IdentityProvider};
use crate::remote::DocumentChannel;
use crate::{SyncConfig, SyncError};
use controller::{Command, Controller};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No identity, no remote listener.
    #[default]
    Detached,
    /// Subscribed, waiting for the first remote callback.
    Attaching,
    /// Remote listener live; reads and writes flow.
    Attached,
}

/// Observable sync status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub is_connected: bool,
    pub is_authenticated: bool,
    /// A remote write is in flight
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last remote failure (write, read or channel)
    pub error: Option<String>,
    pub identity_id: Option<IdentityId>,
    pub phase: SessionPhase,
}

/// Handle to a running sync session.
///
/// Dropping the handle stops the controller without touching the store;
/// call [`SyncService::shutdown`] to wait for it.
pub struct SyncService {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SyncState>,
    controller: Option<JoinHandle<()>>,
    identity_forwarder: Option<JoinHandle<()>>,
    _store_subscription: Subscription,
}

impl SyncService {
    /// Start syncing `store` for whoever `identity` reports as signed in.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: SyncConfig,
        dispatcher: Dispatcher,
        store: Arc<Store>,
        channel: Arc<dyn DocumentChannel>,
        identity: &dyn IdentityProvider,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SyncState::default());

        let store_events = commands.clone();
        let store_subscription = store.subscribe(move |_| {
            let _ = store_events.send(Command::StoreChanged);
        });

        let controller = Controller::new(
            &config,
            dispatcher,
            store,
            channel,
            commands.clone(),
            state_tx,
        );
        let controller = tokio::spawn(controller.run(receiver));

        let IdentityFeed {
            current,
            mut transitions,
        } = identity.subscribe();
        let identity_events = commands.clone();
        let identity_forwarder = tokio::spawn(async move {
            if current.is_some() && identity_events.send(Command::Identity(current)).is_err() {
                return;
            }
            loop {
                let next = match transitions.recv().await {
                    Ok(next) => next,
                    Err(RecvError::Lagged(skipped)) => {
                        // Intermediate transitions are gone; detach, then
                        // catch up from the retained ones.
                        tracing::warn!(skipped, "Identity transitions dropped, detaching");
                        None
                    }
                    Err(RecvError::Closed) => return,
                };
                if identity_events.send(Command::Identity(next)).is_err() {
                    return;
                }
            }
        });

        tracing::info!(
            debounce_ms = config.debounce.as_millis() as u64,
            write_pause_ms = config.write_pause.as_millis() as u64,
            "Sync service started"
        );

        Self {
            commands,
            state,
            controller: Some(controller),
            identity_forwarder: Some(identity_forwarder),
            _store_subscription: store_subscription,
        }
    }

    /// Current sync status.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Report an identity transition directly, bypassing the provider.
    pub fn identity_changed(&self, identity: Option<Identity>) -> Result<(), SyncError> {
        self.send(Command::Identity(identity))
    }

    /// Write the current profile now, skipping the debounce window.
    pub fn force_sync(&self) -> Result<(), SyncError> {
        self.send(Command::ForceSync)
    }

    /// Read the remote document once and reconcile it.
    pub fn refresh(&self) -> Result<(), SyncError> {
        self.send(Command::Refresh)
    }

    /// Re-open the remote subscription, e.g. after a channel error.
    pub fn resubscribe(&self) -> Result<(), SyncError> {
        self.send(Command::Resubscribe)
    }

    /// Stop the session: unsubscribe from the remote, cancel the timer and
    /// drop queued writes, then wait for the controller to exit.
    pub async fn shutdown(mut self) -> Result<(), SyncError> {
        if let Some(forwarder) = self.identity_forwarder.take() {
            forwarder.abort();
        }
        let _ = self.commands.send(Command::Shutdown);
        if let Some(controller) = self.controller.take() {
            controller.await.map_err(|_| SyncError::ServiceStopped)?;
        }
        tracing::info!("Sync service stopped");
        Ok(())
    }

    fn send(&self, command: Command) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::ServiceStopped)
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(forwarder) = self.identity_forwarder.take() {
            forwarder.abort();
        }
        if self.controller.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("state", &*self.state.borrow())
            .finish()
    }
}
