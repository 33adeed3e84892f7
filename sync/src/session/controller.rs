//! Sync session controller.
//!
//! A single task owns every piece of coordination state: the session phase,
//! the last synced snapshot, the debounce timer and the write queue. All
//! inputs arrive as [`Command`]s on one channel, so the snapshot has exactly
//! one writer and every decision sees a consistent view.
//!
//! Each attach bumps the session epoch. Anything produced for an older
//! epoch (remote events, write completions, reads) is discarded on arrival.

use std::future::pending;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tandem_engine::{Action, Dispatcher, Identity, Profile, Store};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::inbound::{self, Verdict};
use super::outbound::{self, Outbound, WriteKind, WriteOp};
use super::{SessionPhase, SyncState};
use crate::remote::{DocumentChannel, DocumentEvent};
use crate::{RemoteError, SyncConfig};

/// Inputs to the controller task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Identity present (`Some`) or absent (`None`).
    Identity(Option<Identity>),
    /// The store notified a state change.
    StoreChanged,
    Remote {
        epoch: u64,
        event: DocumentEvent,
    },
    WriteFinished {
        op: WriteOp,
        result: Result<(), RemoteError>,
    },
    Pulled {
        epoch: u64,
        result: Result<Option<Profile>, RemoteError>,
    },
    ForceSync,
    Refresh,
    Resubscribe,
    Shutdown,
}

pub(crate) struct Controller {
    dispatcher: Dispatcher,
    store: Arc<Store>,
    channel: Arc<dyn DocumentChannel>,
    commands: mpsc::UnboundedSender<Command>,
    state_tx: watch::Sender<SyncState>,
    sync: SyncState,
    identity: Option<Identity>,
    epoch: u64,
    last_synced: Option<Profile>,
    /// Value of the last write that failed since the snapshot last moved;
    /// not rescheduled on its own
    last_failed: Option<Profile>,
    seeded: bool,
    listener: Option<JoinHandle<()>>,
    outbound: Outbound,
}

impl Controller {
    pub(crate) fn new(
        config: &SyncConfig,
        dispatcher: Dispatcher,
        store: Arc<Store>,
        channel: Arc<dyn DocumentChannel>,
        commands: mpsc::UnboundedSender<Command>,
        state_tx: watch::Sender<SyncState>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            channel,
            commands,
            state_tx,
            sync: SyncState::default(),
            identity: None,
            epoch: 0,
            last_synced: None,
            last_failed: None,
            seeded: false,
            listener: None,
            outbound: Outbound::new(config.debounce, config.write_pause),
        }
    }

    /// Run until shutdown.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Sync controller started");

        loop {
            let debounce_at = self.outbound.deadline();
            let ready_at = self.outbound.ready_at(Instant::now());

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = sleep_until_some(debounce_at), if debounce_at.is_some() => {
                    self.debounce_elapsed();
                }
                _ = sleep_until_some(ready_at), if ready_at.is_some() => {
                    self.start_next_write();
                }
            }
        }

        self.teardown();
        self.sync.phase = SessionPhase::Detached;
        self.sync.is_connected = false;
        self.publish();
        tracing::debug!("Sync controller stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Identity(Some(identity)) => self.identity_present(identity),
            Command::Identity(None) => self.identity_absent(),
            Command::StoreChanged => self.store_changed(),
            Command::Remote { epoch, event } => {
                if epoch != self.epoch {
                    tracing::trace!(epoch, current = self.epoch, "Dropping stale remote event");
                    return;
                }
                self.remote_event(event);
            }
            Command::WriteFinished { op, result } => self.write_finished(op, result),
            Command::Pulled { epoch, result } => {
                if epoch != self.epoch {
                    return;
                }
                self.pulled(result);
            }
            Command::ForceSync => self.force_sync(),
            Command::Refresh => self.refresh(),
            Command::Resubscribe => self.resubscribe(),
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    fn identity_present(&mut self, identity: Identity) {
        let same = self.identity.as_ref().map(|current| &current.id) == Some(&identity.id);
        if same {
            match self.sync.phase {
                SessionPhase::Attaching => return,
                SessionPhase::Attached if self.sync.is_connected => {
                    tracing::debug!(identity = %identity.id, "Identity unchanged, staying attached");
                    self.identity = Some(identity);
                    return;
                }
                SessionPhase::Attached => {
                    tracing::info!(identity = %identity.id, "Identity present again, reconnecting");
                    self.attach(identity, true);
                    return;
                }
                SessionPhase::Detached => {}
            }
        } else if self.identity.is_some() {
            // Switching accounts without a sign-out: never seed the new
            // document from the previous account's profile.
            self.dispatcher.dispatch(Action::ClearProfile);
        }
        self.attach(identity, false);
    }

    fn identity_absent(&mut self) {
        if self.sync.phase == SessionPhase::Detached && self.identity.is_none() {
            tracing::trace!("Identity absent while detached, nothing to do");
            return;
        }

        let dropped = self.teardown();
        tracing::info!(
            identity = ?self.identity.as_ref().map(|i| &i.id),
            dropped_writes = dropped,
            "Detaching sync session"
        );

        self.identity = None;
        self.epoch += 1;
        self.last_synced = None;
        self.last_failed = None;
        self.seeded = false;
        self.sync = SyncState::default();
        self.publish();

        self.dispatcher.dispatch(Action::ClearProfile);
    }

    /// Subscribe to the identity's document under a fresh epoch.
    ///
    /// `keep_snapshot` is set when re-attaching the same identity, so local
    /// edits that were not written yet are compared against what the remote
    /// last confirmed rather than overwritten by it.
    fn attach(&mut self, identity: Identity, keep_snapshot: bool) {
        let dropped = self.teardown();
        self.epoch += 1;
        self.last_failed = None;
        if !keep_snapshot {
            self.last_synced = None;
            self.seeded = false;
        }

        tracing::info!(
            identity = %identity.id,
            epoch = self.epoch,
            dropped_writes = dropped,
            "Attaching sync session"
        );

        let mut stream = self.channel.subscribe(&identity.id);
        let commands = self.commands.clone();
        let epoch = self.epoch;
        self.listener = Some(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if commands.send(Command::Remote { epoch, event }).is_err() {
                    return;
                }
            }
            let _ = commands.send(Command::Remote {
                epoch,
                event: DocumentEvent::Failed(RemoteError::ChannelClosed),
            });
        }));

        self.sync = SyncState {
            is_authenticated: true,
            identity_id: Some(identity.id.clone()),
            phase: SessionPhase::Attaching,
            is_syncing: self.outbound.is_syncing(),
            ..SyncState::default()
        };
        self.identity = Some(identity);
        self.publish();
    }

    fn resubscribe(&mut self) {
        match self.identity.clone() {
            Some(identity) => self.attach(identity, true),
            None => tracing::warn!("Resubscribe requested with no identity"),
        }
    }

    /// Stop the remote listener, disarm the timer and drop queued writes.
    fn teardown(&mut self) -> usize {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.outbound.cancel()
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn remote_event(&mut self, event: DocumentEvent) {
        match event {
            DocumentEvent::Changed(document) => {
                if self.sync.phase == SessionPhase::Attaching {
                    self.sync.phase = SessionPhase::Attached;
                    tracing::info!(
                        identity = ?self.sync.identity_id,
                        epoch = self.epoch,
                        "Sync session attached"
                    );
                }
                self.sync.is_connected = true;
                self.publish();

                match document {
                    None => self.seed(),
                    Some(document) => match Profile::from_document(&document) {
                        Ok(profile) => self.reconcile(profile),
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring malformed remote document");
                            self.sync.error = Some(RemoteError::from(e).to_string());
                            self.publish();
                        }
                    },
                }
                self.store_changed();
            }
            DocumentEvent::Failed(error) => {
                tracing::warn!(
                    identity = ?self.sync.identity_id,
                    error = %error,
                    "Remote document channel failed"
                );
                self.sync.is_connected = false;
                self.sync.error = Some(error.to_string());
                self.publish();
            }
        }
    }

    fn reconcile(&mut self, incoming: Profile) {
        let local = self.store.current_profile();
        let verdict = inbound::reconcile(
            &incoming,
            self.last_synced.as_ref(),
            self.outbound.in_flight().map(|op| &op.profile),
            local.as_ref(),
        );

        match verdict {
            Verdict::Echo => {
                tracing::debug!("Discarding echo of our own write");
            }
            Verdict::Adopt => {
                tracing::debug!("Remote matches local state, adopting as snapshot");
                self.set_snapshot(incoming);
            }
            Verdict::Apply => {
                tracing::info!(
                    identity = ?self.sync.identity_id,
                    "Applying remote profile change"
                );
                // Snapshot first, so the store notification this dispatch
                // causes is recognised as already synced.
                self.set_snapshot(incoming.clone());
                self.dispatcher.dispatch(Action::SyncFromRemote(incoming));
            }
        }
    }

    /// Create the remote document from whatever profile is loaded.
    fn seed(&mut self) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        if self.seeded {
            tracing::debug!(identity = %identity.id, "Document missing again, already seeded");
            return;
        }
        self.seeded = true;

        let local = self.store.current_profile();
        let profile = local.clone().unwrap_or_else(|| Profile::seed_for(&identity));
        tracing::info!(
            identity = %identity.id,
            from_local = local.is_some(),
            "Remote document missing, seeding"
        );

        self.set_snapshot(profile.clone());
        if local.as_ref() != Some(&profile) {
            self.dispatcher
                .dispatch(Action::SyncFromRemote(profile.clone()));
        }
        self.outbound.enqueue(WriteOp::new(
            self.epoch,
            identity.id,
            profile,
            WriteKind::Seed,
        ));
    }

    fn refresh(&mut self) {
        let Some(identity) = self.attached_identity() else {
            tracing::warn!("Refresh requested while detached");
            return;
        };

        let channel = self.channel.clone();
        let commands = self.commands.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = channel.read(&identity).await;
            let _ = commands.send(Command::Pulled { epoch, result });
        });
    }

    fn pulled(&mut self, result: Result<Option<Profile>, RemoteError>) {
        match result {
            Ok(Some(profile)) => self.reconcile(profile),
            Ok(None) => self.seed(),
            Err(e) => {
                tracing::warn!(error = %e, "Remote read failed");
                self.sync.error = Some(e.to_string());
                self.publish();
            }
        }
        self.store_changed();
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn store_changed(&mut self) {
        if self.sync.phase != SessionPhase::Attached {
            return;
        }
        let candidate = self.store.current_profile();
        if outbound::needs_write(
            candidate.as_ref(),
            self.last_synced.as_ref(),
            self.last_failed.as_ref(),
            self.outbound.is_syncing(),
        ) {
            tracing::trace!("Local change, restarting debounce");
            self.outbound.schedule(Instant::now());
        }
    }

    fn debounce_elapsed(&mut self) {
        self.outbound.take_deadline();
        if self.sync.phase != SessionPhase::Attached {
            return;
        }
        let Some(identity) = self.attached_identity() else {
            return;
        };

        // Latest value at fire time, not the one that armed the timer.
        let Some(profile) = self.store.current_profile() else {
            return;
        };
        if Some(&profile) == self.last_synced.as_ref() {
            tracing::debug!("Debounce elapsed with nothing new to write");
            return;
        }

        self.outbound
            .enqueue(WriteOp::new(self.epoch, identity, profile, WriteKind::Edit));
    }

    fn force_sync(&mut self) {
        let Some(identity) = self.attached_identity() else {
            tracing::warn!("Force sync requested while detached");
            return;
        };
        let Some(profile) = self.store.current_profile() else {
            tracing::warn!("Force sync requested with no profile loaded");
            return;
        };

        self.outbound.take_deadline();
        self.outbound
            .enqueue(WriteOp::new(self.epoch, identity, profile, WriteKind::Forced));
    }

    fn start_next_write(&mut self) {
        let Some(op) = self.outbound.start_next(Instant::now()) else {
            return;
        };

        tracing::info!(
            op_id = %op.id,
            identity = %op.identity,
            kind = op.kind.as_str(),
            "Writing profile to remote"
        );

        self.sync.is_syncing = true;
        self.publish();
        self.dispatcher.dispatch(Action::SetSyncing(true));

        let channel = self.channel.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = channel.write(&op.identity, &op.profile).await;
            let _ = commands.send(Command::WriteFinished { op, result });
        });
    }

    fn write_finished(&mut self, op: WriteOp, result: Result<(), RemoteError>) {
        self.outbound.finish(op.id, Instant::now());
        self.sync.is_syncing = false;

        if op.epoch != self.epoch {
            tracing::debug!(
                op_id = %op.id,
                epoch = op.epoch,
                current = self.epoch,
                "Discarding result of write from a previous session"
            );
        } else {
            match result {
                Ok(()) => {
                    tracing::debug!(op_id = %op.id, "Remote write succeeded");
                    self.set_snapshot(op.profile);
                    self.sync.last_sync_time = Some(Utc::now());
                    self.sync.error = None;
                }
                Err(e) => {
                    tracing::warn!(op_id = %op.id, error = %e, "Remote write failed");
                    self.sync.error = Some(e.to_string());
                    self.last_failed = Some(op.profile);
                }
            }
        }
        self.publish();

        if self.outbound.is_idle() {
            self.dispatcher.dispatch(Action::SetSyncing(false));
        }
        // Edits made while the write was in flight were not scheduled.
        self.store_changed();
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// A new snapshot means the remote moved on, so an earlier failed value
    /// is no longer known to be unwritable.
    fn set_snapshot(&mut self, profile: Profile) {
        self.last_synced = Some(profile);
        self.last_failed = None;
    }

    fn attached_identity(&self) -> Option<String> {
        if self.sync.phase == SessionPhase::Detached {
            return None;
        }
        self.identity.as_ref().map(|identity| identity.id.clone())
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.sync.clone());
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
