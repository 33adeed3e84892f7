//! In-memory document channel.
//!
//! Behaves like a real-time document database: subscribers get the current
//! document immediately and every later change, writes echo back to every
//! subscriber of that identity (including the writer). Failures and delays
//! can be injected for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::Value;
use tandem_engine::{IdentityId, Profile};
use tokio::sync::mpsc;

use super::{DocumentChannel, DocumentEvent, DocumentStream};
use crate::RemoteError;

/// Sender side of one subscription.
type Watcher = (String, mpsc::UnboundedSender<DocumentEvent>);

/// A write accepted by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub identity: IdentityId,
    pub profile: Profile,
}

/// Thread-safe in-memory document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<IdentityId, Value>,
    watchers: DashMap<IdentityId, Vec<Watcher>>,
    writes: Mutex<Vec<WriteRecord>>,
    failing: AtomicBool,
    write_delay: Mutex<Duration>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every write by `delay` before it lands.
    pub fn set_write_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.write_delay.lock() {
            *current = delay;
        }
    }

    /// Simulate an edit made on another device.
    pub fn put_external(&self, identity: &str, profile: &Profile) {
        tracing::debug!(identity = %identity, "External document change");
        self.store(identity, profile.to_document());
    }

    /// Simulate an edit that bypassed validation on another client.
    pub fn put_raw(&self, identity: &str, document: Value) {
        self.store(identity, document);
    }

    /// Break every open subscription for an identity.
    pub fn fail_subscriptions(&self, identity: &str, error: RemoteError) {
        self.broadcast(identity, DocumentEvent::Failed(error));
        self.watchers.remove(identity);
    }

    /// Current document for an identity.
    pub fn document(&self, identity: &str) -> Option<Profile> {
        self.documents
            .get(identity)
            .and_then(|doc| Profile::from_document(doc.value()).ok())
    }

    /// Every write accepted through [`DocumentChannel::write`], in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Writes accepted for one identity.
    pub fn write_count(&self, identity: &str) -> usize {
        self.writes()
            .iter()
            .filter(|w| w.identity == identity)
            .count()
    }

    /// Number of open subscriptions for an identity.
    pub fn subscriber_count(&self, identity: &str) -> usize {
        self.watchers
            .get(identity)
            .map(|w| w.iter().filter(|(_, tx)| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn store(&self, identity: &str, document: Value) {
        self.documents.insert(identity.to_string(), document.clone());
        self.broadcast(identity, DocumentEvent::Changed(Some(document)));
    }

    fn broadcast(&self, identity: &str, event: DocumentEvent) {
        if let Some(mut watchers) = self.watchers.get_mut(identity) {
            watchers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
            tracing::trace!(
                identity = %identity,
                recipients = watchers.len(),
                "Broadcast document event"
            );
        }
    }

    fn write_delay(&self) -> Duration {
        self.write_delay.lock().map(|d| *d).unwrap_or_default()
    }
}

#[async_trait]
impl DocumentChannel for MemoryDocumentStore {
    fn subscribe(&self, identity: &IdentityId) -> DocumentStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = self.documents.get(identity).map(|doc| doc.value().clone());
        // Initial snapshot, like a real-time database listener.
        let _ = tx.send(DocumentEvent::Changed(current));

        let watcher_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(identity = %identity, watcher = %watcher_id, "Document subscription opened");
        self.watchers
            .entry(identity.clone())
            .or_default()
            .push((watcher_id, tx));

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }

    async fn write(&self, identity: &IdentityId, profile: &Profile) -> Result<(), RemoteError> {
        let delay = self.write_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("memory store is offline".into()));
        }

        if let Ok(mut writes) = self.writes.lock() {
            writes.push(WriteRecord {
                identity: identity.clone(),
                profile: profile.clone(),
            });
        }
        self.store(identity, profile.to_document());
        Ok(())
    }

    async fn read(&self, identity: &IdentityId) -> Result<Option<Profile>, RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("memory store is offline".into()));
        }
        match self.documents.get(identity) {
            Some(doc) => Ok(Some(Profile::from_document(doc.value())?)),
            None => Ok(None),
        }
    }
}
