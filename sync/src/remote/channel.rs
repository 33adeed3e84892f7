//! The remote document channel contract.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tandem_engine::{IdentityId, Profile};

use crate::RemoteError;

/// One notification from a document subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// Current contents of the document; `None` if it does not exist.
    Changed(Option<Value>),
    /// The subscription failed. The stream may end after this.
    Failed(RemoteError),
}

/// Live view of one identity's document. Dropping it unsubscribes.
pub type DocumentStream = BoxStream<'static, DocumentEvent>;

/// A per-identity document service.
///
/// Implementations deliver the current document as the first event of every
/// subscription and then one event per change, including changes made
/// through [`DocumentChannel::write`] on this same channel.
#[async_trait]
pub trait DocumentChannel: Send + Sync {
    /// Subscribe to an identity's document.
    fn subscribe(&self, identity: &IdentityId) -> DocumentStream;

    /// Create or overwrite the document.
    async fn write(&self, identity: &IdentityId, profile: &Profile) -> Result<(), RemoteError>;

    /// Fetch the document once.
    async fn read(&self, identity: &IdentityId) -> Result<Option<Profile>, RemoteError>;
}
