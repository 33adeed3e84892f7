//! Remote document access.
//!
//! The sync session talks to the remote through the [`DocumentChannel`]
//! trait. [`MemoryDocumentStore`] is a complete in-process implementation.

mod channel;
mod memory;

pub use channel::{DocumentChannel, DocumentEvent, DocumentStream};
pub use memory::{MemoryDocumentStore, WriteRecord};
