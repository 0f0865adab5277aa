//! The outbound RPC seam.
//!
//! The core issues PING, STORE, FIND_NODE and FIND_VALUE requests through
//! an [`Outbox`] supplied by the embedder. The transport owns delivery,
//! serialization and the response timeout; to the core a timeout is just
//! another failed call. Every method completes exactly once.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::contact::Contact;
use crate::key::Key;
use crate::storage::StoredItem;
use crate::Result;

/// Reply to a FIND_VALUE request: the value when the peer holds it,
/// otherwise the peer's closest contacts to the key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindValueReply {
    /// The peer does not hold the value; these are its closest contacts.
    Contacts(Vec<Contact>),
    /// The peer holds the value.
    Value(StoredItem),
}

/// Capability the embedder supplies for outbound RPC delivery.
///
/// Every call carries the local contact so the receiving peer can learn the
/// sender. Implementations map their own failures (including timeouts) to
/// [`crate::DhtError::Transport`].
pub trait Outbox: Send + Sync + 'static {
    /// Send a PING; resolves with the peer's reported timestamp.
    fn ping(&self, target: &Contact, sender: &Contact) -> impl Future<Output = Result<u64>> + Send;

    /// Ask the peer to store `item` under `key`.
    fn store(
        &self,
        target: &Contact,
        key: &Key,
        item: &StoredItem,
        sender: &Contact,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Ask the peer for its closest contacts to `key`.
    fn find_node(
        &self,
        target: &Contact,
        key: &Key,
        sender: &Contact,
    ) -> impl Future<Output = Result<Vec<Contact>>> + Send;

    /// Ask the peer for the value under `key`, or its closest contacts.
    fn find_value(
        &self,
        target: &Contact,
        key: &Key,
        sender: &Contact,
    ) -> impl Future<Output = Result<FindValueReply>> + Send;
}
