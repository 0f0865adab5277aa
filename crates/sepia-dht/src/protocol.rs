//! Inbound request handlers: PING, STORE, FIND_NODE and FIND_VALUE.
//!
//! The transport deserializes a request, resolves the sender into a
//! [`Contact`] and calls the matching handler; the returned future
//! completes the RPC exactly once. Every handler first feeds the sender's
//! contact into the routing table.

use std::sync::Arc;

use tracing::debug;

use crate::contact::Contact;
use crate::events::Event;
use crate::key::{hash160, Key};
use crate::node::{now_ms, Node};
use crate::outbox::{FindValueReply, Outbox};
use crate::storage::{StorageAdapter, StoredItem};
use crate::{DhtError, Result, K};

/// The request-handler surface exposed to the transport layer.
pub struct Protocol<O, S> {
    node: Arc<Node<O, S>>,
}

impl<O: Outbox, S: StorageAdapter> Protocol<O, S> {
    /// Create the handler surface over a node.
    pub fn new(node: Arc<Node<O, S>>) -> Self {
        Self { node }
    }

    /// The node behind this handler surface.
    pub fn node(&self) -> &Arc<Node<O, S>> {
        &self.node
    }

    /// Handle PING: acknowledge with the current timestamp.
    pub async fn ping(&self, sender: Contact) -> Result<u64> {
        self.node.update_contact(sender).await;
        Ok(now_ms())
    }

    /// Handle STORE: validate that `key` is the content hash of the blob,
    /// then hand the item to storage.
    pub async fn store(&self, key: &str, item: StoredItem, sender: Contact) -> Result<()> {
        self.node.update_contact(sender).await;

        let key = Key::from_hex(key)?;
        let expected = hash160(&item.blob);
        if expected != key {
            return Err(DhtError::KeyHashMismatch {
                key: key.to_hex(),
                expected: expected.to_hex(),
            });
        }

        self.node.storage.put(key, item).await?;
        self.node.emit(Event::StoragePut { key });
        Ok(())
    }

    /// Handle FIND_NODE: respond with up to [`K`] contacts closest to
    /// `key`, sorted by distance.
    pub async fn find_node(&self, key: &str, sender: Contact) -> Result<Vec<Contact>> {
        self.node.update_contact(sender).await;

        let key = Key::from_hex(key)?;
        Ok(self.node.router.lock().await.closest_contacts(&key, K, false))
    }

    /// Handle FIND_VALUE: respond with the stored item when present,
    /// otherwise with the closest contacts. A storage failure counts as a
    /// miss.
    pub async fn find_value(&self, key: &str, sender: Contact) -> Result<FindValueReply> {
        self.node.update_contact(sender).await;

        let key = Key::from_hex(key)?;
        self.node.emit(Event::StorageGet { key });

        match self.node.storage.get(&key).await {
            Ok(Some(item)) => return Ok(FindValueReply::Value(item)),
            Ok(None) => {}
            Err(err) => {
                debug!(key = %key, error = %err, "storage get failed, treating as miss");
            }
        }

        Ok(FindValueReply::Contacts(
            self.node.router.lock().await.closest_contacts(&key, K, false),
        ))
    }
}
