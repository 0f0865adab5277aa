//! Stored items and the storage collaborator seam.
//!
//! The core owns no persistence. Values are read and written through a
//! [`StorageAdapter`] supplied by the embedder; the core only produces and
//! consumes [`StoredItem`] records and inspects their metadata for the
//! replication and expiration predicates.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::contact::hex_bytes;
use crate::key::Key;
use crate::Result;

/// Metadata carried alongside every stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Publication time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Fingerprint of the node that published the value.
    pub publisher: Key,
}

/// A value held in the DHT: an opaque blob plus its metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    /// The raw value bytes.
    #[serde(with = "hex_bytes")]
    pub blob: Vec<u8>,
    /// Publication metadata.
    pub meta: ItemMeta,
}

impl StoredItem {
    /// Create an item published by `publisher` at `timestamp`.
    pub fn new(blob: Vec<u8>, publisher: Key, timestamp: u64) -> Self {
        Self {
            blob,
            meta: ItemMeta {
                timestamp,
                publisher,
            },
        }
    }
}

/// Input to an iterative store: either a bare blob, which the node wraps
/// with its own metadata, or a pre-shaped item (a republished value), which
/// keeps its publisher.
#[derive(Clone, Debug)]
pub enum StoreValue {
    /// A raw blob to publish as the local node.
    Blob(Vec<u8>),
    /// An item that already carries metadata.
    Item(StoredItem),
}

impl StoreValue {
    /// Produce the item actually sent to storage targets. Both shapes get a
    /// fresh timestamp; a pre-shaped item keeps its original publisher.
    pub fn materialize(self, local: Key, now: u64) -> StoredItem {
        match self {
            StoreValue::Blob(blob) => StoredItem::new(blob, local, now),
            StoreValue::Item(mut item) => {
                item.meta.timestamp = now;
                item
            }
        }
    }
}

impl From<Vec<u8>> for StoreValue {
    fn from(blob: Vec<u8>) -> Self {
        StoreValue::Blob(blob)
    }
}

impl From<StoredItem> for StoreValue {
    fn from(item: StoredItem) -> Self {
        StoreValue::Item(item)
    }
}

/// Capability the embedder supplies for value persistence.
///
/// `scan` yields a finite stream over every stored item through a bounded
/// channel, so the producer runs at its own pace and the core applies
/// backpressure one item at a time. Each call produces a fresh stream.
pub trait StorageAdapter: Send + Sync + 'static {
    /// Fetch the item stored under `key`, if any.
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<StoredItem>>> + Send;

    /// Store `item` under `key`, replacing any previous value.
    fn put(&self, key: Key, item: StoredItem) -> impl Future<Output = Result<()>> + Send;

    /// Delete the item stored under `key`.
    fn delete(&self, key: &Key) -> impl Future<Output = Result<()>> + Send;

    /// Start a scan over all stored items.
    fn scan(&self) -> impl Future<Output = Result<mpsc::Receiver<(Key, StoredItem)>>> + Send;
}
