//! Scripted collaborators for unit tests.
//!
//! [`ScriptedOutbox`] plays the transport: every call is recorded, and
//! per-target failures and replies can be scripted ahead of time.
//! [`MemoryStorage`] plays the storage collaborator with an in-memory map.
//! Both are cheap clones around shared state so tests keep a handle after
//! giving one to a node.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::contact::{Address, Contact};
use crate::events::Event;
use crate::key::Key;
use crate::node::{Node, NodeConfig};
use crate::outbox::{FindValueReply, Outbox};
use crate::storage::{StorageAdapter, StoredItem};
use crate::{DhtError, Result, KEY_BYTES};

/// One outbound call recorded by the scripted outbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundCall {
    Ping { target: Key },
    Store { target: Key, key: Key },
    FindNode { target: Key, key: Key },
    FindValue { target: Key, key: Key },
}

#[derive(Default)]
struct OutboxScript {
    fail_pings: HashSet<Key>,
    fail_stores: HashSet<Key>,
    fail_finds: HashSet<Key>,
    contact_replies: HashMap<Key, Vec<Contact>>,
    value_replies: HashMap<Key, StoredItem>,
    calls: Vec<OutboundCall>,
    stored_items: Vec<(Key, StoredItem)>,
}

/// A transport double whose behavior is scripted per target fingerprint.
#[derive(Clone, Default)]
pub struct ScriptedOutbox {
    script: Arc<Mutex<OutboxScript>>,
}

impl ScriptedOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OutboxScript> {
        self.script.lock().expect("outbox script poisoned")
    }

    /// Make PINGs to `target` fail.
    pub fn fail_ping(&self, target: Key) {
        self.lock().fail_pings.insert(target);
    }

    /// Make STOREs to `target` fail.
    pub fn fail_store(&self, target: Key) {
        self.lock().fail_stores.insert(target);
    }

    /// Make FIND_NODE and FIND_VALUE to `target` fail.
    pub fn fail_find(&self, target: Key) {
        self.lock().fail_finds.insert(target);
    }

    /// Script the contact list `target` returns to lookups.
    pub fn reply_with_contacts(&self, target: Key, contacts: Vec<Contact>) {
        self.lock().contact_replies.insert(target, contacts);
    }

    /// Script `target` to hold a value.
    pub fn reply_with_value(&self, target: Key, item: StoredItem) {
        self.lock().value_replies.insert(target, item);
    }

    /// Every call recorded so far.
    pub fn calls(&self) -> Vec<OutboundCall> {
        self.lock().calls.clone()
    }

    /// Recorded FIND_NODE lookup keys, deduplicated in call order.
    pub fn find_node_keys(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        for call in self.lock().calls.iter() {
            if let OutboundCall::FindNode { key, .. } = call {
                if !keys.contains(key) {
                    keys.push(*key);
                }
            }
        }
        keys
    }

    /// Number of STORE calls recorded.
    pub fn store_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, OutboundCall::Store { .. }))
            .count()
    }

    /// Every item shipped through STORE, in call order, including ones the
    /// script made fail.
    pub fn stored_items(&self) -> Vec<(Key, StoredItem)> {
        self.lock().stored_items.clone()
    }
}

impl Outbox for ScriptedOutbox {
    async fn ping(&self, target: &Contact, _sender: &Contact) -> Result<u64> {
        let mut script = self.lock();
        script.calls.push(OutboundCall::Ping { target: target.id });
        if script.fail_pings.contains(&target.id) {
            return Err(DhtError::Transport("scripted ping failure".to_string()));
        }
        Ok(crate::node::now_ms())
    }

    async fn store(
        &self,
        target: &Contact,
        key: &Key,
        item: &StoredItem,
        _sender: &Contact,
    ) -> Result<()> {
        let mut script = self.lock();
        script.calls.push(OutboundCall::Store {
            target: target.id,
            key: *key,
        });
        script.stored_items.push((*key, item.clone()));
        if script.fail_stores.contains(&target.id) {
            return Err(DhtError::Transport("scripted store failure".to_string()));
        }
        Ok(())
    }

    async fn find_node(
        &self,
        target: &Contact,
        key: &Key,
        _sender: &Contact,
    ) -> Result<Vec<Contact>> {
        let mut script = self.lock();
        script.calls.push(OutboundCall::FindNode {
            target: target.id,
            key: *key,
        });
        if script.fail_finds.contains(&target.id) {
            return Err(DhtError::Transport("scripted find failure".to_string()));
        }
        Ok(script
            .contact_replies
            .get(&target.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_value(
        &self,
        target: &Contact,
        key: &Key,
        _sender: &Contact,
    ) -> Result<FindValueReply> {
        let mut script = self.lock();
        script.calls.push(OutboundCall::FindValue {
            target: target.id,
            key: *key,
        });
        if script.fail_finds.contains(&target.id) {
            return Err(DhtError::Transport("scripted find failure".to_string()));
        }
        if let Some(item) = script.value_replies.get(&target.id) {
            return Ok(FindValueReply::Value(item.clone()));
        }
        Ok(FindValueReply::Contacts(
            script
                .contact_replies
                .get(&target.id)
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

#[derive(Default)]
struct MemoryStorageInner {
    items: HashMap<Key, StoredItem>,
    fail_gets: bool,
    fail_puts: bool,
}

/// An in-memory storage collaborator.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStorageInner> {
        self.inner.lock().expect("memory storage poisoned")
    }

    /// Seed an item directly.
    pub fn insert(&self, key: Key, item: StoredItem) {
        self.lock().items.insert(key, item);
    }

    /// Read an item without going through the adapter.
    pub fn get_sync(&self, key: &Key) -> Option<StoredItem> {
        self.lock().items.get(key).cloned()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.lock().items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Make `get` fail from now on.
    pub fn fail_gets(&self) {
        self.lock().fail_gets = true;
    }

    /// Make `put` fail from now on.
    pub fn fail_puts(&self) {
        self.lock().fail_puts = true;
    }
}

impl StorageAdapter for MemoryStorage {
    async fn get(&self, key: &Key) -> Result<Option<StoredItem>> {
        let inner = self.lock();
        if inner.fail_gets {
            return Err(DhtError::Storage("scripted get failure".to_string()));
        }
        Ok(inner.items.get(key).cloned())
    }

    async fn put(&self, key: Key, item: StoredItem) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_puts {
            return Err(DhtError::Storage("scripted put failure".to_string()));
        }
        inner.items.insert(key, item);
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        self.lock().items.remove(key);
        Ok(())
    }

    async fn scan(&self) -> Result<mpsc::Receiver<(Key, StoredItem)>> {
        let items: Vec<(Key, StoredItem)> = self
            .lock()
            .items
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for pair in items {
            let _ = tx.try_send(pair);
        }
        Ok(rx)
    }
}

/// A contact with the given raw fingerprint bytes.
pub fn contact_with_id(bytes: [u8; KEY_BYTES]) -> Contact {
    let id = Key::from_bytes(bytes);
    Contact::new(id, Address::new(format!("peer-{id}:4433").into_bytes()))
}

/// A contact whose fingerprint falls in bucket `index` relative to `local`.
pub fn contact_in_bucket(local: &Key, index: usize) -> Contact {
    let id = Key::random_in_bucket(local, index);
    Contact::new(id, Address::new(format!("peer-{id}:4433").into_bytes()))
}

/// A node wired to scripted collaborators, plus handles to all of them.
pub type TestNode = (
    Arc<Node<ScriptedOutbox, MemoryStorage>>,
    ScriptedOutbox,
    MemoryStorage,
    mpsc::UnboundedReceiver<Event>,
);

/// Build a node around a scripted outbox and in-memory storage.
pub fn test_node(local_id: Key) -> TestNode {
    let outbox = ScriptedOutbox::new();
    let storage = MemoryStorage::new();
    let local = Contact::new(local_id, Address::new(&b"local:4433"[..]));
    let (node, events) = Node::new(local, outbox.clone(), storage.clone(), NodeConfig::default())
        .expect("valid default config");
    (node, outbox, storage, events)
}
