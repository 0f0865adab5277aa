//! Shared test support: an in-memory storage collaborator and a loopback
//! network that routes outbound RPCs straight into other nodes' request
//! handlers, so multi-node flows run without any real I/O.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use sepia_dht::contact::{Address, Contact};
use sepia_dht::key::Key;
use sepia_dht::node::{Node, NodeConfig};
use sepia_dht::outbox::{FindValueReply, Outbox};
use sepia_dht::protocol::Protocol;
use sepia_dht::storage::{StorageAdapter, StoredItem};
use sepia_dht::{DhtError, Result};

/// An in-memory storage collaborator.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<Key, StoredItem>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, StoredItem>> {
        self.items.lock().expect("memory storage poisoned")
    }

    /// Seed an item directly.
    pub fn insert(&self, key: Key, item: StoredItem) {
        self.lock().insert(key, item);
    }

    /// Read an item without going through the adapter.
    pub fn get_sync(&self, key: &Key) -> Option<StoredItem> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl StorageAdapter for MemoryStorage {
    async fn get(&self, key: &Key) -> Result<Option<StoredItem>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put(&self, key: Key, item: StoredItem) -> Result<()> {
        self.lock().insert(key, item);
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    async fn scan(&self) -> Result<mpsc::Receiver<(Key, StoredItem)>> {
        let items: Vec<(Key, StoredItem)> =
            self.lock().iter().map(|(k, v)| (*k, v.clone())).collect();
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for pair in items {
            let _ = tx.try_send(pair);
        }
        Ok(rx)
    }
}

type LoopbackProtocol = Arc<Protocol<Loopback, MemoryStorage>>;

/// An in-process network: outbound RPCs are dispatched directly into the
/// registered peer's request handlers. Unregistered targets behave like
/// unreachable hosts.
#[derive(Clone, Default)]
pub struct Loopback {
    peers: Arc<Mutex<HashMap<Key, LoopbackProtocol>>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire a node into the network.
    pub fn register(&self, node: Arc<Node<Loopback, MemoryStorage>>) {
        let id = node.local().id;
        self.peers
            .lock()
            .expect("loopback poisoned")
            .insert(id, Arc::new(Protocol::new(node)));
    }

    /// Disconnect a node; subsequent RPCs toward it fail.
    pub fn unregister(&self, id: &Key) {
        self.peers.lock().expect("loopback poisoned").remove(id);
    }

    fn peer(&self, id: &Key) -> Result<LoopbackProtocol> {
        self.peers
            .lock()
            .expect("loopback poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| DhtError::Transport(format!("peer {id} unreachable")))
    }
}

/// A type-erased future. The handlers called through the loopback end up
/// re-entering the outbox (head probes ping through the network), so the
/// inner calls are boxed to keep the future types finite.
type Boxed<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Wraps a future and asserts it is `Send` without making the compiler prove
/// it structurally.
///
/// The loopback network re-enters the outbox (head probes ping back through
/// `Protocol`, which calls back into `Node::update_contact`, which can issue
/// another probe), so the hidden future type behind `Outbox::ping` et al.
/// would otherwise need to refer to itself to compute its own `Send`-ness —
/// an unresolvable cycle for the compiler (rather than an actual data race;
/// every value crossing the boundary here — `Contact`, `Key`, `StoredItem` —
/// is plain owned data). Boxing through this wrapper gives the future a
/// manifest, non-recursive `Send` impl and breaks the cycle.
struct AssertSend<F>(F);
unsafe impl<F> Send for AssertSend<F> {}
impl<F: Future> Future for AssertSend<F> {
    type Output = F::Output;
    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<F::Output> {
        unsafe { self.map_unchecked_mut(|s| &mut s.0) }.poll(cx)
    }
}

fn box_send<T>(fut: impl Future<Output = Result<T>> + 'static) -> Boxed<T> {
    Box::pin(AssertSend(fut))
}

impl Outbox for Loopback {
    async fn ping(&self, target: &Contact, sender: &Contact) -> Result<u64> {
        let peer = self.peer(&target.id)?;
        let sender = sender.clone();
        box_send(async move { peer.ping(sender).await }).await
    }

    async fn store(
        &self,
        target: &Contact,
        key: &Key,
        item: &StoredItem,
        sender: &Contact,
    ) -> Result<()> {
        let peer = self.peer(&target.id)?;
        let key = key.to_hex();
        let item = item.clone();
        let sender = sender.clone();
        box_send(async move { peer.store(&key, item, sender).await }).await
    }

    async fn find_node(
        &self,
        target: &Contact,
        key: &Key,
        sender: &Contact,
    ) -> Result<Vec<Contact>> {
        let peer = self.peer(&target.id)?;
        let key = key.to_hex();
        let sender = sender.clone();
        box_send(async move { peer.find_node(&key, sender).await }).await
    }

    async fn find_value(
        &self,
        target: &Contact,
        key: &Key,
        sender: &Contact,
    ) -> Result<FindValueReply> {
        let peer = self.peer(&target.id)?;
        let key = key.to_hex();
        let sender = sender.clone();
        box_send(async move { peer.find_value(&key, sender).await }).await
    }
}

/// A contact with a deterministic fingerprint derived from `tag`.
pub fn make_contact(tag: &str) -> Contact {
    let id = sepia_dht::key::hash160(tag.as_bytes());
    Contact::new(id, Address::new(format!("{tag}.test:4433").into_bytes()))
}

/// Spin up a node on the loopback network. Returns the node and its
/// storage handle; the observability stream is dropped.
pub fn spawn_node(
    network: &Loopback,
    tag: &str,
) -> (Arc<Node<Loopback, MemoryStorage>>, MemoryStorage) {
    let storage = MemoryStorage::new();
    let (node, _events) = Node::new(
        make_contact(tag),
        network.clone(),
        storage.clone(),
        NodeConfig::default(),
    )
    .expect("valid default config");
    network.register(Arc::clone(&node));
    (node, storage)
}
