//! The node orchestrator: iterative lookups, head-probe eviction and the
//! join sequence.
//!
//! All routing-table mutation funnels through [`Node::update_contact`], so
//! the table behaves as an exclusive-writer resource even though lookups
//! run concurrently. Lookup waves hold [`ALPHA`] RPCs in flight at a time;
//! results merge into the shortlist in arrival order and the shortlist's
//! distance order is the only ordering callers observe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::contact::Contact;
use crate::events::Event;
use crate::key::{bucket_index, Key};
use crate::outbox::{FindValueReply, Outbox};
use crate::routing::{AddOutcome, RoutingTable};
use crate::shortlist::Shortlist;
use crate::storage::{StorageAdapter, StoreValue, StoredItem};
use crate::{
    DhtError, Result, ALPHA, EXPIRE_INTERVAL_MS, HEAD_PROBE_TTL_MS, K, MAX_TIMER_JITTER_MS,
    MAX_UNIMPROVED_REFRESHES, NUM_BUCKETS, REFRESH_INTERVAL_MS, REPLICATE_INTERVAL_MS,
    REPUBLISH_INTERVAL_MS,
};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Tunable node parameters. The defaults are the protocol constants;
/// B, K and ALPHA are structural and not configurable.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// How often buckets are refreshed, and how stale a bucket must be
    /// before a refresh pass looks it up again.
    pub refresh_interval: Duration,
    /// How often the replication pass runs.
    pub replicate_interval: Duration,
    /// Age after which locally published items are republished.
    pub republish_interval: Duration,
    /// Age after which stored items expire.
    pub expire_interval: Duration,
    /// Upper bound of the uniform random delay added to each timer firing.
    pub max_timer_jitter: Duration,
    /// How long a successful head probe keeps a bucket head exempt from
    /// re-probing.
    pub head_probe_ttl: Duration,
    /// Consecutive refresh lookups that discover nothing new before a
    /// refresh pass stops early.
    pub max_unimproved_refreshes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(REFRESH_INTERVAL_MS),
            replicate_interval: Duration::from_millis(REPLICATE_INTERVAL_MS),
            republish_interval: Duration::from_millis(REPUBLISH_INTERVAL_MS),
            expire_interval: Duration::from_millis(EXPIRE_INTERVAL_MS),
            max_timer_jitter: Duration::from_millis(MAX_TIMER_JITTER_MS),
            head_probe_ttl: Duration::from_millis(HEAD_PROBE_TTL_MS),
            max_unimproved_refreshes: MAX_UNIMPROVED_REFRESHES,
        }
    }
}

impl NodeConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero()
            || self.replicate_interval.is_zero()
            || self.republish_interval.is_zero()
            || self.expire_interval.is_zero()
        {
            return Err(DhtError::InvalidConfig(
                "maintenance intervals must be non-zero".to_string(),
            ));
        }
        if self.max_timer_jitter > self.refresh_interval
            || self.max_timer_jitter > self.replicate_interval
        {
            return Err(DhtError::InvalidConfig(
                "timer jitter exceeds the firing interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of the most recent probe of a contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeRecord {
    /// When the probe completed, in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Whether the contact answered.
    pub responded: bool,
}

/// Which RPC an iterative lookup issues per contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LookupKind {
    FindNode,
    FindValue,
}

/// The DHT node: routing state plus the two collaborator capabilities.
pub struct Node<O, S> {
    pub(crate) local: Contact,
    pub(crate) config: NodeConfig,
    pub(crate) outbox: Arc<O>,
    pub(crate) storage: Arc<S>,
    pub(crate) router: Mutex<RoutingTable>,
    /// Most recent probe outcome per fingerprint; throttles head probes.
    pub(crate) probes: Mutex<HashMap<Key, ProbeRecord>>,
    /// Last lookup timestamp per bucket index; drives refresh staleness.
    pub(crate) lookups: Mutex<HashMap<usize, u64>>,
    events: mpsc::UnboundedSender<Event>,
}

impl<O: Outbox, S: StorageAdapter> Node<O, S> {
    /// Create a node around its local contact and the two collaborator
    /// capabilities. Returns the node and the observability event stream.
    pub fn new(
        local: Contact,
        outbox: O,
        storage: S,
        config: NodeConfig,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<Event>)> {
        config.validate()?;
        let (events, receiver) = mpsc::unbounded_channel();
        let node = Arc::new(Self {
            router: Mutex::new(RoutingTable::new(local.id)),
            local,
            config,
            outbox: Arc::new(outbox),
            storage: Arc::new(storage),
            probes: Mutex::new(HashMap::new()),
            lookups: Mutex::new(HashMap::new()),
            events,
        });
        Ok((node, receiver))
    }

    /// The local contact.
    pub fn local(&self) -> &Contact {
        &self.local
    }

    /// The node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Number of contacts currently in the routing table.
    pub async fn contact_count(&self) -> usize {
        self.router.lock().await.len()
    }

    /// Whether the routing table holds the given fingerprint.
    pub async fn has_contact(&self, id: &Key) -> bool {
        self.router.lock().await.contains(id)
    }

    /// Look up a contact in the routing table.
    pub async fn get_contact(&self, id: &Key) -> Option<Contact> {
        self.router.lock().await.get(id).cloned()
    }

    /// Up to `count` contacts closest to `key`, sorted by distance.
    pub async fn closest_contacts(&self, key: &Key, count: usize) -> Vec<Contact> {
        self.router.lock().await.closest_contacts(key, count, false)
    }

    /// Most recent probe outcome for a fingerprint.
    pub async fn last_probe(&self, id: &Key) -> Option<ProbeRecord> {
        self.probes.lock().await.get(id).copied()
    }

    /// When the given bucket was last the target of a lookup.
    pub async fn last_bucket_lookup(&self, index: usize) -> Option<u64> {
        self.lookups.lock().await.get(&index).copied()
    }

    /// Record that a lookup touched the given bucket. Embedders that issue
    /// their own lookups can keep the refresh staleness table accurate.
    pub async fn record_bucket_lookup(&self, index: usize, at_ms: u64) {
        self.lookups.lock().await.insert(index, at_ms);
    }

    pub(crate) fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Probe a contact; resolves with the elapsed round-trip milliseconds.
    pub async fn ping(&self, target: &Contact) -> Result<u64> {
        let started = Instant::now();
        self.outbox.ping(target, &self.local).await?;
        Ok(started.elapsed().as_millis() as u64)
    }

    /// Incorporate a learned contact, applying the head-probe discipline on
    /// bucket overflow.
    ///
    /// When the target bucket is full, its head is probed unless a
    /// successful probe is still fresh. A responsive head stays and the new
    /// contact is dropped; an unresponsive head is evicted and the new
    /// contact takes its place.
    pub async fn update_contact(&self, contact: Contact) {
        if contact.id == self.local.id {
            return;
        }

        let outcome = self.router.lock().await.add_contact(contact.clone());
        let (bucket, head) = match outcome {
            AddOutcome::Inserted { .. } | AddOutcome::Refreshed { .. } => {
                self.emit(Event::ContactAdded { id: contact.id });
                return;
            }
            AddOutcome::Ignored => return,
            AddOutcome::Full { bucket, head } => (bucket, head),
        };

        let now = now_ms();
        let ttl = self.config.head_probe_ttl.as_millis() as u64;
        let head_is_fresh = self
            .probes
            .lock()
            .await
            .get(&head.id)
            .is_some_and(|p| p.responded && now.saturating_sub(p.timestamp) < ttl);
        if head_is_fresh {
            return;
        }

        match self.ping(&head).await {
            Ok(_) => {
                self.probes.lock().await.insert(
                    head.id,
                    ProbeRecord {
                        timestamp: now_ms(),
                        responded: true,
                    },
                );
            }
            Err(err) => {
                debug!(
                    peer = %head.id,
                    bucket,
                    error = %err,
                    "bucket head unresponsive, evicting"
                );
                self.probes.lock().await.insert(
                    head.id,
                    ProbeRecord {
                        timestamp: now_ms(),
                        responded: false,
                    },
                );

                let replaced = {
                    let mut router = self.router.lock().await;
                    let removed = router.remove_contact(&head.id).is_some();
                    let outcome = router.add_contact(contact.clone());
                    (removed, outcome)
                };
                if replaced.0 {
                    self.emit(Event::ContactDeleted { id: head.id });
                }
                if matches!(
                    replaced.1,
                    AddOutcome::Inserted { .. } | AddOutcome::Refreshed { .. }
                ) {
                    self.emit(Event::ContactAdded { id: contact.id });
                }
            }
        }
    }

    /// Locate up to [`K`] active contacts closest to `key`.
    ///
    /// Transport failures are swallowed; the result is whatever answered,
    /// possibly empty.
    pub async fn iterative_find_node(&self, key: Key) -> Vec<Contact> {
        match self.lookup(key, LookupKind::FindNode).await {
            FindValueReply::Contacts(contacts) => contacts,
            // FIND_NODE probes only ever yield contact lists.
            FindValueReply::Value(_) => Vec::new(),
        }
    }

    /// Locate the value stored under `key`, or the closest active contacts
    /// when no probed peer holds it.
    pub async fn iterative_find_value(&self, key: Key) -> FindValueReply {
        self.lookup(key, LookupKind::FindValue).await
    }

    /// The shared iterative search core.
    async fn lookup(&self, key: Key, kind: LookupKind) -> FindValueReply {
        let seeds = self.router.lock().await.closest_contacts(&key, ALPHA, false);
        let mut shortlist = Shortlist::new(key, seeds);
        if let Some(index) = bucket_index(&self.local.id, &key) {
            self.lookups.lock().await.insert(index, now_ms());
        }

        let mut best = shortlist.closest_distance();
        let mut finishing = false;

        loop {
            let wave = shortlist.take_uncontacted(if finishing { K } else { ALPHA });
            if wave.is_empty() {
                break;
            }

            let mut in_flight = FuturesUnordered::new();
            for contact in wave {
                in_flight.push(async move {
                    let reply = match kind {
                        LookupKind::FindNode => self
                            .outbox
                            .find_node(&contact, &key, &self.local)
                            .await
                            .map(FindValueReply::Contacts),
                        LookupKind::FindValue => {
                            self.outbox.find_value(&contact, &key, &self.local).await
                        }
                    };
                    (contact, reply)
                });
            }

            let mut discovered: Vec<Contact> = Vec::new();
            let mut value: Option<StoredItem> = None;
            while let Some((contact, reply)) = in_flight.next().await {
                match reply {
                    Err(err) => {
                        // The contact stays contacted but never becomes
                        // active; a timeout looks the same as any failure.
                        debug!(peer = %contact.id, error = %err, "lookup probe failed");
                    }
                    Ok(FindValueReply::Contacts(contacts)) => {
                        shortlist.mark_responded(&contact.id);
                        // Peers may echo the local contact back; it never
                        // joins the shortlist.
                        let contacts = contacts
                            .into_iter()
                            .filter(|c| c.id != self.local.id);
                        discovered.extend(shortlist.add(contacts));
                    }
                    Ok(FindValueReply::Value(item)) => {
                        shortlist.mark_responded(&contact.id);
                        // Replicate the value onto the closest active
                        // contact that did not have it, without waiting.
                        if let Some(target) = shortlist
                            .active()
                            .into_iter()
                            .find(|c| c.id != contact.id)
                        {
                            self.spawn_store_back(target, key, item.clone());
                        }
                        value = Some(item);
                        break;
                    }
                }
            }
            drop(in_flight);

            for contact in discovered {
                self.update_contact(contact).await;
            }
            if let Some(item) = value {
                return FindValueReply::Value(item);
            }

            if shortlist.active_len() >= K || finishing {
                break;
            }

            let improved = match (best, shortlist.closest_distance()) {
                (Some(prev), Some(current)) => current < prev,
                (None, Some(_)) => true,
                _ => false,
            };
            if improved {
                best = shortlist.closest_distance();
            } else {
                // One last K-wide wave before giving up on convergence.
                finishing = true;
            }
        }

        FindValueReply::Contacts(shortlist.active().into_iter().take(K).collect())
    }

    fn spawn_store_back(&self, target: Contact, key: Key, item: StoredItem) {
        let outbox = Arc::clone(&self.outbox);
        let local = self.local.clone();
        tokio::spawn(async move {
            if let Err(err) = outbox.store(&target, &key, &item, &local).await {
                debug!(peer = %target.id, error = %err, "store-back failed");
            }
        });
    }

    /// Store a value on the network: locate the closest contacts to `key`,
    /// then dispatch STORE to each with [`ALPHA`] workers draining a shared
    /// cursor. Resolves with the number of confirmed stores.
    pub async fn iterative_store(&self, key: Key, value: impl Into<StoreValue>) -> Result<usize> {
        let item = value.into().materialize(self.local.id, now_ms());
        let targets = self.iterative_find_node(key).await;

        let cursor = AtomicUsize::new(0);
        let stored = AtomicUsize::new(0);
        let workers = (0..ALPHA).map(|_| {
            let item = &item;
            let targets = &targets;
            let cursor = &cursor;
            let stored = &stored;
            async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(target) = targets.get(index) else {
                        break;
                    };
                    match self.outbox.store(target, &key, item, &self.local).await {
                        Ok(()) => {
                            stored.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(err) => {
                            debug!(peer = %target.id, error = %err, "store rejected");
                        }
                    }
                }
            }
        });
        join_all(workers).await;

        match stored.load(Ordering::SeqCst) {
            0 => Err(DhtError::NoStorageTargets),
            count => {
                info!(key = %key, count, "value stored");
                Ok(count)
            }
        }
    }

    /// Join the network through a seed contact: insert the seed, look up
    /// the local fingerprint to populate nearby buckets, then refresh every
    /// bucket farther out than the closest occupied one.
    ///
    /// Resolves with the number of peers the self-lookup activated.
    pub async fn join(&self, seed: Contact) -> Result<usize> {
        info!(peer = %seed.id, "joining network");
        self.update_contact(seed).await;

        let found = self.iterative_find_node(self.local.id).await;
        if found.is_empty() {
            return Err(DhtError::JoinFailed(
                "self-lookup reached no peers".to_string(),
            ));
        }

        let start = self.router.lock().await.closest_bucket() + 1;
        if start < NUM_BUCKETS {
            let summary = self.refresh(start).await;
            debug!(
                lookups = summary.lookups,
                discovered = summary.discovered,
                "post-join refresh complete"
            );
        }

        Ok(found.len())
    }
}
