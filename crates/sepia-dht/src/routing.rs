//! The Kademlia routing table: 160 buckets indexed by the most-significant
//! differing bit between the local fingerprint and a key.
//!
//! The table itself is a pure data structure; it reports what happened on
//! each mutation through [`AddOutcome`] and leaves probing, eviction and
//! event emission to the orchestrator. The local fingerprint is never
//! stored.

use crate::bucket::{Bucket, SetOutcome};
use crate::contact::Contact;
use crate::key::{bucket_index, Key};
use crate::NUM_BUCKETS;

/// Result of attempting to add a contact to the routing table.
#[derive(Clone, Debug)]
pub enum AddOutcome {
    /// The contact was newly inserted.
    Inserted {
        /// Index of the bucket it entered.
        bucket: usize,
    },
    /// The contact was already present; it moved to its bucket's tail.
    Refreshed {
        /// Index of the bucket it lives in.
        bucket: usize,
    },
    /// The contact was ignored (its fingerprint equals the local one).
    Ignored,
    /// The target bucket is at capacity. Contains the head entry that the
    /// caller should probe before deciding whether to evict.
    Full {
        /// Index of the full bucket.
        bucket: usize,
        /// The bucket's head: the probe target.
        head: Contact,
    },
}

/// The routing table: [`NUM_BUCKETS`] buckets keyed by bucket index.
pub struct RoutingTable {
    /// The local node's fingerprint.
    local: Key,
    /// The buckets, farthest (index 0) to nearest (index 159).
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    /// Create an empty routing table for the given local fingerprint.
    pub fn new(local: Key) -> Self {
        let mut buckets = Vec::with_capacity(NUM_BUCKETS);
        for _ in 0..NUM_BUCKETS {
            buckets.push(Bucket::new());
        }
        Self { local, buckets }
    }

    /// The local fingerprint.
    pub fn local(&self) -> &Key {
        &self.local
    }

    /// Number of buckets (the identifier bit width).
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Total number of contacts across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Whether the table holds no contacts.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    /// Number of contacts in one bucket.
    pub fn bucket_len(&self, index: usize) -> usize {
        self.buckets.get(index).map_or(0, Bucket::len)
    }

    /// Add or touch a contact in the bucket its fingerprint selects.
    pub fn add_contact(&mut self, contact: Contact) -> AddOutcome {
        let Some(index) = bucket_index(&self.local, &contact.id) else {
            return AddOutcome::Ignored;
        };

        let bucket = &mut self.buckets[index];
        match bucket.set(contact) {
            SetOutcome::Inserted => AddOutcome::Inserted { bucket: index },
            SetOutcome::Refreshed => AddOutcome::Refreshed { bucket: index },
            SetOutcome::Full => match bucket.head() {
                Some(head) => AddOutcome::Full {
                    bucket: index,
                    head: head.clone(),
                },
                None => AddOutcome::Ignored,
            },
        }
    }

    /// Remove a contact, returning it with the index of the bucket it left.
    pub fn remove_contact(&mut self, id: &Key) -> Option<(usize, Contact)> {
        let index = bucket_index(&self.local, id)?;
        let contact = self.buckets[index].remove(id)?;
        Some((index, contact))
    }

    /// Look up a contact by fingerprint.
    pub fn get(&self, id: &Key) -> Option<&Contact> {
        let index = bucket_index(&self.local, id)?;
        self.buckets[index].get(id)
    }

    /// Whether the table holds the given fingerprint.
    pub fn contains(&self, id: &Key) -> bool {
        self.get(id).is_some()
    }

    /// Index of the bucket a fingerprint belongs to, or `None` for the
    /// local fingerprint.
    pub fn bucket_index_of(&self, id: &Key) -> Option<usize> {
        bucket_index(&self.local, id)
    }

    /// Index of the lowest-numbered non-empty bucket, or the last bucket
    /// index when the table is empty.
    pub fn closest_bucket(&self) -> usize {
        self.buckets
            .iter()
            .position(|b| !b.is_empty())
            .unwrap_or(NUM_BUCKETS - 1)
    }

    /// Up to `count` contacts sorted ascending by XOR distance to `key`.
    ///
    /// Scans the bucket the key maps to first, then walks outward
    /// (descending indices, then ascending) until enough contacts are
    /// gathered or every bucket has been visited. With `exclusive` set, a
    /// contact whose fingerprint equals `key` is omitted.
    pub fn closest_contacts(&self, key: &Key, count: usize, exclusive: bool) -> Vec<Contact> {
        let start = bucket_index(&self.local, key).unwrap_or(NUM_BUCKETS - 1);

        let mut gathered: Vec<Contact> = Vec::new();
        let mut take = |bucket: &Bucket, gathered: &mut Vec<Contact>| {
            for contact in bucket.iter() {
                if exclusive && contact.id == *key {
                    continue;
                }
                gathered.push(contact.clone());
            }
        };

        take(&self.buckets[start], &mut gathered);
        for index in (0..start).rev() {
            if gathered.len() >= count {
                break;
            }
            take(&self.buckets[index], &mut gathered);
        }
        for index in start + 1..NUM_BUCKETS {
            if gathered.len() >= count {
                break;
            }
            take(&self.buckets[index], &mut gathered);
        }

        gathered.sort_by_key(|c| c.id.distance(key));
        gathered.truncate(count);
        gathered
    }
}
