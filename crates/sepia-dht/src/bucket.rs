//! A single capacity-K bucket of the routing table.
//!
//! Entries are kept in insertion order: the front of the deque is the head
//! (the probe target on overflow) and the back is the tail (the most
//! recently touched contact). A full bucket never evicts on its own; it
//! reports [`SetOutcome::Full`] and leaves eviction to the head-probe
//! discipline in the orchestrator.

use std::collections::VecDeque;

use crate::contact::Contact;
use crate::key::Key;
use crate::K;

/// Outcome of a [`Bucket::set`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOutcome {
    /// The contact was new and was inserted at the head slot.
    Inserted,
    /// The contact was already present; it moved to the tail slot and its
    /// address was refreshed.
    Refreshed,
    /// The bucket is at capacity; nothing changed.
    Full,
}

/// An insertion-ordered mapping of fingerprint to contact, capacity [`K`].
#[derive(Clone, Debug, Default)]
pub struct Bucket {
    /// Entries in insertion order (front = head, back = tail).
    entries: VecDeque<Contact>,
}

impl Bucket {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(K),
        }
    }

    /// Number of contacts in the bucket.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bucket holds no contacts.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the bucket is at capacity.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= K
    }

    /// Position of a fingerprint within the bucket, if present.
    pub fn position(&self, id: &Key) -> Option<usize> {
        self.entries.iter().position(|c| c.id == *id)
    }

    /// Look up a contact by fingerprint.
    pub fn get(&self, id: &Key) -> Option<&Contact> {
        self.entries.iter().find(|c| c.id == *id)
    }

    /// Whether the bucket holds the given fingerprint.
    pub fn contains(&self, id: &Key) -> bool {
        self.position(id).is_some()
    }

    /// The head entry: the probe target when the bucket overflows.
    pub fn head(&self) -> Option<&Contact> {
        self.entries.front()
    }

    /// The tail entry: the most recently touched contact.
    pub fn tail(&self) -> Option<&Contact> {
        self.entries.back()
    }

    /// Insert or touch a contact.
    ///
    /// A contact already present is reinserted at the tail (its address is
    /// taken from the new record). A new contact enters at the head when
    /// there is room. A full bucket is left untouched.
    pub fn set(&mut self, contact: Contact) -> SetOutcome {
        if let Some(index) = self.position(&contact.id) {
            self.entries.remove(index);
            self.entries.push_back(contact);
            return SetOutcome::Refreshed;
        }
        if self.is_full() {
            return SetOutcome::Full;
        }
        self.entries.push_front(contact);
        SetOutcome::Inserted
    }

    /// Remove a contact by fingerprint.
    pub fn remove(&mut self, id: &Key) -> Option<Contact> {
        let index = self.position(id)?;
        self.entries.remove(index)
    }

    /// Iterate the contacts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.entries.iter()
    }

    /// Up to `count` contacts sorted ascending by XOR distance to `key`.
    ///
    /// With `exclusive` set, a contact whose fingerprint equals `key` is
    /// omitted.
    pub fn closest_to(&self, key: &Key, count: usize, exclusive: bool) -> Vec<Contact> {
        let mut contacts: Vec<&Contact> = self
            .entries
            .iter()
            .filter(|c| !exclusive || c.id != *key)
            .collect();
        contacts.sort_by_key(|c| c.id.distance(key));
        contacts.into_iter().take(count).cloned().collect()
    }
}
