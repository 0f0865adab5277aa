//! The per-lookup shortlist: contacts under consideration for one iterative
//! search, sorted ascending by XOR distance to the target key.
//!
//! Alongside the sorted list the shortlist tracks which fingerprints have
//! been contacted (an RPC was dispatched) and which are active (the RPC
//! succeeded). Active is always a subset of contacted. Duplicate insertion
//! is a no-op; on equal distance the first-seen contact keeps its position.

use std::collections::HashSet;

use crate::contact::Contact;
use crate::key::{Distance, Key};

/// A candidate contact with its cached distance to the lookup target.
#[derive(Clone, Debug)]
struct Candidate {
    contact: Contact,
    distance: Distance,
}

/// The lookup shortlist.
pub struct Shortlist {
    /// The target key of the lookup.
    key: Key,
    /// Candidates sorted ascending by distance to `key`, no duplicates.
    candidates: Vec<Candidate>,
    /// Fingerprints an RPC has been dispatched to.
    contacted: HashSet<Key>,
    /// Fingerprints that answered their RPC.
    active: HashSet<Key>,
}

impl Shortlist {
    /// Create a shortlist for `key`, seeded with an initial contact set.
    pub fn new(key: Key, seeds: Vec<Contact>) -> Self {
        let mut shortlist = Self {
            key,
            candidates: Vec::new(),
            contacted: HashSet::new(),
            active: HashSet::new(),
        };
        shortlist.add(seeds);
        shortlist
    }

    /// The lookup target.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Number of distinct contacts on the shortlist.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the shortlist is empty.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Whether the shortlist holds the given fingerprint.
    pub fn contains(&self, id: &Key) -> bool {
        self.candidates.iter().any(|c| c.contact.id == *id)
    }

    /// The nearest contact to the target, if any.
    pub fn closest(&self) -> Option<&Contact> {
        self.candidates.first().map(|c| &c.contact)
    }

    /// The distance of the nearest contact to the target, if any.
    pub fn closest_distance(&self) -> Option<Distance> {
        self.candidates.first().map(|c| c.distance)
    }

    /// The farthest contact from the target, if any.
    pub fn farthest(&self) -> Option<&Contact> {
        self.candidates.last().map(|c| &c.contact)
    }

    /// Insert contacts whose fingerprints are not yet present, keeping the
    /// list sorted. Returns the newly inserted subset.
    pub fn add(&mut self, contacts: impl IntoIterator<Item = Contact>) -> Vec<Contact> {
        let mut added = Vec::new();
        for contact in contacts {
            if self.contains(&contact.id) {
                continue;
            }
            let distance = contact.id.distance(&self.key);
            added.push(contact.clone());
            self.candidates.push(Candidate { contact, distance });
        }
        // Stable sort: ties keep the first-seen contact in front.
        self.candidates.sort_by_key(|c| c.distance);
        added
    }

    /// Mark a fingerprint as contacted.
    pub fn mark_contacted(&mut self, id: &Key) {
        self.contacted.insert(*id);
    }

    /// Mark a fingerprint as having answered; this implies contacted.
    pub fn mark_responded(&mut self, id: &Key) {
        self.contacted.insert(*id);
        self.active.insert(*id);
    }

    /// Whether a fingerprint has been contacted.
    pub fn was_contacted(&self, id: &Key) -> bool {
        self.contacted.contains(id)
    }

    /// Whether a fingerprint is active.
    pub fn is_active(&self, id: &Key) -> bool {
        self.active.contains(id)
    }

    /// Active contacts in distance order.
    pub fn active(&self) -> Vec<Contact> {
        self.candidates
            .iter()
            .filter(|c| self.active.contains(&c.contact.id))
            .map(|c| c.contact.clone())
            .collect()
    }

    /// Number of active contacts.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Contacts not yet contacted, in distance order.
    pub fn uncontacted(&self) -> Vec<Contact> {
        self.candidates
            .iter()
            .filter(|c| !self.contacted.contains(&c.contact.id))
            .map(|c| c.contact.clone())
            .collect()
    }

    /// Draw the next wave: up to `count` uncontacted contacts in distance
    /// order, marking each as contacted.
    pub fn take_uncontacted(&mut self, count: usize) -> Vec<Contact> {
        let wave: Vec<Contact> = self
            .candidates
            .iter()
            .filter(|c| !self.contacted.contains(&c.contact.id))
            .take(count)
            .map(|c| c.contact.clone())
            .collect();
        for contact in &wave {
            self.contacted.insert(contact.id);
        }
        wave
    }
}
