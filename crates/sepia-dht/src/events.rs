//! Observability events emitted by the node.
//!
//! Events are notifications only; no control flow depends on them. They are
//! delivered over the channel handed out at node construction, and dropped
//! silently once the receiver goes away.

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// Everything the node reports to the outside.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum Event {
    /// A contact entered the routing table or was touched in place.
    ContactAdded {
        /// The contact's fingerprint.
        id: Key,
    },
    /// A contact was evicted from the routing table.
    ContactDeleted {
        /// The contact's fingerprint.
        id: Key,
    },
    /// An inbound STORE was accepted and handed to storage.
    StoragePut {
        /// The stored key.
        key: Key,
    },
    /// An inbound FIND_VALUE consulted storage.
    StorageGet {
        /// The requested key.
        key: Key,
    },
}
