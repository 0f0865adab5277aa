//! # sepia-dht
//!
//! Protocol core of a Kademlia distributed hash table.
//!
//! This crate implements:
//! - XOR-metric key arithmetic over a 160-bit identifier space
//! - A routing table of 160 capacity-K buckets with LRU head-probe eviction
//! - The iterative lookup state machine (ALPHA-parallel waves over a
//!   distance-sorted shortlist)
//! - The four RPC request handlers (PING, STORE, FIND_NODE, FIND_VALUE)
//! - Background replication, expiration and bucket-refresh loops with
//!   convoy-jittered timers
//!
//! Wire transport, serialization and persistent value storage are external
//! collaborators, reached through the [`outbox::Outbox`] and
//! [`storage::StorageAdapter`] capabilities.
//!
//! ## Key Parameters
//!
//! | Parameter | Value |
//! |---|---|
//! | B (identifier bits / buckets) | 160 |
//! | K (bucket and result size) | 20 |
//! | alpha (lookup parallelism) | 3 |
//! | Refresh interval | 1 hour |
//! | Replication interval | 1 hour |
//! | Republish interval | 24 hours |
//! | Expiration interval | 24 hours |
//! | Head-probe cache | 10 minutes |
//! | Timer jitter bound | 30 minutes |

pub mod bucket;
pub mod contact;
pub mod events;
pub mod key;
pub mod maintenance;
pub mod node;
pub mod outbox;
pub mod protocol;
pub mod routing;
pub mod shortlist;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

/// Width of the identifier space in bits.
pub const KEY_BITS: usize = 160;

/// Width of a key in bytes.
pub const KEY_BYTES: usize = KEY_BITS / 8;

/// Bucket capacity and lookup result size.
pub const K: usize = 20;

/// Lookup parallelism factor.
pub const ALPHA: usize = 3;

/// Number of buckets in the routing table (one per bit of the key space).
pub const NUM_BUCKETS: usize = KEY_BITS;

/// Bucket refresh interval in milliseconds (1 hour).
pub const REFRESH_INTERVAL_MS: u64 = 3_600_000;

/// Replication pass interval in milliseconds (1 hour).
pub const REPLICATE_INTERVAL_MS: u64 = 3_600_000;

/// Republish interval for locally published items in milliseconds (24 hours).
pub const REPUBLISH_INTERVAL_MS: u64 = 86_400_000;

/// Item expiration age in milliseconds (24 hours).
pub const EXPIRE_INTERVAL_MS: u64 = 86_400_000;

/// How long a successful head probe exempts a bucket head from re-probing
/// (10 minutes).
pub const HEAD_PROBE_TTL_MS: u64 = 600_000;

/// Upper bound of the uniform random delay added to each timer firing
/// (30 minutes).
pub const MAX_TIMER_JITTER_MS: u64 = 1_800_000;

/// Consecutive refresh lookups that discover no new fingerprint before a
/// refresh pass stops early.
pub const MAX_UNIMPROVED_REFRESHES: usize = 4;

/// Error types for DHT operations.
#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    /// The key is not a valid 160-bit hex value.
    #[error("invalid key: {0:?} is not a 160-bit hex value")]
    InvalidKey(String),

    /// A STORE key does not equal the content hash of its blob.
    #[error("key hash mismatch: key {key} does not match content hash {expected}")]
    KeyHashMismatch {
        /// The key the request carried.
        key: String,
        /// The hash the blob actually has.
        expected: String,
    },

    /// An outbound RPC failed or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// An iterative store confirmed zero targets.
    #[error("no storage targets confirmed the store")]
    NoStorageTargets,

    /// The join lookup failed.
    #[error("join failed: {0}")]
    JoinFailed(String),

    /// The storage collaborator reported a failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The node configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type for DHT operations.
pub type Result<T> = std::result::Result<T, DhtError>;
