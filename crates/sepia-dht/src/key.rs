//! 160-bit keys and the XOR distance metric.
//!
//! A [`Key`] identifies both nodes (fingerprints) and stored values (content
//! hashes). Distance between two keys is their bitwise XOR interpreted as a
//! big-endian 160-bit integer; the bucket index of a key is the number of
//! leading zero bits of its distance from the local key, so index 0 is the
//! farthest bucket and index 159 the nearest.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{DhtError, Result, KEY_BITS, KEY_BYTES};

/// A 160-bit identifier. Canonical text form is 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key([u8; KEY_BYTES]);

impl Key {
    /// Create a key from its raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its 40-character hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != KEY_BYTES * 2 {
            return Err(DhtError::InvalidKey(s.to_string()));
        }
        let raw = hex::decode(s).map_err(|_| DhtError::InvalidKey(s.to_string()))?;
        let mut bytes = [0u8; KEY_BYTES];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }

    /// Return the canonical lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Compute the XOR distance to another key.
    pub fn distance(&self, other: &Key) -> Distance {
        let mut out = [0u8; KEY_BYTES];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    /// Generate a uniformly random key.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        rand::thread_rng().fill(&mut bytes[..]);
        Self(bytes)
    }

    /// Generate a random key whose distance from `local` falls in bucket
    /// `index`: the first `index` bits match `local`, bit `index` differs,
    /// and every bit below is random.
    ///
    /// `index` must be below [`KEY_BITS`].
    pub fn random_in_bucket(local: &Key, index: usize) -> Self {
        debug_assert!(index < KEY_BITS);
        let mut rng = rand::thread_rng();
        let mut bytes = local.0;

        let byte = index / 8;
        let bit = 7 - (index % 8);

        // Flip the differing bit, then randomize everything below it.
        let flipped = bytes[byte] ^ (1 << bit);
        let low_mask = (1u8 << bit) - 1;
        let r: u8 = rng.gen();
        bytes[byte] = (flipped & !low_mask) | (r & low_mask);
        for b in bytes.iter_mut().skip(byte + 1) {
            *b = rng.gen();
        }

        Self(bytes)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.to_hex())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Key::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// The XOR distance between two keys, ordered lexicographically (big-endian).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance([u8; KEY_BYTES]);

impl Distance {
    /// Whether this is the zero distance (the two keys were equal).
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Number of leading zero bits, or `None` for the zero distance.
    pub fn leading_zeros(&self) -> Option<usize> {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return Some(i * 8 + byte.leading_zeros() as usize);
            }
        }
        None
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(self.0))
    }
}

/// Determine the bucket index for `key` relative to `local`.
///
/// The index is the number of leading zero bits of the XOR distance,
/// equivalently `B - 1 - floor(log2(distance))`. Returns `None` when the
/// keys are equal; such keys are never placed in a bucket.
pub fn bucket_index(local: &Key, key: &Key) -> Option<usize> {
    local.distance(key).leading_zeros()
}

/// Compute the 160-bit content hash of a blob: the first 20 bytes of its
/// BLAKE3 digest. STORE requests are only valid when their key equals the
/// content hash of the stored blob.
pub fn hash160(data: &[u8]) -> Key {
    let digest = blake3::hash(data);
    let mut bytes = [0u8; KEY_BYTES];
    bytes.copy_from_slice(&digest.as_bytes()[..KEY_BYTES]);
    Key(bytes)
}
