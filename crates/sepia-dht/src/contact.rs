//! Contacts: a transport address bound to a 160-bit fingerprint.
//!
//! The address is opaque to the protocol core. Whatever the transport uses
//! to reach a peer (socket address, URL, onion endpoint) is carried through
//! unchanged and handed back out when the core issues an RPC toward that
//! peer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// An opaque transport endpoint.
///
/// The core never interprets the contents; it only requires that addresses
/// round-trip through serialization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex_bytes")] Vec<u8>);

impl Address {
    /// Create an address from raw transport bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Return the raw transport bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Address({s})"),
            Err(_) => write!(f, "Address(0x{})", hex::encode(&self.0)),
        }
    }
}

/// A peer known to the routing layer: an address and its fingerprint.
///
/// The fingerprint is stable for the lifetime of the contact; the address
/// may be updated in place when the transport learns a new endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// The peer's 160-bit fingerprint.
    pub id: Key,
    /// The peer's transport endpoint.
    pub address: Address,
}

impl Contact {
    /// Create a contact from a fingerprint and an address.
    pub fn new(id: Key, address: Address) -> Self {
        Self { id, address }
    }

    /// Replace the transport endpoint, keeping the fingerprint.
    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }
}

/// Serde support for opaque address bytes as a hex string.
pub(crate) mod hex_bytes {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
