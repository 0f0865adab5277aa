//! Integration test crate for the sepia DHT core.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end protocol flows: multi-node lookups over an
//! in-process loopback network, store/retrieve round trips through the
//! request handlers, and the maintenance loops.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p sepia-integration-tests
//! ```
