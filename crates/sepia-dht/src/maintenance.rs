//! Background maintenance: bucket refresh, replication, expiration and the
//! convoy-jittered timers that drive them.
//!
//! Maintenance never aborts the node. Every failure inside a pass is logged
//! and skipped; only a failure to even start a storage scan surfaces to the
//! timer loop, which logs it and re-arms.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::key::Key;
use crate::node::{now_ms, Node};
use crate::outbox::Outbox;
use crate::storage::{StorageAdapter, StoreValue};
use crate::{Result, NUM_BUCKETS};

/// What a refresh pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Number of bucket lookups performed.
    pub lookups: usize,
    /// Number of distinct new fingerprints discovered.
    pub discovered: usize,
    /// Whether the pass stopped early after too many unimproved lookups.
    pub stopped_early: bool,
}

/// What a replication pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplicateSummary {
    /// Number of items scanned.
    pub scanned: usize,
    /// Number of items pushed back onto the network.
    pub republished: usize,
}

/// What an expiration pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpireSummary {
    /// Number of items scanned.
    pub scanned: usize,
    /// Number of items deleted.
    pub expired: usize,
}

impl<O: Outbox, S: StorageAdapter> Node<O, S> {
    /// Refresh stale buckets at and above `start_index`.
    ///
    /// Bucket indices are visited in uniformly shuffled order. A bucket is
    /// stale when no lookup has touched it within the refresh interval;
    /// each stale bucket gets an [`Node::iterative_find_node`] on a random
    /// key in its distance range. The pass stops early once
    /// `max_unimproved_refreshes` consecutive lookups discover no new
    /// fingerprint.
    pub async fn refresh(&self, start_index: usize) -> RefreshSummary {
        let mut indices: Vec<usize> = (start_index..NUM_BUCKETS).collect();
        indices.shuffle(&mut rand::thread_rng());

        let interval = self.config.refresh_interval.as_millis() as u64;
        let mut seen: HashSet<Key> = HashSet::new();
        let mut unimproved = 0usize;
        let mut summary = RefreshSummary::default();

        for index in indices {
            let now = now_ms();
            let stale = self
                .last_bucket_lookup(index)
                .await
                .map_or(true, |at| now.saturating_sub(at) >= interval);
            if !stale {
                continue;
            }

            let target = Key::random_in_bucket(&self.local.id, index);
            let contacts = self.iterative_find_node(target).await;
            summary.lookups += 1;

            let mut improved = false;
            for contact in contacts {
                if seen.insert(contact.id) {
                    improved = true;
                    summary.discovered += 1;
                }
                self.update_contact(contact).await;
            }

            if improved {
                unimproved = 0;
            } else {
                unimproved += 1;
                if unimproved >= self.config.max_unimproved_refreshes {
                    debug!(
                        lookups = summary.lookups,
                        "refresh stopped early, no new contacts"
                    );
                    summary.stopped_early = true;
                    break;
                }
            }
        }

        summary
    }

    /// Stream every stored item and push the due ones back onto the
    /// network: locally published items past the republish age, foreign
    /// items past the replicate age.
    pub async fn replicate(&self) -> Result<ReplicateSummary> {
        let mut items = self.storage.scan().await?;
        let local = self.local.id;
        let republish_age = self.config.republish_interval.as_millis() as u64;
        let replicate_age = self.config.replicate_interval.as_millis() as u64;

        let mut summary = ReplicateSummary::default();
        while let Some((key, item)) = items.recv().await {
            summary.scanned += 1;

            let now = now_ms();
            let age_limit = if item.meta.publisher == local {
                republish_age
            } else {
                replicate_age
            };
            if item.meta.timestamp + age_limit > now {
                continue;
            }

            match self.iterative_store(key, StoreValue::Item(item)).await {
                Ok(count) => {
                    summary.republished += 1;
                    debug!(key = %key, count, "item replicated");
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "replication of item failed");
                }
            }
        }

        Ok(summary)
    }

    /// Stream every stored item and delete the ones past the expiration
    /// age.
    pub async fn expire(&self) -> Result<ExpireSummary> {
        let mut items = self.storage.scan().await?;
        let expire_age = self.config.expire_interval.as_millis() as u64;

        let mut summary = ExpireSummary::default();
        while let Some((key, item)) = items.recv().await {
            summary.scanned += 1;

            if item.meta.timestamp + expire_age > now_ms() {
                continue;
            }

            match self.storage.delete(&key).await {
                Ok(()) => {
                    summary.expired += 1;
                    debug!(key = %key, "expired item deleted");
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "expiring item failed");
                }
            }
        }

        Ok(summary)
    }
}

/// Handles to the background maintenance tasks. Dropping the handle aborts
/// both tasks.
pub struct MaintenanceHandle {
    refresh: JoinHandle<()>,
    replicate: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stop both maintenance tasks.
    pub fn abort(&self) {
        self.refresh.abort();
        self.replicate.abort();
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Start the periodic maintenance tasks: a refresh pass every refresh
/// interval and a replicate-then-expire pass every replicate interval.
///
/// Timers are edge-triggered: each firing re-arms with the base interval
/// plus a fresh uniform random delay, so synchronized nodes spread out
/// instead of convoying.
pub fn spawn_maintenance<O: Outbox, S: StorageAdapter>(node: &Arc<Node<O, S>>) -> MaintenanceHandle {
    let refresh_node = Arc::clone(node);
    let refresh = tokio::spawn(async move {
        loop {
            let delay = jittered_delay(
                refresh_node.config().refresh_interval,
                refresh_node.config().max_timer_jitter,
                rand::thread_rng().gen_range(0.0..1.0),
            );
            tokio::time::sleep(delay).await;

            let summary = refresh_node.refresh(0).await;
            info!(
                lookups = summary.lookups,
                discovered = summary.discovered,
                "refresh pass complete"
            );
        }
    });

    let replicate_node = Arc::clone(node);
    let replicate = tokio::spawn(async move {
        loop {
            let delay = jittered_delay(
                replicate_node.config().replicate_interval,
                replicate_node.config().max_timer_jitter,
                rand::thread_rng().gen_range(0.0..1.0),
            );
            tokio::time::sleep(delay).await;

            match replicate_node.replicate().await {
                Ok(summary) => info!(
                    scanned = summary.scanned,
                    republished = summary.republished,
                    "replication pass complete"
                ),
                Err(err) => warn!(error = %err, "replication pass failed"),
            }
            match replicate_node.expire().await {
                Ok(summary) => info!(
                    scanned = summary.scanned,
                    expired = summary.expired,
                    "expiration pass complete"
                ),
                Err(err) => warn!(error = %err, "expiration pass failed"),
            }
        }
    });

    MaintenanceHandle { refresh, replicate }
}

/// Compute a jittered timer delay: `base + uniform * max_jitter`, given a
/// uniform random value in `[0.0, 1.0)`.
pub fn jittered_delay(base: Duration, max_jitter: Duration, uniform: f64) -> Duration {
    let u = uniform.clamp(0.0, 1.0);
    base + Duration::from_millis((max_jitter.as_millis() as f64 * u) as u64)
}
