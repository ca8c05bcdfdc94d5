//! Snapshot reconciliation.
//!
//! [`reconcile`] is the pure reducer `(prior store, snapshot) -> new store`.
//! [`Reconciler`] wraps it for one topic, validating each snapshot first and
//! remembering the latest one for instantaneous projection.
//!
//! Rules:
//! - records are applied in snapshot order;
//! - a key seen for the first time gets a new series seeded with one sample;
//! - keys missing from a snapshot keep their series untouched, including by
//!   the age limit, which only trims series the snapshot appended to;
//! - a key repeated within one snapshot contributes one sample, carrying the
//!   fields of its last occurrence.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::snapshot::{Sample, Snapshot};
use crate::store::{HistoryStore, Retention};
use crate::topic::Topic;

/// What one reconciliation step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Series created for keys seen for the first time.
    pub created: usize,
    /// Samples appended to existing series.
    pub appended: usize,
    /// Records that repeated an earlier key in the same snapshot.
    pub duplicates: usize,
    /// Samples dropped by the age limit.
    pub expired: usize,
}

/// Merge `snapshot` into `stores` and return the updated stores.
pub fn reconcile(mut stores: HistoryStore, snapshot: &Snapshot) -> HistoryStore {
    apply_snapshot(&mut stores, snapshot);
    stores
}

fn apply_snapshot(stores: &mut HistoryStore, snapshot: &Snapshot) -> ReconcileStats {
    let mut stats = ReconcileStats::default();
    let mut seen = HashSet::with_capacity(snapshot.len());

    for record in &snapshot.entities {
        let sample = Sample::from_record(record, snapshot.arrival_unix_ms);
        if !seen.insert(&record.key) {
            stores.replace_latest(&record.key, sample);
            stats.duplicates += 1;
        } else if stores.record(&record.key, sample) {
            stats.created += 1;
        } else {
            stats.appended += 1;
        }
    }

    stats.expired = stores.prune_expired(seen, snapshot.arrival_unix_ms);
    stats
}

/// Owns the history store of one topic.
#[derive(Debug, Clone)]
pub struct Reconciler {
    topic: Topic,
    store: HistoryStore,
    latest: Option<Snapshot>,
    cycles: u64,
}

impl Reconciler {
    pub fn new(topic: Topic, retention: Retention) -> Self {
        Self {
            topic,
            store: HistoryStore::new(retention),
            latest: None,
            cycles: 0,
        }
    }

    /// Validate and merge one snapshot. A rejected snapshot leaves the store
    /// and the latest snapshot exactly as they were.
    pub fn apply(&mut self, snapshot: Snapshot) -> Result<ReconcileStats> {
        if snapshot.topic != self.topic {
            return Err(Error::MalformedSnapshot(format!(
                "expected topic {}, got {}",
                self.topic, snapshot.topic
            )));
        }
        snapshot.validate()?;

        let stats = apply_snapshot(&mut self.store, &snapshot);
        self.latest = Some(snapshot);
        self.cycles += 1;
        Ok(stats)
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Latest accepted snapshot, read directly by instantaneous projection.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    /// Number of snapshots reconciled so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
