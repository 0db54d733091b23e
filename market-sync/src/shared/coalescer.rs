//! Single-slot update coalescer
//!
//! Only the newest raw snapshot survives until the next flush; anything it
//! replaced is never applied to the store.

use chrono::{DateTime, Utc};

use super::store::SnapshotStore;
use super::types::Snapshot;

#[derive(Debug, Default)]
pub struct UpdateCoalescer {
    pending: Option<Snapshot>,
    last_updated: Option<DateTime<Utc>>,
    /// Snapshots overwritten before they could be flushed
    discarded: u64,
}

impl UpdateCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a snapshot for the next flush, returning true if it displaced one
    pub fn offer(&mut self, snapshot: Snapshot) -> bool {
        let displaced = self.pending.replace(snapshot).is_some();
        if displaced {
            self.discarded += 1;
        }
        displaced
    }

    /// Upsert the pending snapshot into `store`, returning false when idle
    pub fn flush(&mut self, store: &mut SnapshotStore) -> bool {
        let Some(snapshot) = self.pending.take() else {
            return false;
        };

        for record in snapshot.metrics {
            store.upsert(record);
        }
        self.last_updated = Some(Utc::now());
        true
    }

    /// Wholesale replace of the store, bypassing the pending slot
    pub fn replace(&mut self, store: &mut SnapshotStore, snapshot: Snapshot) {
        if self.pending.take().is_some() {
            self.discarded += 1;
        }
        store.replace_all(snapshot.metrics);
        self.last_updated = Some(Utc::now());
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
