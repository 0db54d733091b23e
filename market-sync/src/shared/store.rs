//! Keyed last-write-wins snapshot store
//!
//! Incoming records are applied unconditionally: a delayed frame carrying an
//! older `ts` still replaces a newer record for the same key.

use std::collections::HashMap;

use super::types::{MetricRecord, RecordKey};

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    default_exchange: String,
    records: HashMap<RecordKey, MetricRecord>,
}

impl SnapshotStore {
    pub fn new(default_exchange: impl Into<String>) -> Self {
        Self {
            default_exchange: default_exchange.into(),
            records: HashMap::new(),
        }
    }

    /// Insert or overwrite the record under its `exchange:symbol` key
    pub fn upsert(&mut self, record: MetricRecord) {
        let key = record.key(&self.default_exchange);
        self.records.insert(key, record);
    }

    /// Drop everything and rebuild from `records`
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = MetricRecord>) {
        self.records.clear();
        for record in records {
            self.upsert(record);
        }
    }

    /// Current records, unordered
    pub fn values(&self) -> impl Iterator<Item = &MetricRecord> {
        self.records.values()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&MetricRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
