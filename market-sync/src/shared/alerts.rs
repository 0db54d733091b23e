//! Signal alert detector
//!
//! Scans every raw snapshot (before coalescing) for the fixed set of boolean
//! signal flags and keeps a capped, newest-first log of alert lines. A flag
//! that stays true re-alerts on every snapshot.

use std::collections::VecDeque;

use chrono::Utc;

use super::types::{AlertEntry, MetricRecord, Side, Snapshot};

/// Optional source timeframe tag, e.g. "15m"
const TIMEFRAME_FIELD: &str = "signal_tf";
/// Optional free-text reason
const REASON_FIELD: &str = "signal_reason";

/// A boolean field that raises an alert when true
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalFlag {
    pub field: &'static str,
    pub side: Side,
    pub label: &'static str,
}

pub const SIGNAL_FLAGS: &[SignalFlag] = &[
    SignalFlag {
        field: "bull_cross",
        side: Side::Buy,
        label: "bullish cross",
    },
    SignalFlag {
        field: "bear_cross",
        side: Side::Sell,
        label: "bearish cross",
    },
    SignalFlag {
        field: "oversold_reversal",
        side: Side::Buy,
        label: "oversold reversal",
    },
    SignalFlag {
        field: "overbought_reversal",
        side: Side::Sell,
        label: "overbought reversal",
    },
];

#[derive(Debug, Clone)]
pub struct AlertDetector {
    capacity: usize,
    default_exchange: String,
    entries: VecDeque<AlertEntry>,
}

impl AlertDetector {
    pub fn new(capacity: usize, default_exchange: impl Into<String>) -> Self {
        Self {
            capacity,
            default_exchange: default_exchange.into(),
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append alerts for every raised flag in `snapshot`, returning how many were added
    pub fn inspect(&mut self, snapshot: &Snapshot) -> usize {
        let exchange = snapshot
            .exchange
            .as_deref()
            .unwrap_or(&self.default_exchange);

        let batch: Vec<AlertEntry> = snapshot
            .metrics
            .iter()
            .flat_map(|record| {
                SIGNAL_FLAGS
                    .iter()
                    .filter(move |flag| record.flag(flag.field))
                    .map(move |flag| AlertEntry {
                        ts: Utc::now(),
                        text: format_alert(flag, record, exchange),
                    })
            })
            .collect();

        let added = batch.len();
        // Batch keeps snapshot order at the head of the log
        for entry in batch.into_iter().rev() {
            self.entries.push_front(entry);
        }
        self.entries.truncate(self.capacity);
        added
    }

    /// Newest first
    pub fn entries(&self) -> impl Iterator<Item = &AlertEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<AlertEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `SIDE [tf] exchange symbol @ price label | reason`
fn format_alert(flag: &SignalFlag, record: &MetricRecord, snapshot_exchange: &str) -> String {
    let exchange = record.exchange.as_deref().unwrap_or(snapshot_exchange);
    let price = record
        .last_price()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut text = flag.side.to_string();
    if let Some(tf) = record.text(TIMEFRAME_FIELD) {
        text.push_str(&format!(" [{tf}]"));
    }
    text.push_str(&format!(" {exchange} {} @ {price} {}", record.symbol, flag.label));
    if let Some(reason) = record.text(REASON_FIELD) {
        text.push_str(&format!(" | {reason}"));
    }
    text
}
