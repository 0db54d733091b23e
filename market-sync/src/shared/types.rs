/// Core data types for the market snapshot feed
///
/// These types match the JSON message format of the push feed and the
/// pull endpoints (same payload shape for both).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::SyncError;

/// Composite `exchange:symbol` key identifying a [`MetricRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Deserialize, Serialize)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(exchange: &str, symbol: &str) -> Self {
        Self(format!("{exchange}:{symbol}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Latest metrics for one symbol on one exchange
///
/// Only `symbol` is required. Every other field of the wire object (prices,
/// percentage changes, open-interest deltas, cross/reversal flags, ...) lands
/// in `fields` untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetricRecord {
    /// Exchange name, filled from the enclosing snapshot when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    /// Instrument symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Record timestamp in epoch milliseconds
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_opt_epoch_ms"
    )]
    pub ts: Option<i64>,
    /// Open set of numeric / boolean / text signal fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MetricRecord {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: Some(exchange.into()),
            symbol: symbol.into(),
            ts: None,
            fields: Map::new(),
        }
    }

    /// Set a signal field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Store key, falling back to `default_exchange` when the record has none
    pub fn key(&self, default_exchange: &str) -> RecordKey {
        RecordKey::new(self.exchange.as_deref().unwrap_or(default_exchange), &self.symbol)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    /// `true` only for a literal JSON `true`
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.fields.get(name), Some(Value::Bool(true)))
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Last traded price, whichever of the known price fields is present
    pub fn last_price(&self) -> Option<f64> {
        self.number("last_price")
            .or_else(|| self.number("price"))
            .or_else(|| self.number("last"))
    }
}

/// Full-universe metric snapshot for one source
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    /// Epoch milliseconds, 0 when missing or null
    #[serde(default, deserialize_with = "de_epoch_ms")]
    pub ts: i64,
    pub metrics: Vec<MetricRecord>,
}

impl Snapshot {
    /// Give every record an exchange: its own, else the snapshot's, else `default_exchange`
    pub fn normalised(mut self, default_exchange: &str) -> Self {
        let exchange = self
            .exchange
            .clone()
            .unwrap_or_else(|| default_exchange.to_string());

        for record in self.metrics.iter_mut().filter(|r| r.exchange.is_none()) {
            record.exchange = Some(exchange.clone());
        }
        self
    }
}

/// Values below this are epoch seconds rather than milliseconds (year 5138 in seconds)
const EPOCH_SECONDS_LIMIT: f64 = 1e11;

/// Deserialize a JSON number (integer or float, seconds or milliseconds) as
/// optional epoch milliseconds.
fn de_opt_epoch_ms<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(raw) if !raw.is_finite() => Err(serde::de::Error::custom("invalid timestamp")),
        Some(raw) if raw.abs() < EPOCH_SECONDS_LIMIT => Ok(Some((raw * 1000.0).round() as i64)),
        Some(raw) => Ok(Some(raw.round() as i64)),
    }
}

/// Deserialize epoch milliseconds, treating `null` as 0
fn de_epoch_ms<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    de_opt_epoch_ms(deserializer).map(Option::unwrap_or_default)
}

/// Keep-alive and other control frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Ping,
}

/// Inbound push frame, decoded once at the socket boundary
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FeedFrame {
    Control(ControlFrame),
    Snapshot(Snapshot),
}

impl FeedFrame {
    pub fn decode(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(SyncError::from)
    }
}

/// Trade direction of a signal
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Convert to display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the alert log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEntry {
    pub ts: DateTime<Utc>,
    pub text: String,
}

/// Internal connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    /// Push abandoned for the rest of the session
    Polling,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Polling => write!(f, "POLLING"),
        }
    }
}

/// Connectivity indicator shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl FeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedStatus::Connecting => "connecting",
            FeedStatus::Connected => "connected",
            FeedStatus::Disconnected => "disconnected",
        }
    }
}

impl From<ConnectionState> for FeedStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connecting => FeedStatus::Connecting,
            // Polling success is assumed
            ConnectionState::Connected | ConnectionState::Polling => FeedStatus::Connected,
            ConnectionState::Idle | ConnectionState::Disconnected => FeedStatus::Disconnected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    #[default]
    Push,
    Poll,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedSource::Push => "push",
            FeedSource::Poll => "poll",
        }
    }
}

/// Read-only view of the transport published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedHealth {
    pub state: ConnectionState,
    pub source: FeedSource,
    /// Retry attempt counter (reset on successful handshake)
    pub attempt: u32,
    /// Consecutive transport failures (reset on successful handshake)
    pub failures: u32,
}

impl FeedHealth {
    pub fn status(&self) -> FeedStatus {
        self.state.into()
    }
}

/// Published contents of the snapshot store
#[derive(Debug, Clone, Default)]
pub struct MarketView {
    pub records: Vec<MetricRecord>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Incremented on every store mutation
    pub revision: u64,
}

impl MarketView {
    /// Look up a published record by `exchange:symbol`
    pub fn get(&self, key: &RecordKey) -> Option<&MetricRecord> {
        self.records.iter().find(|record| {
            record
                .exchange
                .as_deref()
                .is_some_and(|exchange| RecordKey::new(exchange, &record.symbol) == *key)
        })
    }
}

/// Per-exchange staleness counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ExchangeStaleness {
    #[serde(default)]
    pub stale: u64,
    #[serde(default)]
    pub total: u64,
}

/// Auxiliary feed status report
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct StatusReport {
    #[serde(default, deserialize_with = "de_epoch_ms")]
    pub ts: i64,
    #[serde(default)]
    pub exchanges: BTreeMap<String, ExchangeStaleness>,
}

/// Aggregate buy/sell bias counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct SentimentCounts {
    #[serde(default)]
    pub buy: u64,
    #[serde(default)]
    pub sell: u64,
    #[serde(default)]
    pub neutral: u64,
}

impl SentimentCounts {
    /// Net bias in [-1, 1] (positive = buy heavy), None without directional counts
    pub fn bias(&self) -> Option<f64> {
        let directional = self.buy + self.sell;
        if directional == 0 {
            return None;
        }
        Some((self.buy as f64 - self.sell as f64) / directional as f64)
    }
}

/// Last good auxiliary data
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuxSnapshot {
    pub status: Option<StatusReport>,
    pub sentiment: BTreeMap<String, SentimentCounts>,
    pub last_success: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ping() {
        let frame = FeedFrame::decode(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(frame, FeedFrame::Control(ControlFrame::Ping));
    }

    #[test]
    fn test_decode_snapshot() {
        let text = r#"{
            "exchange": "binance",
            "ts": 1700000000000,
            "metrics": [
                {"symbol": "BTCUSDT", "price": 64250.5, "chg_1h": -0.4, "bull_cross": true},
                {"exchange": "bybit", "symbol": "ETHUSDT", "ts": 1700000000100}
            ]
        }"#;

        let FeedFrame::Snapshot(snapshot) = FeedFrame::decode(text).unwrap() else {
            panic!("expected snapshot frame");
        };

        assert_eq!(snapshot.exchange.as_deref(), Some("binance"));
        assert_eq!(snapshot.ts, 1_700_000_000_000);
        assert_eq!(snapshot.metrics.len(), 2);

        let btc = &snapshot.metrics[0];
        assert_eq!(btc.exchange, None);
        assert_eq!(btc.last_price(), Some(64250.5));
        assert_eq!(btc.number("chg_1h"), Some(-0.4));
        assert!(btc.flag("bull_cross"));
        assert!(!btc.flag("bear_cross"));

        let eth = &snapshot.metrics[1];
        assert_eq!(eth.exchange.as_deref(), Some("bybit"));
        assert_eq!(eth.ts, Some(1_700_000_000_100));
        assert!(eth.fields.is_empty());
    }

    #[test]
    fn test_snapshot_with_type_tag_is_not_control() {
        let text = r#"{"type":"snapshot","exchange":"okx","ts":1,"metrics":[]}"#;
        assert!(matches!(
            FeedFrame::decode(text),
            Ok(FeedFrame::Snapshot(_))
        ));
    }

    #[test]
    fn test_decode_malformed() {
        for text in ["not json", r#"{"type":"welcome"}"#, r#"{"exchange":"okx","ts":1}"#, "[]"] {
            let err = FeedFrame::decode(text).unwrap_err();
            assert!(matches!(err, SyncError::Frame(_)), "{text} -> {err:?}");
        }
    }

    #[test]
    fn test_decode_timestamps() {
        struct TestCase {
            ts: &'static str,
            expected: i64,
        }

        let tests = vec![
            TestCase {
                // TC0: integer milliseconds
                ts: "1700000000123",
                expected: 1_700_000_000_123,
            },
            TestCase {
                // TC1: fractional milliseconds
                ts: "1700000000123.5",
                expected: 1_700_000_000_124,
            },
            TestCase {
                // TC2: fractional seconds
                ts: "1700000000.123",
                expected: 1_700_000_000_123,
            },
            TestCase {
                // TC3: integer seconds
                ts: "1700000000",
                expected: 1_700_000_000_000,
            },
            TestCase {
                // TC4: null
                ts: "null",
                expected: 0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let text = format!(
                r#"{{"exchange":"binance","ts":{ts},"metrics":[{{"symbol":"BTCUSDT","ts":{ts},"price":1.0}}]}}"#,
                ts = test.ts
            );
            let FeedFrame::Snapshot(snapshot) = FeedFrame::decode(&text).unwrap() else {
                panic!("TC{index} expected snapshot frame");
            };

            assert_eq!(snapshot.ts, test.expected, "TC{index} snapshot ts");
            let record_ts = (test.ts != "null").then_some(test.expected);
            assert_eq!(snapshot.metrics[0].ts, record_ts, "TC{index} record ts");
            assert_eq!(snapshot.metrics[0].last_price(), Some(1.0), "TC{index} price");
            assert!(!snapshot.metrics[0].fields.contains_key("ts"), "TC{index} ts not in fields");
        }
    }

    #[test]
    fn test_market_view_get() {
        let view = MarketView {
            records: vec![
                MetricRecord::new("binance", "BTCUSDT").with_field("price", 1.0),
                MetricRecord::new("okx", "BTCUSDT").with_field("price", 2.0),
            ],
            last_updated: None,
            revision: 1,
        };

        let okx = view.get(&RecordKey::new("okx", "BTCUSDT")).unwrap();
        assert_eq!(okx.last_price(), Some(2.0));
        assert!(view.get(&RecordKey::new("bybit", "BTCUSDT")).is_none());
    }

    #[test]
    fn test_normalised_fills_missing_exchange() {
        let snapshot = Snapshot {
            exchange: None,
            ts: 0,
            metrics: vec![
                MetricRecord {
                    exchange: None,
                    symbol: "SOLUSDT".to_string(),
                    ts: None,
                    fields: Map::new(),
                },
                MetricRecord::new("okx", "SOLUSDT"),
            ],
        }
        .normalised("binance");

        assert_eq!(snapshot.metrics[0].key("x").as_str(), "binance:SOLUSDT");
        assert_eq!(snapshot.metrics[1].key("x").as_str(), "okx:SOLUSDT");
    }

    #[test]
    fn test_record_key_default_exchange() {
        let mut record = MetricRecord::new("okx", "BTCUSDT");
        assert_eq!(record.key("binance").to_string(), "okx:BTCUSDT");

        record.exchange = None;
        assert_eq!(record.key("binance").to_string(), "binance:BTCUSDT");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(FeedStatus::from(ConnectionState::Connecting), FeedStatus::Connecting);
        assert_eq!(FeedStatus::from(ConnectionState::Connected), FeedStatus::Connected);
        assert_eq!(FeedStatus::from(ConnectionState::Polling), FeedStatus::Connected);
        assert_eq!(FeedStatus::from(ConnectionState::Disconnected), FeedStatus::Disconnected);
        assert_eq!(FeedStatus::from(ConnectionState::Idle), FeedStatus::Disconnected);
    }

    #[test]
    fn test_sentiment_bias() {
        let counts = SentimentCounts { buy: 30, sell: 10, neutral: 5 };
        assert!((counts.bias().unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(SentimentCounts::default().bias(), None);
    }
}
