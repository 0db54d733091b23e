//! Scripted in-memory collaborators for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;

use super::error::SyncError;
use super::rest::{SnapshotSource, StatusSource};
use super::types::{SentimentCounts, Snapshot, StatusReport};
use super::websocket::{FrameStream, PushTransport};

/// Outcome of one push connect attempt
#[derive(Debug, Clone)]
pub enum PushScript {
    /// Handshake fails
    Refuse,
    /// Handshake succeeds, frames are delivered, then the server closes
    Frames(Vec<String>),
    /// Handshake succeeds, frames are delivered, then the channel stays open
    Hold(Vec<String>),
    /// Handshake succeeds, then the socket errors
    Error,
}

/// Push transport replaying a script; refuses once the script runs out
#[derive(Debug)]
pub struct ScriptedPush {
    script: Mutex<VecDeque<PushScript>>,
    attempts: AtomicUsize,
}

impl ScriptedPush {
    pub fn new(script: Vec<PushScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for ScriptedPush {
    async fn connect(&self) -> Result<FrameStream, SyncError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();

        match next.unwrap_or(PushScript::Refuse) {
            PushScript::Refuse => Err(SyncError::Handshake("connection refused".to_string())),
            PushScript::Frames(frames) => Ok(stream::iter(frames.into_iter().map(Ok)).boxed()),
            PushScript::Hold(frames) => Ok(stream::iter(frames.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            PushScript::Error => Ok(stream::iter(vec![Err(SyncError::Socket(
                "connection reset by peer".to_string(),
            ))])
            .boxed()),
        }
    }

    fn describe(&self) -> String {
        "scripted://push".to_string()
    }
}

/// Snapshot source replaying canned results; fails once they run out
#[derive(Debug)]
pub struct ScriptedSnapshots {
    responses: Mutex<VecDeque<Snapshot>>,
    calls: AtomicUsize,
}

impl ScriptedSnapshots {
    pub fn new(responses: Vec<Snapshot>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSnapshots {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SyncError::fetch("scripted://snapshot", "503 Service Unavailable"))
    }
}

/// Status source replaying canned results per call; `None` entries fail
#[derive(Debug)]
pub struct ScriptedStatus {
    reports: Mutex<VecDeque<Option<StatusReport>>>,
    sentiment: Mutex<VecDeque<Option<SentimentCounts>>>,
    calls: AtomicUsize,
}

impl ScriptedStatus {
    pub fn new(
        reports: Vec<Option<StatusReport>>,
        sentiment: Vec<Option<SentimentCounts>>,
    ) -> Self {
        Self {
            reports: Mutex::new(reports.into()),
            sentiment: Mutex::new(sentiment.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for ScriptedStatus {
    async fn fetch_status(&self) -> Result<StatusReport, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reports
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .ok_or_else(|| SyncError::fetch("scripted://status", "timed out"))
    }

    fn sentiment_feeds(&self) -> Vec<String> {
        vec!["market".to_string()]
    }

    async fn fetch_sentiment(&self, _feed: &str) -> Result<SentimentCounts, SyncError> {
        self.sentiment
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .ok_or_else(|| SyncError::fetch("scripted://sentiment", "timed out"))
    }
}

/// JSON snapshot frame with one `price` per symbol
pub fn snapshot_json(exchange: &str, prices: &[(&str, f64)]) -> String {
    let metrics: Vec<_> = prices
        .iter()
        .map(|(symbol, price)| json!({ "symbol": symbol, "price": price }))
        .collect();

    json!({ "exchange": exchange, "ts": 1_700_000_000_000i64, "metrics": metrics }).to_string()
}
