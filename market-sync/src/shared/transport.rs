//! Connection state machine for the market feed
//!
//! ```text
//! Idle -> Connecting -> Connected -> Disconnected -> (backoff) -> Connecting
//!                   \-> Disconnected               \-> Polling (terminal)
//! ```
//!
//! A successful handshake resets the attempt and failure counters. Once the
//! failure counter reaches the threshold the push channel is abandoned for
//! the rest of the session and full snapshots are fetched on an interval.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use super::backoff::Backoff;
use super::config::SyncConfig;
use super::rest::SnapshotSource;
use super::scheduler::Timers;
use super::types::{ConnectionState, ControlFrame, FeedFrame, FeedHealth, FeedSource, Snapshot};
use super::websocket::{FrameStream, PushTransport};

/// Raw snapshot handed to the ingestion task
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// Push frame: inspected, then coalesced and upserted
    Push(Snapshot),
    /// Poll result: inspected, then replaces the whole store
    Poll(Snapshot),
}

/// Why a push session ended
enum SessionEnd {
    Reconnect,
    Stop,
}

pub struct TransportManager {
    config: SyncConfig,
    push: Arc<dyn PushTransport>,
    snapshots: Arc<dyn SnapshotSource>,
    timers: Timers,
    ingest_tx: mpsc::Sender<Ingest>,
    health_tx: watch::Sender<FeedHealth>,
    backoff: Backoff,
    health: FeedHealth,
}

impl TransportManager {
    pub fn new(
        config: SyncConfig,
        push: Arc<dyn PushTransport>,
        snapshots: Arc<dyn SnapshotSource>,
        timers: Timers,
        ingest_tx: mpsc::Sender<Ingest>,
        health_tx: watch::Sender<FeedHealth>,
    ) -> Self {
        let backoff = Backoff::new(config.backoff.clone());
        Self {
            config,
            push,
            snapshots,
            timers,
            ingest_tx,
            health_tx,
            backoff,
            health: FeedHealth::default(),
        }
    }

    /// Drive the state machine until teardown
    pub async fn run(mut self) {
        info!("Starting market feed transport for {}", self.push.describe());

        while !self.timers.is_cancelled() {
            self.transition(ConnectionState::Connecting);

            let connect = tokio::select! {
                biased;
                _ = self.timers.cancelled() => break,
                result = self.push.connect() => result,
            };

            match connect {
                Ok(frames) => {
                    info!("Connected to market feed at {}", self.push.describe());
                    self.backoff.reset();
                    self.health.attempt = 0;
                    self.health.failures = 0;
                    self.transition(ConnectionState::Connected);

                    if let SessionEnd::Stop = self.consume(frames).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt = self.health.attempt, "push handshake failed");
                }
            }

            self.health.failures += 1;
            self.transition(ConnectionState::Disconnected);

            if self.health.failures >= self.config.failure_threshold {
                warn!(
                    failures = self.health.failures,
                    "push feed unavailable, falling back to polling for this session"
                );
                self.run_polling().await;
                break;
            }

            let delay = self.backoff.next_delay();
            self.health.attempt = self.backoff.attempt();
            self.publish();
            debug!("Waiting {:?} before reconnecting...", delay);

            if !self.timers.sleep(delay).await {
                break;
            }
        }

        debug!(state = %self.health.state, "market feed transport stopped");
    }

    /// Read frames until the channel closes, errors, or the session is torn down
    async fn consume(&mut self, mut frames: FrameStream) -> SessionEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.timers.cancelled() => return SessionEnd::Stop,
                next = frames.next() => next,
            };

            let text = match next {
                Some(Ok(text)) => text,
                Some(Err(e)) if e.is_connection_fatal() => {
                    warn!(error = %e, "push channel errored");
                    return SessionEnd::Reconnect;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "dropping unreadable frame");
                    continue;
                }
                None => {
                    warn!("push channel closed");
                    return SessionEnd::Reconnect;
                }
            };

            match FeedFrame::decode(&text) {
                Ok(FeedFrame::Control(ControlFrame::Ping)) => {
                    trace!("keep-alive");
                }
                Ok(FeedFrame::Snapshot(snapshot)) => {
                    if self.ingest_tx.send(Ingest::Push(snapshot)).await.is_err() {
                        warn!("Ingest receiver dropped, stopping transport");
                        return SessionEnd::Stop;
                    }
                }
                Err(e) => {
                    // Don't spam logs for every unparseable message
                    debug!(
                        "Failed to parse frame: {} - {}",
                        e,
                        text.chars().take(100).collect::<String>()
                    );
                }
            }
        }
    }

    /// Terminal poll mode: fetch now, then every `poll_interval`
    async fn run_polling(&mut self) {
        self.health.source = FeedSource::Poll;
        self.transition(ConnectionState::Polling);

        let mut ticker = self.timers.interval(self.config.poll_interval);
        loop {
            let fetched = tokio::select! {
                biased;
                _ = self.timers.cancelled() => return,
                result = self.snapshots.fetch_snapshot() => result,
            };

            match fetched {
                Ok(snapshot) => {
                    if self.ingest_tx.send(Ingest::Poll(snapshot)).await.is_err() {
                        warn!("Ingest receiver dropped, stopping poll loop");
                        return;
                    }
                }
                Err(e) => debug!(error = %e, "snapshot poll failed, keeping last known state"),
            }

            if !ticker.tick().await {
                return;
            }
        }
    }

    fn transition(&mut self, state: ConnectionState) {
        if self.health.state != state {
            debug!(from = %self.health.state, to = %state, "feed state transition");
        }
        self.health.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.health_tx.send_replace(self.health);
    }
}
