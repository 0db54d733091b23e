//! Session facade: mount wires transport, ingestion and status polling
//! together under one scheduler; unmount tears all of it down.
//!
//! Ingestion runs in a single task that exclusively owns the store, the
//! alert detector and the coalescer. Observers only ever see published
//! copies through `watch` channels.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use super::alerts::AlertDetector;
use super::coalescer::UpdateCoalescer;
use super::config::SyncConfig;
use super::error::SyncError;
use super::rest::{HttpFeedClient, SnapshotSource, StatusSource};
use super::scheduler::{Scheduler, Timers};
use super::status::StatusPoller;
use super::store::SnapshotStore;
use super::transport::{Ingest, TransportManager};
use super::types::{AlertEntry, AuxSnapshot, ConnectionState, FeedHealth, MarketView, Snapshot};
use super::websocket::{PushTransport, WebSocketTransport};

/// External collaborators a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub push: Arc<dyn PushTransport>,
    pub snapshots: Arc<dyn SnapshotSource>,
    pub status: Arc<dyn StatusSource>,
}

impl Collaborators {
    /// WebSocket push feed plus HTTP pull endpoints derived from `config`
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let push_url = config.push_endpoint()?;
        let http = Arc::new(HttpFeedClient::from_config(config)?);

        Ok(Self {
            push: Arc::new(WebSocketTransport::new(push_url.as_str())),
            snapshots: http.clone(),
            status: http,
        })
    }
}

/// A mounted market sync session
pub struct MarketSync {
    scheduler: Scheduler,
    health_tx: watch::Sender<FeedHealth>,
    health_rx: watch::Receiver<FeedHealth>,
    market_rx: watch::Receiver<MarketView>,
    alerts_rx: watch::Receiver<Vec<AlertEntry>>,
    aux_rx: watch::Receiver<AuxSnapshot>,
}

impl MarketSync {
    /// Mount against the real push and pull endpoints
    pub fn mount(config: SyncConfig) -> Result<Self, SyncError> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::mount_with(config, collaborators))
    }

    /// Mount against the given collaborators (must be called inside a tokio runtime)
    pub fn mount_with(config: SyncConfig, collaborators: Collaborators) -> Self {
        let mut scheduler = Scheduler::new();

        let (ingest_tx, ingest_rx) = mpsc::channel(config.channel_buffer_size.max(1));
        let (health_tx, health_rx) = watch::channel(FeedHealth::default());
        let (market_tx, market_rx) = watch::channel(MarketView::default());
        let (alerts_tx, alerts_rx) = watch::channel(Vec::new());
        let (aux_tx, aux_rx) = watch::channel(AuxSnapshot::default());

        let ingestor = Ingestor::new(&config, market_tx, alerts_tx);
        scheduler.spawn("ingest", ingestor.run(ingest_rx, scheduler.timers(), config.coalesce_interval));

        let poller = StatusPoller::new(
            collaborators.status,
            scheduler.timers(),
            config.status_interval,
            aux_tx,
        );
        scheduler.spawn("status", poller.run());

        let transport = TransportManager::new(
            config,
            collaborators.push,
            collaborators.snapshots,
            scheduler.timers(),
            ingest_tx,
            health_tx.clone(),
        );
        scheduler.spawn("transport", transport.run());

        info!("Market sync mounted");

        Self {
            scheduler,
            health_tx,
            health_rx,
            market_rx,
            alerts_rx,
            aux_rx,
        }
    }

    /// Connection state, source and counters
    pub fn health(&self) -> watch::Receiver<FeedHealth> {
        self.health_rx.clone()
    }

    /// Coalesced store contents
    pub fn market(&self) -> watch::Receiver<MarketView> {
        self.market_rx.clone()
    }

    /// Alert log, newest first
    pub fn alerts(&self) -> watch::Receiver<Vec<AlertEntry>> {
        self.alerts_rx.clone()
    }

    /// Auxiliary status / sentiment
    pub fn aux(&self) -> watch::Receiver<AuxSnapshot> {
        self.aux_rx.clone()
    }

    pub fn is_mounted(&self) -> bool {
        !self.scheduler.is_torn_down()
    }

    /// Close the socket, cancel every timer and reset state to `Idle`
    pub async fn unmount(&mut self) {
        self.scheduler.teardown().await;
        self.health_tx.send_replace(FeedHealth::default());
        info!(state = %ConnectionState::Idle, "Market sync unmounted");
    }
}

/// Owner of the store, alert log and coalescer
struct Ingestor {
    store: SnapshotStore,
    alerts: AlertDetector,
    coalescer: UpdateCoalescer,
    default_exchange: String,
    revision: u64,
    market_tx: watch::Sender<MarketView>,
    alerts_tx: watch::Sender<Vec<AlertEntry>>,
}

impl Ingestor {
    fn new(
        config: &SyncConfig,
        market_tx: watch::Sender<MarketView>,
        alerts_tx: watch::Sender<Vec<AlertEntry>>,
    ) -> Self {
        Self {
            store: SnapshotStore::new(config.default_exchange.clone()),
            alerts: AlertDetector::new(config.alert_capacity, config.default_exchange.clone()),
            coalescer: UpdateCoalescer::new(),
            default_exchange: config.default_exchange.clone(),
            revision: 0,
            market_tx,
            alerts_tx,
        }
    }

    async fn run(
        mut self,
        mut ingest_rx: mpsc::Receiver<Ingest>,
        timers: Timers,
        coalesce_interval: Duration,
    ) {
        let mut flush = timers.interval(coalesce_interval);
        let mut transport_open = true;

        loop {
            tokio::select! {
                biased;
                _ = timers.cancelled() => break,
                // Flush ahead of receive so a busy channel cannot starve it
                ticked = flush.tick() => {
                    if !ticked {
                        break;
                    }
                    self.flush();
                }
                received = ingest_rx.recv(), if transport_open => match received {
                    Some(ingest) => self.ingest(ingest),
                    None => {
                        debug!("transport finished, flushing remaining updates");
                        transport_open = false;
                    }
                },
            }
        }
    }

    /// Alerts always see the raw snapshot before the coalescer does
    fn ingest(&mut self, ingest: Ingest) {
        match ingest {
            Ingest::Push(snapshot) => {
                let snapshot = snapshot.normalised(&self.default_exchange);
                self.inspect(&snapshot);
                if self.coalescer.offer(snapshot) {
                    trace!(discarded = self.coalescer.discarded(), "coalesced pending snapshot");
                }
            }
            Ingest::Poll(snapshot) => {
                let snapshot = snapshot.normalised(&self.default_exchange);
                self.inspect(&snapshot);
                self.coalescer.replace(&mut self.store, snapshot);
                self.publish_market();
            }
        }
    }

    fn inspect(&mut self, snapshot: &Snapshot) {
        let added = self.alerts.inspect(snapshot);
        if added > 0 {
            debug!(added, records = snapshot.metrics.len(), "signal alerts raised");
            self.alerts_tx.send_replace(self.alerts.to_vec());
        }
    }

    fn flush(&mut self) {
        if self.coalescer.flush(&mut self.store) {
            self.publish_market();
        }
    }

    fn publish_market(&mut self) {
        self.revision += 1;
        self.market_tx.send_replace(MarketView {
            records: self.store.values().cloned().collect(),
            last_updated: self.coalescer.last_updated(),
            revision: self.revision,
        });
    }
}
