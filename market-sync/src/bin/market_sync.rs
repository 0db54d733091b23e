/// Headless market sync runner
///
/// Mounts a session, logs connectivity changes, store refreshes, new alerts
/// and auxiliary status until Ctrl-C, then unmounts.
///
/// The push URL comes from the first CLI argument, else MARKET_WS_URL, else
/// ws://127.0.0.1:9001/ws.
use std::error::Error;

use market_sync::{AlertEntry, MarketSync, SyncConfig};
use rustls::crypto::ring::default_provider;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = default_provider().install_default();
    init_logging();

    let mut config = SyncConfig::from_env();
    if let Some(url) = std::env::args().nth(1) {
        config = config.with_push_url(url);
    }
    let poll_url = config.snapshot_endpoint()?;
    info!(push = %config.push_url, poll = %poll_url, "Starting market sync");

    let mut sync = MarketSync::mount(config)?;
    let mut health = sync.health();
    let mut market = sync.market();
    let mut alerts = sync.alerts();
    let mut aux = sync.aux();
    let mut last_alert: Option<AlertEntry> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            Ok(()) = health.changed() => {
                let current = *health.borrow_and_update();
                info!(
                    state = %current.state,
                    status = current.status().as_str(),
                    source = current.source.as_str(),
                    attempt = current.attempt,
                    failures = current.failures,
                    "feed health"
                );
            }
            Ok(()) = market.changed() => {
                let view = market.borrow_and_update();
                debug!(
                    revision = view.revision,
                    records = view.records.len(),
                    last_updated = ?view.last_updated,
                    "market view refreshed"
                );
            }
            Ok(()) = alerts.changed() => {
                let log = alerts.borrow_and_update();
                // Newest first: everything ahead of the last logged head is new
                let fresh = log
                    .iter()
                    .take_while(|entry| Some(*entry) != last_alert.as_ref())
                    .count();
                for entry in log.iter().take(fresh).rev() {
                    info!(ts = %entry.ts, "ALERT {}", entry.text);
                }
                last_alert = log.first().cloned();
            }
            Ok(()) = aux.changed() => {
                let snapshot = aux.borrow_and_update();
                if let Some(status) = &snapshot.status {
                    for (exchange, counters) in &status.exchanges {
                        debug!(exchange = %exchange, stale = counters.stale, total = counters.total, "exchange staleness");
                    }
                }
                for (feed, counts) in &snapshot.sentiment {
                    debug!(feed = %feed, buy = counts.buy, sell = counts.sell, bias = ?counts.bias(), "sentiment");
                }
            }
        }
    }

    sync.unmount().await;
    Ok(())
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
