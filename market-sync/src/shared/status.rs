//! Best-effort poller for auxiliary status and sentiment data
//!
//! Runs on its own interval whatever the transport is doing. A failed fetch
//! keeps the previous good value for that feed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use super::rest::StatusSource;
use super::scheduler::Timers;
use super::types::AuxSnapshot;

pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    timers: Timers,
    interval: Duration,
    aux_tx: watch::Sender<AuxSnapshot>,
    current: AuxSnapshot,
}

impl StatusPoller {
    pub fn new(
        source: Arc<dyn StatusSource>,
        timers: Timers,
        interval: Duration,
        aux_tx: watch::Sender<AuxSnapshot>,
    ) -> Self {
        Self {
            source,
            timers,
            interval,
            aux_tx,
            current: AuxSnapshot::default(),
        }
    }

    /// Fetch now, then every `interval` until teardown
    pub async fn run(mut self) {
        let mut ticker = self.timers.interval(self.interval);
        loop {
            self.refresh().await;
            if !ticker.tick().await {
                break;
            }
        }
    }

    async fn refresh(&mut self) {
        let mut updated = false;

        match self.source.fetch_status().await {
            Ok(report) => {
                self.current.status = Some(report);
                updated = true;
            }
            Err(e) => debug!(error = %e, "status fetch failed, keeping previous value"),
        }

        for feed in self.source.sentiment_feeds() {
            match self.source.fetch_sentiment(&feed).await {
                Ok(counts) => {
                    self.current.sentiment.insert(feed, counts);
                    updated = true;
                }
                Err(e) => debug!(error = %e, feed = %feed, "sentiment fetch failed, keeping previous value"),
            }
        }

        if updated {
            self.current.last_success = Some(Utc::now());
            self.aux_tx.send_replace(self.current.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::scheduler::Scheduler;
    use crate::shared::testing::ScriptedStatus;
    use crate::shared::types::{ExchangeStaleness, SentimentCounts, StatusReport};

    fn report(stale: u64) -> StatusReport {
        let mut report = StatusReport::default();
        report
            .exchanges
            .insert("binance".to_string(), ExchangeStaleness { stale, total: 120 });
        report
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keep_previous_values() {
        let mut scheduler = Scheduler::new();
        let source = Arc::new(ScriptedStatus::new(
            vec![Some(report(2)), None, Some(report(7))],
            vec![Some(SentimentCounts { buy: 3, sell: 1, neutral: 0 }), None, None],
        ));
        let (aux_tx, aux_rx) = watch::channel(AuxSnapshot::default());

        let poller = StatusPoller::new(
            source.clone(),
            scheduler.timers(),
            Duration::from_millis(5_000),
            aux_tx,
        );
        scheduler.spawn("status", poller.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let aux = aux_rx.borrow();
            assert_eq!(aux.status, Some(report(2)));
            assert_eq!(aux.sentiment["market"].buy, 3);
        }

        // Second tick fails everywhere
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(aux_rx.borrow().status, Some(report(2)));

        // Third tick refreshes status, sentiment keeps its last good value
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        {
            let aux = aux_rx.borrow();
            assert_eq!(aux.status, Some(report(7)));
            assert_eq!(aux.sentiment["market"].buy, 3);
            assert!(aux.last_success.is_some());
        }

        scheduler.teardown().await;
        let calls = source.calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_published_until_first_success() {
        let mut scheduler = Scheduler::new();
        let source = Arc::new(ScriptedStatus::new(vec![None], vec![None]));
        let (aux_tx, aux_rx) = watch::channel(AuxSnapshot::default());

        scheduler.spawn(
            "status",
            StatusPoller::new(source, scheduler.timers(), Duration::from_secs(5), aux_tx).run(),
        );

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!aux_rx.has_changed().unwrap());
        assert_eq!(*aux_rx.borrow(), AuxSnapshot::default());

        scheduler.teardown().await;
    }
}
