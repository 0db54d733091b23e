//! Teardown-aware owner of every task and timer in a session
//!
//! All sleeps and intervals are created from [`Timers`] handles sharing one
//! cancellation token, so `teardown` stops the backoff sleep, the poll
//! interval, the coalescer interval and the status interval at once. Tasks
//! are aborted as well, which drops (and closes) any open socket they own.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancellation-aware timer factory handed to each task
#[derive(Debug, Clone)]
pub struct Timers {
    token: CancellationToken,
}

impl Timers {
    /// Sleep for `duration`, returning false if cancelled first
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Fixed-period ticker whose first tick fires one `period` from now
    pub fn interval(&self, period: Duration) -> Ticker {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ticker {
            interval,
            token: self.token.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
    token: CancellationToken,
}

impl Ticker {
    /// Wait for the next tick, returning false once cancelled
    pub async fn tick(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = self.interval.tick() => true,
        }
    }
}

#[derive(Debug)]
pub struct Scheduler {
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn timers(&self) -> Timers {
        Timers {
            token: self.token.clone(),
        }
    }

    /// Spawn a session task that stops at the first await after teardown
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => debug!(task = name, "task cancelled"),
                _ = task => debug!(task = name, "task finished"),
            }
        });
    }

    pub fn is_torn_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel every timer, abort every task and wait for them to settle
    pub async fn teardown(&mut self) {
        self.token.cancel();
        self.tasks.abort_all();

        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!(error = %e, "session task panicked");
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
