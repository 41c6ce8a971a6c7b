//! Periodic flush driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::flush::FlushReport;
use super::store::CounterStore;

/// Runs [`CounterStore::flush`] on a fixed interval until cancelled.
///
/// Cycles never overlap: the next tick is not awaited until the running
/// cycle returns, and late ticks are delayed rather than bunched.
pub struct FlushScheduler {
    store: Arc<CounterStore>,
    interval: Duration,
}

impl FlushScheduler {
    pub fn new(store: Arc<CounterStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Build a scheduler using the store's configured interval.
    pub fn from_store(store: Arc<CounterStore>) -> Self {
        let interval = store.config().flush_interval();
        Self::new(store, interval)
    }

    /// Run the flush loop until `shutdown` fires.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting flush scheduler (interval={:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Flush scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
    }

    /// Run a single cycle now.
    pub async fn run_once(&self) -> FlushReport {
        self.store.flush().await
    }
}
