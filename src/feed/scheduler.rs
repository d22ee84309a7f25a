//! Fixed-interval driver for the ingestion cycle.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::cycle::{CycleReport, IngestionCycle};
use super::store::IngestStore;
use super::wait_for_shutdown;
use crate::{GatorError, Result};

/// Runs an ingestion cycle immediately and then once per interval.
///
/// Cycles never overlap. A cycle that overruns the interval delays the
/// next tick instead of causing a burst of catch-up ticks.
pub struct Scheduler<S> {
    cycle: IngestionCycle<S>,
    interval: Duration,
}

impl<S: IngestStore> Scheduler<S> {
    /// Create a scheduler. A zero interval is rejected.
    pub fn new(cycle: IngestionCycle<S>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(GatorError::InvalidDuration(
                "interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { cycle, interval })
    }

    /// Run until `shutdown` turns true. Returns the number of cycles run.
    ///
    /// A cycle already fetching when shutdown arrives has its fetch
    /// abandoned; one already past the fetch runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!("Collecting feeds every {:?}", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }

            let report = self.cycle.run_once(&mut shutdown).await;
            cycles += 1;
            if let CycleReport::FetchFailed { feed_id, .. } = &report {
                debug!(feed_id = %feed_id, "Feed stays eligible for the next tick");
            }
        }

        info!(cycles, "Feed collection stopped");
        cycles
    }
}
