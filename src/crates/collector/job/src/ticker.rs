//! Wall-clock ticker driving every job of a plugin.

use crate::job::JobHandle;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Produces a monotonically increasing clock, one value per period.
///
/// The clock counts periods since the ticker was created, so periods missed
/// while the consumer was busy still advance it.
#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
    start: Instant,
    period: Duration,
}

impl Ticker {
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn new(period: Duration) -> Self {
        let start = Instant::now();
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            start,
            period,
        }
    }

    /// Wait for the next period and return its clock value. The first call
    /// returns 0 immediately.
    pub async fn tick(&mut self) -> u64 {
        self.interval.tick().await;
        let elapsed = Instant::now().duration_since(self.start);
        u64::try_from(elapsed.as_nanos() / self.period.as_nanos()).unwrap_or(u64::MAX)
    }

    /// Deliver every clock value to every job until `cancel` fires.
    pub async fn fan_out(mut self, jobs: Vec<JobHandle>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("ticker stopped");
                    break;
                }
                clock = self.tick() => {
                    for job in &jobs {
                        job.tick(clock);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_counts_periods() {
        let mut ticker = Ticker::new(Duration::from_secs(1));
        assert_eq!(ticker.tick().await, 0);
        assert_eq!(ticker.tick().await, 1);
        assert_eq!(ticker.tick().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_periods_advance_the_clock() {
        let mut ticker = Ticker::new(Duration::from_secs(1));
        assert_eq!(ticker.tick().await, 0);

        tokio::time::advance(Duration::from_millis(5500)).await;
        assert_eq!(ticker.tick().await, 5);
        assert_eq!(ticker.tick().await, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Ticker::new(Duration::from_secs(1)).fan_out(Vec::new(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
