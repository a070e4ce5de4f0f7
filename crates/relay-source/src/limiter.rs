use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::Sleeper;
use tracing::debug;

/// Fixed-interval pacing for source API calls.
///
/// The first call goes out immediately; every later call waits
/// `60 / calls_per_minute` seconds, rounded up to the next 0.1 s. There is no
/// burst capacity.
pub struct RateLimiter {
    interval: Duration,
    calls: AtomicU64,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimiter {
    pub fn per_minute(calls_per_minute: u32, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            interval: interval_for(calls_per_minute),
            calls: AtomicU64::new(0),
            sleeper,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of calls paced so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn wait_if_needed(&self) {
        let previous = self.calls.fetch_add(1, Ordering::Relaxed);
        if previous > 0 {
            debug!(
                wait_ms = self.interval.as_millis() as u64,
                call = previous + 1,
                "pacing source call"
            );
            self.sleeper.sleep(self.interval).await;
        }
    }
}

/// `ceil(60 / cpm * 10) / 10` seconds, computed in whole tenths.
fn interval_for(calls_per_minute: u32) -> Duration {
    let cpm = u64::from(calls_per_minute.max(1));
    let tenths = 600u64.div_ceil(cpm);
    Duration::from_millis(tenths * 100)
}
