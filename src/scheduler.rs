//! Tick cadences for the four periodic components (§5): a monotonic
//! timer wheel drives the temperature reader (~7s, 250ms during
//! warmup), the heater supervisor (5s), the light detector (60s), and
//! the SSR sense debounce (2s). `Core::run` wires these to `tokio`
//! timers; the parts of the cadence logic that have actual decisions
//! to make — the reader's warmup-to-normal interval switch — are
//! pulled out here as plain, clock-free state so they're unit
//! testable without an async runtime.

use crate::config::TempReaderConfig;
use std::time::Duration;

/// Tracks how many temperature-reader ticks have elapsed and returns
/// the interval to wait before the next one: `warmup_interval` for the
/// first `warmup_samples` ticks (so the noise filter fills quickly at
/// startup), `normal_interval` after that (§4.2: chosen relatively
/// prime to the MAX31855's ~10s noise period).
#[derive(Debug, Clone, Copy)]
pub struct ReaderSchedule {
    warmup_interval: Duration,
    normal_interval: Duration,
    warmup_samples: usize,
    ticks_done: usize,
}

impl ReaderSchedule {
    pub fn new(cfg: &TempReaderConfig) -> Self {
        ReaderSchedule {
            warmup_interval: cfg.warmup_interval,
            normal_interval: cfg.normal_interval,
            warmup_samples: cfg.warmup_samples,
            ticks_done: 0,
        }
    }

    /// Call once per completed tick; returns the delay before the next
    /// one.
    pub fn record_tick_and_next_interval(&mut self) -> Duration {
        self.ticks_done += 1;
        if self.ticks_done < self.warmup_samples {
            self.warmup_interval
        } else {
            self.normal_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_warmup_interval_until_sample_count_reached() {
        let cfg = TempReaderConfig {
            warmup_interval: Duration::from_millis(250),
            normal_interval: Duration::from_secs(7),
            warmup_samples: 3,
            stale_window: Duration::from_secs(120),
        };
        let mut sched = ReaderSchedule::new(&cfg);
        assert_eq!(sched.record_tick_and_next_interval(), Duration::from_millis(250));
        assert_eq!(sched.record_tick_and_next_interval(), Duration::from_millis(250));
        assert_eq!(sched.record_tick_and_next_interval(), Duration::from_secs(7));
        assert_eq!(sched.record_tick_and_next_interval(), Duration::from_secs(7));
    }
}
