use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Byte and shard counters for one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub total_shards: u64,
    pub completed_shards: u64,
}

impl TransferProgress {
    pub fn new(total_bytes: u64, total_shards: u64) -> Self {
        Self {
            total_bytes,
            total_shards,
            ..Default::default()
        }
    }

    /// Records one finished shard of `bytes` bytes.
    pub fn shard_done(&mut self, bytes: u64) {
        self.transferred_bytes += bytes;
        self.completed_shards += 1;
    }

    /// Completed fraction in `0.0..=1.0`; an empty transfer counts shards instead.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes > 0 {
            (self.transferred_bytes as f64 / self.total_bytes as f64).min(1.0)
        } else if self.total_shards > 0 {
            self.completed_shards as f64 / self.total_shards as f64
        } else {
            0.0
        }
    }
}

/// Throughput over a trailing time window, fed with running byte totals.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    window: Duration,
    /// (when, running total) in arrival order.
    points: VecDeque<(Instant, u64)>,
}

impl ThroughputMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            points: VecDeque::new(),
        }
    }

    /// Records that `total` bytes have moved so far.
    ///
    /// A total lower than the previous one starts a new measurement.
    pub fn observe(&mut self, total: u64) {
        self.observe_at(total, Instant::now());
    }

    fn observe_at(&mut self, total: u64, now: Instant) {
        if self.points.back().is_some_and(|&(_, last)| total < last) {
            self.points.clear();
        }
        self.points.push_back((now, total));
        if let Some(cutoff) = now.checked_sub(self.window) {
            while self.points.front().is_some_and(|&(at, _)| at < cutoff) {
                self.points.pop_front();
            }
        }
    }

    /// Bytes per second between the oldest and newest points in the window.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(&(first_at, first)), Some(&(last_at, last))) =
            (self.points.front(), self.points.back())
        else {
            return 0.0;
        };
        let elapsed = last_at.duration_since(first_at);
        if elapsed.is_zero() {
            return 0.0;
        }
        (last - first) as f64 / elapsed.as_secs_f64()
    }

    /// Time left for `remaining` bytes at the current rate.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        (rate > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn restart(&mut self) {
        self.points.clear();
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
