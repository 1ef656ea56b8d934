use std::sync::atomic::{AtomicU64, Ordering};

/// How many events a single feed or push batch should target.
///
/// Shared between the server side (`PartitionManager::feed_consumer`)
/// and the client side (`Producer`'s batch sealing) — both throttle
/// the same way (spec.md §4.4 "Adaptive batching", §4.7 "same EWMA as
/// server side").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSize {
    Fixed(usize),
    Adaptive,
}

/// EWMA-based soft limit an `Adaptive` batch size resolves to.
///
/// Service times under `FAST_MS` nudge the limit up by `alpha`;
/// service times over `SLOW_MS` nudge it down by the same factor;
/// times in between leave it unchanged. Bounded to `[floor, ceiling]`
/// — both the smoothing factor and the bounds are caller-supplied
/// (spec.md §4.4 Open Question: "a simple EWMA... suffices", with the
/// exact factor and bounds left to the implementation; `config.rs`'s
/// `PartitionManagerConfig` is where a `PartitionManager` supplies
/// them).
#[derive(Debug)]
pub struct AdaptiveBatcher {
    soft_limit_millis: AtomicU64,
    alpha: f64,
    floor: u64,
    ceiling: u64,
}

impl AdaptiveBatcher {
    const FLOOR: u64 = 32;
    const CEILING: u64 = 65_536;
    const ALPHA: f64 = 0.2;
    const FAST_MS: f64 = 10.0;
    const SLOW_MS: f64 = 50.0;

    pub fn new() -> Self {
        Self::with_bounds(Self::FLOOR as usize, Self::ALPHA, Self::FLOOR, Self::CEILING)
    }

    /// Builds a batcher seeded and bounded explicitly, rather than at
    /// this type's own built-in defaults.
    pub fn with_bounds(seed: usize, alpha: f64, floor: u64, ceiling: u64) -> Self {
        let seeded = (seed as u64).clamp(floor, ceiling);
        Self {
            soft_limit_millis: AtomicU64::new(seeded),
            alpha,
            floor,
            ceiling,
        }
    }

    /// The current soft limit, to be combined with `available` via
    /// `min()` at the call site.
    pub fn current(&self) -> usize {
        self.soft_limit_millis.load(Ordering::Relaxed) as usize
    }

    /// Record how long the last feed/flush took to service, updating
    /// the soft limit for the next round.
    pub fn record(&self, service_millis: f64) {
        let current = self.current() as f64;
        let updated = if service_millis < Self::FAST_MS {
            current * (1.0 + self.alpha)
        } else if service_millis > Self::SLOW_MS {
            current * (1.0 - self.alpha)
        } else {
            current
        };
        let clamped = updated.clamp(self.floor as f64, self.ceiling as f64) as u64;
        self.soft_limit_millis.store(clamped, Ordering::Relaxed);
    }

    /// Resolve a `BatchSize` against how many items are actually
    /// available, returning the number to take this round.
    pub fn take(&self, size: BatchSize, available: usize) -> usize {
        match size {
            BatchSize::Fixed(n) => n.min(available),
            BatchSize::Adaptive => self.current().min(available),
        }
    }

    /// The seal threshold a producer's active batch should grow to
    /// before shipping, for `size` (spec.md §4.7 step 4).
    pub fn threshold(&self, size: BatchSize) -> usize {
        match size {
            BatchSize::Fixed(n) => n,
            BatchSize::Adaptive => self.current(),
        }
    }
}

impl Default for AdaptiveBatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_take_never_exceeds_available() {
        let batcher = AdaptiveBatcher::new();
        assert_eq!(batcher.take(BatchSize::Fixed(100), 5), 5);
        assert_eq!(batcher.take(BatchSize::Fixed(3), 100), 3);
    }

    #[test]
    fn adaptive_grows_on_fast_service_and_shrinks_on_slow() {
        let batcher = AdaptiveBatcher::new();
        let start = batcher.current();
        batcher.record(1.0);
        assert!(batcher.current() > start);

        let grown = batcher.current();
        batcher.record(1000.0);
        assert!(batcher.current() < grown);
    }

    #[test]
    fn adaptive_take_is_capped_at_floor_by_default() {
        let batcher = AdaptiveBatcher::new();
        assert_eq!(batcher.take(BatchSize::Adaptive, 1_000_000), 32);
    }

    #[test]
    fn threshold_matches_fixed_or_current_adaptive_limit() {
        let batcher = AdaptiveBatcher::new();
        assert_eq!(batcher.threshold(BatchSize::Fixed(7)), 7);
        assert_eq!(batcher.threshold(BatchSize::Adaptive), batcher.current());
    }
}
