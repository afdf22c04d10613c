use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one memoization scope.
///
/// - *hits*: a stored result was handed out
/// - *misses*: the computation ran with memoization enabled; a failed
///   computation is a miss that leaves nothing behind
/// - *bypasses*: the computation ran because memoization was disabled
///
/// Counters use `Relaxed` atomics; a [`snapshot`](MemoStats::snapshot) taken
/// while other threads record may mix values from slightly different instants.
///
/// # Examples
///
/// ```
/// use oncely_core::{CallSiteId, SharedMemo};
///
/// let memo = SharedMemo::new();
/// let site = CallSiteId::named("answer");
/// for _ in 0..4 {
///     memo.memoize(&site, &[], || 42).unwrap();
/// }
///
/// let snapshot = memo.stats().snapshot();
/// assert_eq!((snapshot.hits, snapshot.misses), (3, 1));
/// assert_eq!(snapshot.hit_rate(), 0.75);
/// ```
#[derive(Debug, Default)]
pub struct MemoStats {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
}

/// Point-in-time copy of [`MemoStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub bypasses: u64,
}

impl StatsSnapshot {
    /// Calls that went through the store, i.e. hits plus misses.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Share of lookups answered from the store; `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

impl MemoStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bypasses(&self) -> u64 {
        self.bypasses.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            bypasses: self.bypasses(),
        }
    }

    /// Zeroes every counter and returns the values they had.
    pub fn reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.swap(0, Ordering::Relaxed),
            misses: self.misses.swap(0, Ordering::Relaxed),
            bypasses: self.bypasses.swap(0, Ordering::Relaxed),
        }
    }
}
