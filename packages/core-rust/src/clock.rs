//! Monotonic mutation clock.
//!
//! Every write to the store is stamped by a [`MutationClock`]. Stamps are
//! wall-clock milliseconds, bumped by one whenever the wall clock has not
//! advanced past the previous stamp. Two writes therefore never share a
//! stamp, which is what lets a language's latest stamp act as an export
//! fingerprint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::types::Millis;

/// Largest lead over the wall clock an observed stamp may have before
/// [`MutationClock::observe`] warns.
pub const MAX_DRIFT_MS: Millis = 60_000;

/// Abstraction over the system clock for dependency injection.
///
/// Allows deterministic testing by replacing the real clock with a
/// [`ManualClock`]. The default implementation ([`SystemClock`]) delegates
/// to `std::time::SystemTime`.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now(&self) -> Millis;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    // Millisecond timestamps fit comfortably in u64.
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Millis
    }
}

/// Clock source that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Millis) -> Self {
        Self {
            millis: AtomicU64::new(start),
        }
    }

    /// Moves the clock forward by `delta` milliseconds.
    pub fn advance(&self, delta: Millis) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute value, which may be in the past.
    pub fn set(&self, millis: Millis) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Millis {
        self.millis.load(Ordering::SeqCst)
    }
}

impl<C: ClockSource + ?Sized> ClockSource for Arc<C> {
    fn now(&self) -> Millis {
        (**self).now()
    }
}

/// Issues strictly increasing write stamps.
///
/// `tick()` returns `max(now, last + 1)`, so stamps keep increasing when the
/// wall clock stalls or steps backwards. Safe to share between threads.
pub struct MutationClock {
    last: AtomicU64,
    source: Box<dyn ClockSource>,
}

impl MutationClock {
    #[must_use]
    pub fn new(source: Box<dyn ClockSource>) -> Self {
        Self {
            last: AtomicU64::new(0),
            source,
        }
    }

    /// Mutation clock backed by the system clock.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Box::new(SystemClock))
    }

    /// Issues the next stamp.
    pub fn tick(&self) -> Millis {
        let now = self.source.now();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Fast-forwards past a stamp issued by an earlier process, e.g. after
    /// reopening a persistent store.
    ///
    /// A stamp further than [`MAX_DRIFT_MS`] ahead of the wall clock is still
    /// accepted, with a warning: new stamps will run ahead of real time until
    /// the wall clock catches up.
    pub fn observe(&self, stamp: Millis) {
        let now = self.source.now();
        if stamp > now.saturating_add(MAX_DRIFT_MS) {
            warn!(
                stamp,
                now,
                drift_ms = stamp - now,
                "observed stamp is ahead of the wall clock"
            );
        }
        self.last.fetch_max(stamp, Ordering::SeqCst);
    }

    /// The most recently issued (or observed) stamp, 0 if none.
    #[must_use]
    pub fn last(&self) -> Millis {
        self.last.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MutationClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationClock")
            .field("last", &self.last())
            .finish_non_exhaustive()
    }
}
