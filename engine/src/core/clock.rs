//! Time source for the engine.
//!
//! All business timestamps come from a `Clock` injected at construction time.
//! Production code uses `SystemClock`; tests use `SimulatedClock` and advance
//! it manually, which keeps expiry, backoff and cutoff logic deterministic.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Source of the current instant.
///
/// # Example
/// ```
/// use fulfillment_engine_rs::core::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let now = clock.now();
/// assert!(now.timestamp() > 0);
/// ```
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
///
/// # Example
/// ```
/// use chrono::Duration;
/// use fulfillment_engine_rs::core::{Clock, SimulatedClock};
///
/// let clock = SimulatedClock::default();
/// let start = clock.now();
/// clock.advance(Duration::hours(2));
/// assert_eq!(clock.now() - start, Duration::hours(2));
/// ```
#[derive(Debug)]
pub struct SimulatedClock {
    now: RwLock<DateTime<Utc>>,
}

impl SimulatedClock {
    /// Create a simulated clock starting at the given instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to;
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        // Fixed epoch so tests that never advance the clock stay reproducible.
        Self::starting_at(DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_else(Utc::now))
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Shared handle used throughout the engine.
pub type SharedClock = Arc<dyn Clock>;
