//! # Hybrid Logical Clock
//!
//! Timestamps and clocks used to assign lease start times and to order reads
//! across lease changes.
//!
//! A [`Timestamp`] pairs a physical wall time in nanoseconds with a logical
//! counter that breaks ties between readings taken within the same
//! nanosecond. A [`HybridClock`] hands out strictly increasing readings and
//! absorbs timestamps observed from other nodes through [`Clock::update`], so
//! any reading taken after an observation is greater than the observation.
//!
//! The physical time source is pluggable: [`SystemPhysicalClock`] reads the
//! system clock, [`ManualTime`] is advanced by hand in tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A point in hybrid logical time.
///
/// Timestamps order first by wall time, then by the logical counter.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::hlc::Timestamp;
///
/// let ts = Timestamp::new(1_000, 0);
/// assert!(ts.next() > ts);
/// assert_eq!(ts.add(500, 2), Timestamp::new(1_500, 2));
/// assert_eq!(Timestamp::default().to_string(), "0,0");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    /// Physical time in nanoseconds since the Unix epoch
    pub wall_time: i64,
    /// Logical counter for readings within the same wall time
    pub logical: i32,
}

impl Timestamp {
    pub const MIN: Timestamp = Timestamp {
        wall_time: 0,
        logical: 0,
    };

    pub fn new(wall_time: i64, logical: i32) -> Self {
        Self { wall_time, logical }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::MIN
    }

    /// Returns a timestamp shifted by the given wall and logical deltas,
    /// saturating at the bounds of each component.
    pub fn add(&self, wall_time: i64, logical: i32) -> Self {
        Self {
            wall_time: self.wall_time.saturating_add(wall_time),
            logical: self.logical.saturating_add(logical),
        }
    }

    /// Returns the smallest timestamp strictly greater than this one.
    pub fn next(&self) -> Self {
        if self.logical == i32::MAX {
            Self::new(self.wall_time.saturating_add(1), 0)
        } else {
            Self::new(self.wall_time, self.logical + 1)
        }
    }

    /// Raises this timestamp to `other` if `other` is greater.
    ///
    /// Returns true if the timestamp changed.
    pub fn forward(&mut self, other: Timestamp) -> bool {
        if *self < other {
            *self = other;
            true
        } else {
            false
        }
    }

    /// Returns the maximum of the two timestamps.
    pub fn max_of(self, other: Timestamp) -> Self {
        std::cmp::max(self, other)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wall_time == 0 {
            return write!(f, "0,{}", self.logical);
        }
        let sign = if self.wall_time < 0 { "-" } else { "" };
        let abs = self.wall_time.unsigned_abs();
        write!(
            f,
            "{}{}.{:09},{}",
            sign,
            abs / 1_000_000_000,
            abs % 1_000_000_000,
            self.logical
        )
    }
}

/// A timestamp that was produced by a clock reading on some node.
///
/// Only clock timestamps may be used as lease start times: they are
/// guaranteed to be no greater than the clock of the node that produced them,
/// which is what lets a successor reason about what its predecessor served.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ClockTimestamp(Timestamp);

impl ClockTimestamp {
    pub fn new(wall_time: i64, logical: i32) -> Self {
        Self(Timestamp::new(wall_time, logical))
    }

    pub fn to_timestamp(&self) -> Timestamp {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a clock timestamp shifted by the given deltas.
    pub fn add(&self, wall_time: i64, logical: i32) -> Self {
        Self(self.0.add(wall_time, logical))
    }
}

impl From<ClockTimestamp> for Timestamp {
    fn from(ts: ClockTimestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for ClockTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source of physical time in nanoseconds.
pub trait PhysicalClock: Send + Sync {
    fn now_nanos(&self) -> i64;
}

/// Physical clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPhysicalClock;

impl PhysicalClock for SystemPhysicalClock {
    fn now_nanos(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default()
    }
}

/// Manually advanced physical clock for deterministic tests.
///
/// Clones share the same underlying time, so one handle can drive the clocks
/// of several simulated nodes.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::hlc::{ManualTime, PhysicalClock};
///
/// let manual = ManualTime::new(123);
/// let shared = manual.clone();
/// manual.advance(1_000);
/// assert_eq!(shared.now_nanos(), 1_123);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    nanos: Arc<AtomicI64>,
}

impl ManualTime {
    pub fn new(nanos: i64) -> Self {
        Self {
            nanos: Arc::new(AtomicI64::new(nanos)),
        }
    }

    pub fn advance(&self, nanos: i64) {
        self.nanos.fetch_add(nanos, Ordering::AcqRel);
    }

    pub fn advance_duration(&self, duration: Duration) {
        self.advance(duration.as_nanos() as i64);
    }

    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::Release);
    }
}

impl PhysicalClock for ManualTime {
    fn now_nanos(&self) -> i64 {
        self.nanos.load(Ordering::Acquire)
    }
}

/// Clock interface consumed by lease evaluation.
pub trait Clock: Send + Sync {
    /// Returns a reading strictly greater than every previous reading and
    /// every timestamp passed to [`Clock::update`].
    fn now(&self) -> ClockTimestamp;

    /// Records a timestamp observed from elsewhere in the cluster.
    fn update(&self, observed: ClockTimestamp);

    /// Maximum tolerated offset between clocks in the cluster.
    fn max_offset(&self) -> Duration;
}

/// Hybrid logical clock over a physical time source.
#[derive(Debug)]
pub struct HybridClock<P: PhysicalClock> {
    physical: P,
    last: Mutex<Timestamp>,
    max_offset: Duration,
}

impl<P: PhysicalClock> HybridClock<P> {
    pub fn new(physical: P, max_offset: Duration) -> Self {
        Self {
            physical,
            last: Mutex::new(Timestamp::MIN),
            max_offset,
        }
    }

    pub fn physical(&self) -> &P {
        &self.physical
    }
}

impl HybridClock<SystemPhysicalClock> {
    pub fn system(max_offset: Duration) -> Self {
        Self::new(SystemPhysicalClock, max_offset)
    }
}

impl HybridClock<ManualTime> {
    /// Creates a clock driven by `manual` with a zero max offset.
    pub fn for_testing(manual: ManualTime) -> Self {
        Self::new(manual, Duration::ZERO)
    }
}

impl<P: PhysicalClock> Clock for HybridClock<P> {
    fn now(&self) -> ClockTimestamp {
        let physical = self.physical.now_nanos();
        let mut last = self.last.lock();
        if last.wall_time >= physical {
            *last = last.next();
        } else {
            *last = Timestamp::new(physical, 0);
        }
        ClockTimestamp(*last)
    }

    fn update(&self, observed: ClockTimestamp) {
        self.last.lock().forward(observed.to_timestamp());
    }

    fn max_offset(&self) -> Duration {
        self.max_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::new(10, 5);
        let b = Timestamp::new(11, 0);
        assert!(a < b);
        assert!(a < a.next());
        assert_eq!(Timestamp::new(10, i32::MAX).next(), Timestamp::new(11, 0));
    }

    #[test]
    fn test_timestamp_add_saturates() {
        let late = Timestamp::new(i64::MAX - 5, i32::MAX);
        assert_eq!(late.add(10, 1), Timestamp::new(i64::MAX, i32::MAX));
        assert_eq!(
            Timestamp::new(i64::MIN + 1, 0).add(-10, 0),
            Timestamp::new(i64::MIN, 0)
        );
        assert_eq!(Timestamp::new(i64::MAX, i32::MAX).next().wall_time, i64::MAX);
    }

    #[test]
    fn test_timestamp_forward() {
        let mut ts = Timestamp::new(10, 0);
        assert!(ts.forward(Timestamp::new(12, 1)));
        assert!(!ts.forward(Timestamp::new(11, 0)));
        assert_eq!(ts, Timestamp::new(12, 1));
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(Timestamp::default().to_string(), "0,0");
        assert_eq!(Timestamp::new(123, 0).to_string(), "0.000000123,0");
        assert_eq!(
            Timestamp::new(2_000_000_001, 3).to_string(),
            "2.000000001,3"
        );
        assert_eq!(Timestamp::new(-1_500_000_000, 0).to_string(), "-1.500000000,0");
    }

    #[test]
    fn test_clock_readings_strictly_increase() {
        let manual = ManualTime::new(123);
        let clock = HybridClock::for_testing(manual.clone());

        let first = clock.now();
        let second = clock.now();
        assert_eq!(first, ClockTimestamp::new(123, 0));
        assert_eq!(second, ClockTimestamp::new(123, 1));

        manual.advance(1000);
        assert_eq!(clock.now(), ClockTimestamp::new(1123, 0));
    }

    #[test]
    fn test_clock_update_absorbs_observed_timestamps() {
        let clock = HybridClock::for_testing(ManualTime::new(100));
        let observed = ClockTimestamp::new(5_000, 7);
        clock.update(observed);
        assert!(clock.now() > observed);

        // Observing something older changes nothing.
        clock.update(ClockTimestamp::new(1, 0));
        assert!(clock.now() > observed);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = HybridClock::system(Duration::from_millis(500));
        let a = clock.now();
        let b = clock.now();
        assert!(b > a);
        assert_eq!(clock.max_offset(), Duration::from_millis(500));
    }
}
