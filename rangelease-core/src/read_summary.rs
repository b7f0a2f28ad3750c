//! # Read Summaries
//!
//! A read summary is a conservative bound on the timestamps that may already
//! have been read under a lease. It is handed from a leaseholder to its
//! successor at transfer time so the successor never accepts a write that
//! would invalidate a read its predecessor served.

use crate::hlc::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which portion of the key space a read touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadScope {
    /// Keys local to the range (range-addressed metadata)
    Local,
    /// Keys of the global, user-visible key space
    Global,
}

/// Low-water mark of one read scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSummarySegment {
    pub low_water: Timestamp,
}

impl ReadSummarySegment {
    pub fn new(low_water: Timestamp) -> Self {
        Self { low_water }
    }

    pub fn merge(&mut self, other: ReadSummarySegment) -> bool {
        self.low_water.forward(other.low_water)
    }
}

/// Summary of the reads served under a lease, split by scope.
///
/// Merging only ever raises the low-water marks.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::hlc::Timestamp;
/// use rangelease_core::read_summary::ReadSummary;
///
/// let served = ReadSummary::from_timestamp(Timestamp::new(50, 0));
/// let merged = served.merged(ReadSummary::from_timestamp(Timestamp::new(30, 0)));
/// assert_eq!(merged.global.low_water, Timestamp::new(50, 0));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSummary {
    pub local: ReadSummarySegment,
    pub global: ReadSummarySegment,
}

impl ReadSummary {
    /// A summary whose both scopes are bounded by `ts`.
    pub fn from_timestamp(ts: Timestamp) -> Self {
        Self {
            local: ReadSummarySegment::new(ts),
            global: ReadSummarySegment::new(ts),
        }
    }

    pub fn segment(&self, scope: ReadScope) -> ReadSummarySegment {
        match scope {
            ReadScope::Local => self.local,
            ReadScope::Global => self.global,
        }
    }

    fn segment_mut(&mut self, scope: ReadScope) -> &mut ReadSummarySegment {
        match scope {
            ReadScope::Local => &mut self.local,
            ReadScope::Global => &mut self.global,
        }
    }

    /// Raises each scope to the other summary's mark. Returns true if
    /// anything changed.
    pub fn merge(&mut self, other: ReadSummary) -> bool {
        let local = self.local.merge(other.local);
        let global = self.global.merge(other.global);
        local || global
    }

    pub fn merged(mut self, other: ReadSummary) -> Self {
        self.merge(other);
        self
    }

    /// Largest low-water mark across both scopes.
    pub fn max_low_water(&self) -> Timestamp {
        self.local.low_water.max_of(self.global.low_water)
    }
}

impl fmt::Display for ReadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "local={} global={}",
            self.local.low_water, self.global.low_water
        )
    }
}

/// Tracks the reads served by the current leaseholder of a range.
///
/// The tracker is reseeded whenever the local store takes the lease, and is
/// queried once per transfer to build the successor's prior read summary.
#[derive(Debug, Default)]
pub struct ReadSummaryTracker {
    summary: Mutex<ReadSummary>,
    reads_served: AtomicU64,
}

impl ReadSummaryTracker {
    pub fn new(initial: ReadSummary) -> Self {
        Self {
            summary: Mutex::new(initial),
            reads_served: AtomicU64::new(0),
        }
    }

    /// Records a read at `ts`. The low-water mark is only ever raised.
    pub fn record_read(&self, scope: ReadScope, ts: Timestamp) {
        self.summary.lock().segment_mut(scope).low_water.forward(ts);
        self.reads_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current(&self) -> ReadSummary {
        *self.summary.lock()
    }

    /// Replaces the tracked summary, as done when a new lease is installed.
    pub fn reset(&self, summary: ReadSummary) {
        *self.summary.lock() = summary;
    }

    /// Raises the tracked summary to `summary`, keeping reads already served.
    pub fn merge(&self, summary: ReadSummary) -> bool {
        self.summary.lock().merge(summary)
    }

    /// Returns the timestamp a write proposed at `ts` must use so it does not
    /// land at or below any timestamp already read in `scope`.
    pub fn forward_write_timestamp(&self, scope: ReadScope, ts: Timestamp) -> Timestamp {
        let low_water = self.summary.lock().segment(scope).low_water;
        if ts <= low_water {
            low_water.next()
        } else {
            ts
        }
    }

    pub fn reads_served(&self) -> u64 {
        self.reads_served.load(Ordering::Relaxed)
    }
}
