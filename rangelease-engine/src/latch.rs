//! Range latches.
//!
//! Lease evaluation holds an exclusive latch over the whole range from
//! evaluation until the proposal resolves, so no read or write under the old
//! lease can be in flight while the new start timestamp is chosen. Reads and
//! writes served under a lease share the latch among themselves.

use dashmap::DashMap;
use rangelease_core::{RangeId, Span};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchAccess {
    /// Shared with other readers and writers served under the lease
    Shared,
    /// Excludes every other command on the range
    Exclusive,
}

#[derive(Debug)]
enum Held {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

/// A held latch. Dropping the guard releases it.
#[derive(Debug)]
pub struct LatchGuard {
    range_id: RangeId,
    span: Span,
    held: Held,
}

impl LatchGuard {
    pub fn range_id(&self) -> RangeId {
        self.range_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn access(&self) -> LatchAccess {
        match self.held {
            Held::Shared(_) => LatchAccess::Shared,
            Held::Exclusive(_) => LatchAccess::Exclusive,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatchStatistics {
    pub acquisitions: u64,
    pub contended: u64,
    pub ranges: usize,
}

/// Per-store table of range latches.
///
/// Latches are range granular: a command declares the span it touches, but
/// any declared span conflicts with every other span of the same range.
#[derive(Debug, Default)]
pub struct LatchManager {
    latches: DashMap<RangeId, Arc<RwLock<()>>>,
    acquisitions: AtomicU64,
    contended: AtomicU64,
}

impl LatchManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn latch(&self, range_id: RangeId) -> Arc<RwLock<()>> {
        self.latches
            .entry(range_id)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Waits for the latch of `range_id` in the requested mode.
    pub async fn acquire(&self, range_id: RangeId, span: Span, access: LatchAccess) -> LatchGuard {
        if let Some(guard) = self.try_acquire(range_id, span.clone(), access) {
            return guard;
        }

        self.contended.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Waiting for {:?} latch on {} span {}",
            access, range_id, span
        );

        let latch = self.latch(range_id);
        let held = match access {
            LatchAccess::Shared => Held::Shared(latch.read_owned().await),
            LatchAccess::Exclusive => Held::Exclusive(latch.write_owned().await),
        };
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        LatchGuard {
            range_id,
            span,
            held,
        }
    }

    /// Acquires the latch only if it is immediately available.
    pub fn try_acquire(
        &self,
        range_id: RangeId,
        span: Span,
        access: LatchAccess,
    ) -> Option<LatchGuard> {
        let latch = self.latch(range_id);
        let held = match access {
            LatchAccess::Shared => Held::Shared(latch.try_read_owned().ok()?),
            LatchAccess::Exclusive => Held::Exclusive(latch.try_write_owned().ok()?),
        };
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Some(LatchGuard {
            range_id,
            span,
            held,
        })
    }

    pub fn get_statistics(&self) -> LatchStatistics {
        LatchStatistics {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            ranges: self.latches.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn span() -> Span {
        Span::new("a", "z")
    }

    #[tokio::test]
    async fn test_exclusive_latch_blocks_shared() {
        let manager = LatchManager::new();
        let range = RangeId::new(1);

        let exclusive = manager.acquire(range, span(), LatchAccess::Exclusive).await;
        assert_eq!(exclusive.access(), LatchAccess::Exclusive);
        assert!(manager
            .try_acquire(range, span(), LatchAccess::Shared)
            .is_none());

        drop(exclusive);
        assert!(manager
            .try_acquire(range, span(), LatchAccess::Shared)
            .is_some());
    }

    #[tokio::test]
    async fn test_shared_latches_coexist() {
        let manager = LatchManager::new();
        let range = RangeId::new(1);
        let _a = manager.acquire(range, span(), LatchAccess::Shared).await;
        let _b = manager.acquire(range, span(), LatchAccess::Shared).await;
        assert!(manager
            .try_acquire(range, span(), LatchAccess::Exclusive)
            .is_none());
    }

    #[tokio::test]
    async fn test_ranges_are_independent() {
        let manager = LatchManager::new();
        let _one = manager
            .acquire(RangeId::new(1), span(), LatchAccess::Exclusive)
            .await;
        assert!(manager
            .try_acquire(RangeId::new(2), span(), LatchAccess::Exclusive)
            .is_some());
        assert_eq!(manager.get_statistics().ranges, 2);
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let manager = Arc::new(LatchManager::new());
        let range = RangeId::new(7);
        let guard = manager.acquire(range, span(), LatchAccess::Exclusive).await;

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                let _guard = manager.acquire(range, span(), LatchAccess::Exclusive).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert_eq!(manager.get_statistics().contended, 1);
    }
}
