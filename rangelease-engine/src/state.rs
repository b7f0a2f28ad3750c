use parking_lot::RwLock;
use rangelease_core::hlc::Timestamp;
use rangelease_core::lease::{Lease, LeaseStatus};
use rangelease_core::read_summary::ReadSummary;
use rangelease_core::replica::{RangeDescriptor, RangeReplicaSet};
use rangelease_core::{LeaseSequence, RangeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory lease state of one replica of a range.
///
/// Mutated only by the lease applier (installing leases) and by the
/// evaluator through revocation; everything else reads snapshots.
#[derive(Debug)]
pub struct RangeState {
    pub range_id: RangeId,
    descriptor: RwLock<RangeDescriptor>,
    lease: RwLock<Lease>,
    /// Sequence of the lease revoked by an in-flight transfer
    revoked: RwLock<Option<LeaseSequence>>,
    prior_read_summary: RwLock<Option<ReadSummary>>,

    pub applied_index: Arc<AtomicU64>,
    pub leases_applied: Arc<AtomicU64>,
    pub leases_ignored: Arc<AtomicU64>,
    pub revocations: Arc<AtomicU64>,
    pub state_version: Arc<AtomicU64>,
}

impl RangeState {
    pub fn new(descriptor: RangeDescriptor) -> Self {
        Self {
            range_id: descriptor.range_id,
            descriptor: RwLock::new(descriptor),
            lease: RwLock::new(Lease::empty()),
            revoked: RwLock::new(None),
            prior_read_summary: RwLock::new(None),

            applied_index: Arc::new(AtomicU64::new(0)),
            leases_applied: Arc::new(AtomicU64::new(0)),
            leases_ignored: Arc::new(AtomicU64::new(0)),
            revocations: Arc::new(AtomicU64::new(0)),
            state_version: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn lease(&self) -> Lease {
        self.lease.read().clone()
    }

    pub fn lease_sequence(&self) -> LeaseSequence {
        self.lease.read().sequence
    }

    pub fn descriptor(&self) -> RangeDescriptor {
        self.descriptor.read().clone()
    }

    pub fn replica_set(&self) -> RangeReplicaSet {
        self.descriptor.read().replicas().clone()
    }

    /// Replaces the descriptor if `descriptor` is a newer generation.
    pub fn set_descriptor(&self, descriptor: RangeDescriptor) -> bool {
        let mut current = self.descriptor.write();
        if descriptor.generation <= current.generation {
            return false;
        }
        *current = descriptor;
        self.increment_version();
        true
    }

    pub fn prior_read_summary(&self) -> Option<ReadSummary> {
        *self.prior_read_summary.read()
    }

    pub fn applied_index(&self) -> u64 {
        self.applied_index.load(Ordering::Acquire)
    }

    /// Installs `lease` as the active lease, clearing any revocation.
    ///
    /// Returns the lease it replaced. Callers check sequences first.
    pub fn install(
        &self,
        lease: Lease,
        prior_read_summary: Option<ReadSummary>,
        applied_index: u64,
    ) -> Lease {
        let previous = {
            let mut current = self.lease.write();
            std::mem::replace(&mut *current, lease)
        };
        *self.revoked.write() = None;
        *self.prior_read_summary.write() = prior_read_summary;
        self.applied_index.fetch_max(applied_index, Ordering::AcqRel);
        self.leases_applied.fetch_add(1, Ordering::Relaxed);
        self.increment_version();
        previous
    }

    pub fn record_ignored(&self) {
        self.leases_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the installed lease as revoked if its sequence is `seq`.
    pub fn revoke(&self, seq: LeaseSequence) -> bool {
        if self.lease.read().sequence != seq {
            return false;
        }
        *self.revoked.write() = Some(seq);
        self.revocations.fetch_add(1, Ordering::Relaxed);
        self.increment_version();
        true
    }

    /// Lifts the revocation of `seq`, after its successor definitely failed
    /// to commit.
    pub fn unrevoke(&self, seq: LeaseSequence) -> bool {
        let mut revoked = self.revoked.write();
        if *revoked != Some(seq) {
            return false;
        }
        *revoked = None;
        self.increment_version();
        true
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.read().is_some()
    }

    /// Status of the installed lease at `now`, given the holder's liveness
    /// epoch.
    pub fn lease_status(&self, now: Timestamp, liveness_epoch: Option<i64>) -> LeaseStatus {
        let lease = self.lease.read();
        if lease.is_empty() {
            return LeaseStatus::Unset;
        }
        if self.is_revoked() {
            return LeaseStatus::Revoked;
        }
        lease.status_at(now, liveness_epoch)
    }

    pub fn get_state_version(&self) -> u64 {
        self.state_version.load(Ordering::Acquire)
    }

    fn increment_version(&self) {
        self.state_version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn get_statistics(&self) -> RangeStatistics {
        RangeStatistics {
            range_id: self.range_id,
            lease_sequence: self.lease_sequence(),
            applied_index: self.applied_index(),
            generation: self.descriptor.read().generation,
            leases_applied: self.leases_applied.load(Ordering::Relaxed),
            leases_ignored: self.leases_ignored.load(Ordering::Relaxed),
            revocations: self.revocations.load(Ordering::Relaxed),
            is_revoked: self.is_revoked(),
            state_version: self.get_state_version(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RangeStatistics {
    pub range_id: RangeId,
    pub lease_sequence: LeaseSequence,
    pub applied_index: u64,
    pub generation: u64,
    pub leases_applied: u64,
    pub leases_ignored: u64,
    pub revocations: u64,
    pub is_revoked: bool,
    pub state_version: u64,
}
