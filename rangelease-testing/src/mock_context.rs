//! A hand-configured evaluation context for driving the evaluator directly.

use parking_lot::Mutex;
use rangelease_core::hlc::{Clock, HybridClock, ManualTime};
use rangelease_core::lease::Lease;
use rangelease_core::read_summary::ReadSummary;
use rangelease_core::replica::{RangeReplicaSet, ReplicaDescriptor};
use rangelease_core::{LeaseSequence, RangeId, Result, StoreId};
use rangelease_engine::EvalContext;

/// Evaluation context with a fixed replica set, installed lease and read
/// summary. Records the revocation requested by the evaluator.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::lease::Lease;
/// use rangelease_core::replica::{ReplicaDescriptor, ReplicaType};
/// use rangelease_engine::{evaluator, RequestLeaseRequest};
/// use rangelease_testing::MockEvalContext;
///
/// let voter = ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterFull);
/// let ctx = MockEvalContext::new(vec![voter], Lease::empty()).unwrap();
/// let lease = Lease { replica: voter, ..Lease::default() };
/// let result = evaluator::request_lease(&ctx, RequestLeaseRequest { lease }).unwrap();
/// assert_eq!(result.lease().sequence.value(), 1);
/// ```
pub struct MockEvalContext {
    pub range_id: RangeId,
    pub store_id: StoreId,
    pub replicas: RangeReplicaSet,
    pub clock: HybridClock<ManualTime>,
    pub lease: Lease,
    pub read_summary: ReadSummary,
    revoked: Mutex<Option<LeaseSequence>>,
}

impl MockEvalContext {
    /// A context on store 1 of range 1 whose clock reads 123ns.
    pub fn new(replicas: Vec<ReplicaDescriptor>, lease: Lease) -> Result<Self> {
        Ok(Self {
            range_id: RangeId::new(1),
            store_id: StoreId::new(1),
            replicas: RangeReplicaSet::new(replicas)?,
            clock: HybridClock::for_testing(ManualTime::new(123)),
            lease,
            read_summary: ReadSummary::default(),
            revoked: Mutex::new(None),
        })
    }

    pub fn with_read_summary(mut self, read_summary: ReadSummary) -> Self {
        self.read_summary = read_summary;
        self
    }

    pub fn with_store(mut self, store_id: StoreId) -> Self {
        self.store_id = store_id;
        self
    }

    /// Sequence of the lease revoked by the last evaluation, if any.
    pub fn revoked_lease_seq(&self) -> Option<LeaseSequence> {
        *self.revoked.lock()
    }
}

impl EvalContext for MockEvalContext {
    fn range_id(&self) -> RangeId {
        self.range_id
    }

    fn store_id(&self) -> StoreId {
        self.store_id
    }

    fn replica_set(&self) -> RangeReplicaSet {
        self.replicas.clone()
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }

    fn current_lease(&self) -> Lease {
        self.lease.clone()
    }

    fn current_read_summary(&self) -> ReadSummary {
        self.read_summary
    }

    fn revoke_lease(&self, seq: LeaseSequence) {
        *self.revoked.lock() = Some(seq);
    }
}
