//! Inputs and outputs of lease evaluation.

use rangelease_core::consensus::ReplicatedLeaseEffect;
use rangelease_core::hlc::Clock;
use rangelease_core::lease::Lease;
use rangelease_core::read_summary::ReadSummary;
use rangelease_core::replica::RangeReplicaSet;
use rangelease_core::{LeaseSequence, RangeId, StoreId};

/// View of a range available to the evaluator while it holds the range's
/// exclusive latch.
pub trait EvalContext: Send + Sync {
    fn range_id(&self) -> RangeId;

    /// Store of the evaluating replica.
    fn store_id(&self) -> StoreId;

    /// The current membership of the range.
    fn replica_set(&self) -> RangeReplicaSet;

    fn clock(&self) -> &dyn Clock;

    /// The lease currently installed on the evaluating replica.
    fn current_lease(&self) -> Lease;

    /// Reads served under the current lease.
    fn current_read_summary(&self) -> ReadSummary;

    /// Stops the evaluating replica from serving under the lease with
    /// sequence `seq` until a successor is applied.
    fn revoke_lease(&self, seq: LeaseSequence);
}

/// Arguments of a RequestLease command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLeaseRequest {
    pub lease: Lease,
}

/// Arguments of a TransferLease command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLeaseRequest {
    /// Candidate lease for the target; its start is recomputed at evaluation
    pub lease: Lease,
    /// The lease the caller expects to replace
    pub prev_lease: Lease,
}

/// Outcome of a successful evaluation, to be proposed through consensus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseEvalResult {
    pub replicated: ReplicatedLeaseEffect,
}

impl LeaseEvalResult {
    pub fn lease(&self) -> &Lease {
        &self.replicated.lease
    }

    pub fn prior_read_summary(&self) -> Option<ReadSummary> {
        self.replicated.prior_read_summary
    }

    pub fn revoked_lease_seq(&self) -> Option<LeaseSequence> {
        self.replicated.revoked_lease_seq
    }
}
