//! Seam to the replicated log.
//!
//! The lease protocol treats consensus as an opaque, possibly slow, possibly
//! failing proposal step. A lease only takes effect once its
//! [`ReplicatedLeaseEffect`] has been committed and handed back to the
//! applier.

use crate::lease::Lease;
use crate::read_summary::ReadSummary;
use crate::{LeaseSequence, RangeId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The state change proposed through consensus for a lease change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedLeaseEffect {
    pub range_id: RangeId,
    pub lease: Lease,
    /// Set only for transfers: what the predecessor may have served
    pub prior_read_summary: Option<ReadSummary>,
    /// Sequence of the lease revoked during evaluation, if any
    pub revoked_lease_seq: Option<LeaseSequence>,
}

/// Position of a committed entry in the replicated log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Committed {
    pub index: u64,
}

/// Proposal interface of the replicated log.
///
/// Implementations return `LeaseError::CommitFailed` when the proposal was
/// definitely not committed and `LeaseError::AmbiguousCommit` when the outcome
/// is unknown.
#[async_trait]
pub trait ConsensusLog: Send + Sync {
    async fn propose(&self, effect: ReplicatedLeaseEffect) -> Result<Committed>;
}
