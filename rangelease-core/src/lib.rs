//! # Rangelease Core - Range Lease Data Model
//!
//! Core types for the range-lease protocol of a replicated key-value store:
//! the mechanism that lets exactly one replica of a range serve consistent
//! reads and propose writes without consulting the other replicas.
//!
//! ## Components
//!
//! - **Replica Set Model**: replica roles, descriptors and versioned replica sets
//! - **Lease Record**: the sequenced token naming the current leaseholder
//! - **Eligibility Checker**: pure decision over which replica may hold a lease
//! - **Read Summaries**: bounds on what a leaseholder may already have served
//! - **Hybrid Logical Clock**: timestamps and injectable clocks
//! - **Seams**: consensus log, node liveness and durable state traits
//! - **Recovery**: loss-of-quorum replica collection
//!
//! ## Checking Eligibility
//!
//! ```rust
//! use rangelease_core::eligibility::check_can_receive_lease;
//! use rangelease_core::replica::{RangeReplicaSet, ReplicaDescriptor, ReplicaType};
//!
//! let leaseholder = ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterFull);
//! let learner = ReplicaDescriptor::new(2, 2, 2, ReplicaType::Learner);
//! let replicas = RangeReplicaSet::new(vec![leaseholder, learner])?;
//!
//! assert!(check_can_receive_lease(&leaseholder, &replicas, true).is_ok());
//! assert!(check_can_receive_lease(&learner, &replicas, false).is_err());
//! # Ok::<(), rangelease_core::LeaseError>(())
//! ```
//!
//! Evaluation, application and serving live in `rangelease-engine`.

pub mod consensus;
pub mod eligibility;
pub mod error;
pub mod hlc;
pub mod lease;
pub mod liveness;
pub mod persistence;
pub mod read_summary;
pub mod recovery;
pub mod replica;
pub mod serialization;
pub mod types;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::*;
pub use types::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::check_can_receive_lease;
    use crate::hlc::{Clock, HybridClock, ManualTime};
    use crate::lease::Lease;
    use crate::replica::{RangeReplicaSet, ReplicaDescriptor, ReplicaType};

    #[test]
    fn test_basic_types() {
        let range_id = RangeId::new(1);
        let seq = LeaseSequence::new(1);

        assert_eq!(range_id.value(), 1);
        assert_eq!(seq.next().value(), 2);
    }

    #[test]
    fn test_learner_cannot_take_lease_from_voter() {
        let voter = ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterFull);
        let learner = ReplicaDescriptor::new(2, 2, 2, ReplicaType::Learner);
        let replicas = RangeReplicaSet::new(vec![voter, learner]).unwrap();

        let clock = HybridClock::for_testing(ManualTime::new(1_000));
        let mut lease = Lease::new_epoch(voter, clock.now(), 1);
        lease.sequence = LeaseSequence::new(1);
        assert!(lease.validate().is_ok());

        let err: LeaseError = check_can_receive_lease(&learner, &replicas, false)
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), LeaseErrorKind::ReplicaCannotHoldLease);
        assert!(!err.is_retryable());
    }
}
