//! # Eligibility Checker
//!
//! Decides whether a replica may legally become leaseholder given the current
//! replica set. The checker is pure: it reads nothing but its arguments.
//!
//! During an atomic membership swap a departing voter may keep the lease
//! only long enough to hand it to the incoming voter. The decision table is:
//!
//! | Role                       | Incoming voter needed | Must be last holder |
//! |----------------------------|-----------------------|---------------------|
//! | `VOTER_FULL`               | no                    | no                  |
//! | `VOTER_INCOMING`           | no                    | no                  |
//! | `VOTER_OUTGOING`           | yes                   | yes                 |
//! | `VOTER_DEMOTING_LEARNER`   | yes                   | yes                 |
//! | `VOTER_DEMOTING_NON_VOTER` | yes                   | no                  |
//! | `LEARNER`, `NON_VOTER`     | never eligible        |                     |

use crate::replica::{RangeReplicaSet, ReplicaDescriptor, ReplicaType};
use crate::ReplicaId;
use thiserror::Error;

/// Why a replica cannot receive a lease.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    /// The candidate is not part of the replica set
    #[error("replica not found in RangeDescriptor")]
    ReplicaNotFound { replica_id: ReplicaId },

    /// The candidate's role never participates in the write quorum
    #[error("replica cannot hold lease")]
    ReplicaTypeCannotHoldLease { replica_type: ReplicaType },

    /// The candidate is a leaving voter without the conditions that allow it
    /// to keep the lease
    #[error("replica cannot hold lease")]
    ReplicaCannotHoldLease { replica_type: ReplicaType },
}

impl IneligibleReason {
    /// Returns true for both flavors of role-based rejection.
    pub fn is_cannot_hold_lease(&self) -> bool {
        matches!(
            self,
            Self::ReplicaTypeCannotHoldLease { .. } | Self::ReplicaCannotHoldLease { .. }
        )
    }
}

/// Checks whether `candidate` may receive the lease under `replica_set`.
///
/// The candidate is located by replica id and the type recorded in the set is
/// authoritative; the type carried by `candidate` itself is ignored.
/// `was_last_leaseholder` tells whether the candidate held the lease going
/// into the current membership change.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::eligibility::{check_can_receive_lease, IneligibleReason};
/// use rangelease_core::replica::{RangeReplicaSet, ReplicaDescriptor, ReplicaType};
///
/// let outgoing = ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterOutgoing);
/// let incoming = ReplicaDescriptor::new(2, 2, 2, ReplicaType::VoterIncoming);
/// let set = RangeReplicaSet::new(vec![outgoing, incoming]).unwrap();
///
/// assert!(check_can_receive_lease(&outgoing, &set, true).is_ok());
/// assert!(check_can_receive_lease(&outgoing, &set, false).is_err());
///
/// let missing = ReplicaDescriptor::new(9, 9, 9, ReplicaType::VoterFull);
/// assert!(matches!(
///     check_can_receive_lease(&missing, &RangeReplicaSet::empty(), false),
///     Err(IneligibleReason::ReplicaNotFound { .. })
/// ));
/// ```
pub fn check_can_receive_lease(
    candidate: &ReplicaDescriptor,
    replica_set: &RangeReplicaSet,
    was_last_leaseholder: bool,
) -> std::result::Result<(), IneligibleReason> {
    let Some(repl) = replica_set.get_by_replica_id(candidate.replica_id) else {
        return Err(IneligibleReason::ReplicaNotFound {
            replica_id: candidate.replica_id,
        });
    };

    let replica_type = repl.replica_type;
    let allowed = match replica_type {
        ReplicaType::Learner | ReplicaType::NonVoter => {
            return Err(IneligibleReason::ReplicaTypeCannotHoldLease { replica_type });
        }
        ReplicaType::VoterFull | ReplicaType::VoterIncoming => true,
        ReplicaType::VoterOutgoing | ReplicaType::VoterDemotingLearner => {
            replica_set.has_incoming_voter() && was_last_leaseholder
        }
        ReplicaType::VoterDemotingNonVoter => replica_set.has_incoming_voter(),
    };

    if allowed {
        Ok(())
    } else {
        Err(IneligibleReason::ReplicaCannotHoldLease { replica_type })
    }
}
