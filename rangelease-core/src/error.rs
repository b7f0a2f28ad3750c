//! # Error Types
//!
//! Error taxonomy of the range-lease protocol.

use crate::eligibility::IneligibleReason;
use crate::lease::Lease;
use crate::{LeaseSequence, RangeId};
use thiserror::Error;

/// Why a RequestLease evaluation refused to replace the current lease.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// The requesting replica may not hold the lease
    #[error(transparent)]
    Ineligible(#[from] IneligibleReason),

    /// An extension by the current holder tried to move the start backwards
    #[error("extension moved start timestamp backwards")]
    StartMovedBackwards,
}

/// Errors that can occur while evaluating, committing, applying or serving
/// under a range lease.
///
/// Every category a caller must react to differently has its own variant and
/// its own [`LeaseErrorKind`], so retries never depend on string matching.
///
/// # Error Categories
///
/// - **Eligibility**: the target replica may not hold the lease
/// - **Concurrency**: a concurrent lease change won the race
/// - **Commit**: the consensus step failed or its outcome is unknown
/// - **Serving**: a command ran under a lease that is no longer active
/// - **Integrity**: persisted state failed its checksum
///
/// # Examples
///
/// ```rust
/// use rangelease_core::{LeaseError, LeaseErrorKind, LeaseSequence};
///
/// let error = LeaseError::StaleLeaseSequence {
///     expected: LeaseSequence::new(4),
///     actual: LeaseSequence::new(5),
/// };
/// assert_eq!(error.kind(), LeaseErrorKind::StaleLeaseSequence);
/// assert!(error.is_retryable());
///
/// let ambiguous = LeaseError::ambiguous_commit("proposal timed out");
/// assert!(!ambiguous.is_retryable());
/// assert!(ambiguous.requires_state_check());
/// ```
#[derive(Error, Debug)]
pub enum LeaseError {
    /// A RequestLease evaluation was refused
    #[error("cannot replace lease {prev} with {requested}: {reason}")]
    LeaseRejected {
        prev: Box<Lease>,
        requested: Box<Lease>,
        reason: RejectionReason,
    },

    /// The transfer target may not hold the lease
    #[error(transparent)]
    Ineligible(#[from] IneligibleReason),

    /// The caller's view of the previous lease is out of date
    #[error("stale lease sequence: expected previous lease {expected}, found {actual}")]
    StaleLeaseSequence {
        expected: LeaseSequence,
        actual: LeaseSequence,
    },

    /// Evaluation was cancelled before its result was committed
    #[error("lease evaluation cancelled: {reason}")]
    EvaluationCancelled { reason: String },

    /// Consensus definitively rejected the proposal
    #[error("lease proposal failed: {message}")]
    CommitFailed { message: String },

    /// The outcome of the proposal is unknown
    #[error("lease proposal outcome is ambiguous: {message}")]
    AmbiguousCommit { message: String },

    /// The command was stamped under a lease that is not the active one
    #[error("not lease holder for {range_id}; current lease is {lease}")]
    NotLeaseHolder { range_id: RangeId, lease: Box<Lease> },

    /// A replica set violates its structural invariants
    #[error("invalid replica set: {details}")]
    InvalidReplicaSet { details: String },

    /// A lease or descriptor failed validation
    #[error("invalid lease: {details}")]
    InvalidLease { details: String },

    /// Data integrity check failed due to checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Persistent storage operation failure
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// JSON serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File system I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification of a [`LeaseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseErrorKind {
    ReplicaNotFound,
    ReplicaCannotHoldLease,
    LeaseRejected,
    StaleLeaseSequence,
    EvaluationCancelled,
    CommitFailed,
    AmbiguousCommit,
    NotLeaseHolder,
    InvalidInput,
    Storage,
    Internal,
}

pub type Result<T> = std::result::Result<T, LeaseError>;

impl LeaseError {
    /// Builds the RequestLease rejection error.
    pub fn rejected(prev: &Lease, requested: &Lease, reason: impl Into<RejectionReason>) -> Self {
        Self::LeaseRejected {
            prev: Box::new(prev.clone()),
            requested: Box::new(requested.clone()),
            reason: reason.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::EvaluationCancelled {
            reason: reason.into(),
        }
    }

    pub fn commit_failed(message: impl Into<String>) -> Self {
        Self::CommitFailed {
            message: message.into(),
        }
    }

    pub fn ambiguous_commit(message: impl Into<String>) -> Self {
        Self::AmbiguousCommit {
            message: message.into(),
        }
    }

    pub fn not_lease_holder(range_id: RangeId, lease: &Lease) -> Self {
        Self::NotLeaseHolder {
            range_id,
            lease: Box::new(lease.clone()),
        }
    }

    pub fn invalid_lease(details: impl Into<String>) -> Self {
        Self::InvalidLease {
            details: details.into(),
        }
    }

    /// Creates a new persistence error with the given message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rangelease_core::LeaseError;
    ///
    /// let error = LeaseError::persistence("Disk full");
    /// assert_eq!(error.to_string(), "Persistence error: Disk full");
    /// ```
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a serialization error for non-JSON codecs.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Internal {
            message: format!("Serialization error: {}", message.into()),
        }
    }

    pub fn kind(&self) -> LeaseErrorKind {
        fn ineligible_kind(reason: &IneligibleReason) -> LeaseErrorKind {
            match reason {
                IneligibleReason::ReplicaNotFound { .. } => LeaseErrorKind::ReplicaNotFound,
                IneligibleReason::ReplicaTypeCannotHoldLease { .. }
                | IneligibleReason::ReplicaCannotHoldLease { .. } => {
                    LeaseErrorKind::ReplicaCannotHoldLease
                }
            }
        }

        match self {
            Self::LeaseRejected { reason, .. } => match reason {
                RejectionReason::Ineligible(inner) => ineligible_kind(inner),
                RejectionReason::StartMovedBackwards => LeaseErrorKind::LeaseRejected,
            },
            Self::Ineligible(reason) => ineligible_kind(reason),
            Self::StaleLeaseSequence { .. } => LeaseErrorKind::StaleLeaseSequence,
            Self::EvaluationCancelled { .. } => LeaseErrorKind::EvaluationCancelled,
            Self::CommitFailed { .. } => LeaseErrorKind::CommitFailed,
            Self::AmbiguousCommit { .. } => LeaseErrorKind::AmbiguousCommit,
            Self::NotLeaseHolder { .. } => LeaseErrorKind::NotLeaseHolder,
            Self::InvalidReplicaSet { .. } | Self::InvalidLease { .. } => {
                LeaseErrorKind::InvalidInput
            }
            Self::ChecksumMismatch { .. }
            | Self::Persistence { .. }
            | Self::Serialization(_)
            | Self::Io(_) => LeaseErrorKind::Storage,
            Self::Internal { .. } => LeaseErrorKind::Internal,
        }
    }

    /// Returns the eligibility failure behind this error, if any.
    pub fn ineligible_reason(&self) -> Option<&IneligibleReason> {
        match self {
            Self::Ineligible(reason) => Some(reason),
            Self::LeaseRejected {
                reason: RejectionReason::Ineligible(reason),
                ..
            } => Some(reason),
            _ => None,
        }
    }

    /// Determines if the operation may be retried after re-reading the
    /// current lease, without any membership change.
    ///
    /// Commit failures are not retryable here: see
    /// [`LeaseError::requires_state_check`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StaleLeaseSequence { .. }
                | Self::EvaluationCancelled { .. }
                | Self::NotLeaseHolder { .. }
        )
    }

    /// Returns true when the caller cannot know whether the lease changed and
    /// must read committed state before retrying.
    pub fn requires_state_check(&self) -> bool {
        matches!(
            self,
            Self::CommitFailed { .. } | Self::AmbiguousCommit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::{ReplicaDescriptor, ReplicaType};
    use crate::ReplicaId;

    #[test]
    fn test_rejection_message_for_missing_replica() {
        let err = LeaseError::rejected(
            &Lease::empty(),
            &Lease::empty(),
            IneligibleReason::ReplicaNotFound {
                replica_id: ReplicaId::new(0),
            },
        );
        assert_eq!(
            err.to_string(),
            "cannot replace lease <empty> with <empty>: replica not found in RangeDescriptor"
        );
        assert_eq!(err.kind(), LeaseErrorKind::ReplicaNotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rejection_message_for_learner() {
        let learner = ReplicaDescriptor::new(2, 2, 2, ReplicaType::Learner);
        let requested = Lease {
            replica: learner,
            ..Lease::default()
        };
        let err = LeaseError::rejected(
            &Lease::empty(),
            &requested,
            IneligibleReason::ReplicaTypeCannotHoldLease {
                replica_type: ReplicaType::Learner,
            },
        );
        assert_eq!(
            err.to_string(),
            "cannot replace lease <empty> with repl=(n2,s2):2LEARNER seq=0 start=0,0 exp=<nil>: replica cannot hold lease"
        );
        assert_eq!(err.kind(), LeaseErrorKind::ReplicaCannotHoldLease);
        assert!(err.ineligible_reason().is_some());
    }

    #[test]
    fn test_transfer_ineligible_is_transparent() {
        let err: LeaseError = IneligibleReason::ReplicaCannotHoldLease {
            replica_type: ReplicaType::VoterOutgoing,
        }
        .into();
        assert_eq!(err.to_string(), "replica cannot hold lease");
        assert_eq!(err.kind(), LeaseErrorKind::ReplicaCannotHoldLease);
    }

    #[test]
    fn test_retry_classification() {
        assert!(LeaseError::cancelled("deadline").is_retryable());
        assert!(LeaseError::not_lease_holder(RangeId::new(1), &Lease::empty()).is_retryable());
        assert!(!LeaseError::commit_failed("rejected").is_retryable());
        assert!(LeaseError::commit_failed("rejected").requires_state_check());
        assert!(!LeaseError::cancelled("deadline").requires_state_check());
        assert_eq!(
            LeaseError::ChecksumMismatch {
                expected: 1,
                actual: 2
            }
            .kind(),
            LeaseErrorKind::Storage
        );
    }

    #[test]
    fn test_start_moved_backwards_kind() {
        let err = LeaseError::rejected(
            &Lease::empty(),
            &Lease::empty(),
            RejectionReason::StartMovedBackwards,
        );
        assert_eq!(err.kind(), LeaseErrorKind::LeaseRejected);
        assert!(err
            .to_string()
            .ends_with("extension moved start timestamp backwards"));
    }
}
