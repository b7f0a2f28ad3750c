//! # Lease Record
//!
//! The versioned token naming the replica that may serve consistent reads and
//! propose writes for a range.

use crate::hlc::{ClockTimestamp, Timestamp};
use crate::replica::ReplicaDescriptor;
use crate::{LeaseSequence, StoreId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flavor of lease validity tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseType {
    Expiration,
    Epoch,
}

impl fmt::Display for LeaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseType::Expiration => write!(f, "expiration"),
            LeaseType::Epoch => write!(f, "epoch"),
        }
    }
}

/// Validity window of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseKind {
    /// Valid until a fixed timestamp; must be renewed before then
    Expiration { expiration: Option<Timestamp> },
    /// Valid while the holder's node liveness record stays at this epoch
    Epoch { epoch: i64 },
}

impl Default for LeaseKind {
    fn default() -> Self {
        LeaseKind::Expiration { expiration: None }
    }
}

/// Whether a lease can currently be used by its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseStatus {
    /// No lease has ever been applied to the range
    Unset,
    Valid,
    Expired,
    /// A transfer away from the holder has been evaluated
    Revoked,
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseStatus::Unset => write!(f, "unset"),
            LeaseStatus::Valid => write!(f, "valid"),
            LeaseStatus::Expired => write!(f, "expired"),
            LeaseStatus::Revoked => write!(f, "revoked"),
        }
    }
}

/// A range lease.
///
/// At most one lease per range is active at any instant. The sequence
/// increases by exactly one per lease change and, together with the order of
/// the replicated log, totally orders the holders of a range.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::hlc::ClockTimestamp;
/// use rangelease_core::lease::Lease;
/// use rangelease_core::replica::{ReplicaDescriptor, ReplicaType};
///
/// assert_eq!(Lease::default().to_string(), "<empty>");
///
/// let learner = ReplicaDescriptor::new(2, 2, 2, ReplicaType::Learner);
/// let lease = Lease {
///     replica: learner,
///     ..Lease::default()
/// };
/// assert_eq!(
///     lease.to_string(),
///     "repl=(n2,s2):2LEARNER seq=0 start=0,0 exp=<nil>"
/// );
///
/// let epoch = Lease::new_epoch(learner, ClockTimestamp::new(5, 0), 3);
/// assert_eq!(epoch.epoch(), Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// The replica holding the lease
    pub replica: ReplicaDescriptor,
    /// First timestamp at which the holder may serve
    pub start: ClockTimestamp,
    pub sequence: LeaseSequence,
    pub kind: LeaseKind,
    /// Clock reading when the lease was proposed
    pub proposed_at: Option<ClockTimestamp>,
}

impl Lease {
    pub fn new_expiration(
        replica: ReplicaDescriptor,
        start: ClockTimestamp,
        expiration: Timestamp,
    ) -> Self {
        Self {
            replica,
            start,
            kind: LeaseKind::Expiration {
                expiration: Some(expiration),
            },
            ..Self::default()
        }
    }

    pub fn new_epoch(replica: ReplicaDescriptor, start: ClockTimestamp, epoch: i64) -> Self {
        Self {
            replica,
            start,
            kind: LeaseKind::Epoch { epoch },
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn lease_type(&self) -> LeaseType {
        match self.kind {
            LeaseKind::Expiration { .. } => LeaseType::Expiration,
            LeaseKind::Epoch { .. } => LeaseType::Epoch,
        }
    }

    pub fn expiration(&self) -> Option<Timestamp> {
        match self.kind {
            LeaseKind::Expiration { expiration } => expiration,
            LeaseKind::Epoch { .. } => None,
        }
    }

    pub fn epoch(&self) -> Option<i64> {
        match self.kind {
            LeaseKind::Epoch { epoch } => Some(epoch),
            LeaseKind::Expiration { .. } => None,
        }
    }

    /// Returns true if the lease is held by the replica on `store_id`.
    pub fn owned_by(&self, store_id: StoreId) -> bool {
        !self.is_empty() && self.replica.store_id == store_id
    }

    /// Returns true if both leases name the same holder replica.
    pub fn same_holder(&self, other: &Lease) -> bool {
        !self.is_empty() && !other.is_empty() && self.replica.replica_id == other.replica.replica_id
    }

    /// Moves the start forward to `start`, shifting an expiration by the same
    /// delta so the lease keeps its length. Earlier starts are ignored.
    pub fn forward_start(&mut self, start: ClockTimestamp) {
        if start <= self.start {
            return;
        }
        let delta = start
            .to_timestamp()
            .wall_time
            .saturating_sub(self.start.to_timestamp().wall_time);
        if let LeaseKind::Expiration {
            expiration: Some(expiration),
        } = &mut self.kind
        {
            *expiration = expiration.add(delta, 0);
            if *expiration <= start.to_timestamp() {
                *expiration = start.to_timestamp().next();
            }
        }
        self.start = start;
    }

    /// Returns true if `ts` falls inside the lease's time window. Epoch leases
    /// have no upper bound here; their validity is decided by liveness.
    pub fn covers(&self, ts: Timestamp) -> bool {
        if ts < self.start.to_timestamp() {
            return false;
        }
        match self.kind {
            LeaseKind::Expiration { expiration } => expiration.is_some_and(|exp| ts < exp),
            LeaseKind::Epoch { .. } => true,
        }
    }

    /// Validity of the lease at `now`.
    ///
    /// `liveness_epoch` is the current liveness epoch of the holder's node,
    /// when known; an epoch lease is valid only while it matches.
    pub fn status_at(&self, now: Timestamp, liveness_epoch: Option<i64>) -> LeaseStatus {
        if self.is_empty() {
            return LeaseStatus::Unset;
        }
        let valid = match self.kind {
            LeaseKind::Expiration { expiration } => expiration.is_some_and(|exp| now < exp),
            LeaseKind::Epoch { epoch } => liveness_epoch == Some(epoch),
        };
        if valid {
            LeaseStatus::Valid
        } else {
            LeaseStatus::Expired
        }
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<empty>");
        }
        write!(
            f,
            "repl={} seq={} start={}",
            self.replica, self.sequence, self.start
        )?;
        match self.kind {
            LeaseKind::Expiration {
                expiration: Some(exp),
            } => write!(f, " exp={}", exp)?,
            LeaseKind::Expiration { expiration: None } => f.write_str(" exp=<nil>")?,
            LeaseKind::Epoch { epoch } => write!(f, " epo={}", epoch)?,
        }
        if let Some(proposed_at) = self.proposed_at {
            write!(f, " pro={}", proposed_at)?;
        }
        Ok(())
    }
}
