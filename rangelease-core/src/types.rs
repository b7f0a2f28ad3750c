//! # Core Types
//!
//! Identifiers shared by every layer of the range-lease protocol.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node (a process) in the cluster.
///
/// Node ids are assigned once when the node joins the cluster and never
/// reused. Zero is reserved to mean "unset".
///
/// # Examples
///
/// ```rust
/// use rangelease_core::NodeId;
///
/// let node = NodeId::new(3);
/// assert_eq!(node.value(), 3);
/// assert_eq!(node.to_string(), "3");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub i32);

impl NodeId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a store (a disk) on a node. A node may carry several stores,
/// and each store holds at most one replica of a given range.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StoreId(pub i32);

impl StoreId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a replica within its range.
///
/// A replica keeps its id across type transitions (learner to voter, voter
/// to demoting, ...). Ids are never reused within a range.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReplicaId(pub i32);

impl ReplicaId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a range, a contiguous slice of the key space.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RangeId(pub i64);

impl RangeId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Position of a lease in the total order of lease changes for a range.
///
/// Sequences are assigned by the lease evaluator and increase by exactly one
/// per lease change. The applier uses them to discard re-delivered leases.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::LeaseSequence;
///
/// let seq = LeaseSequence::new(4);
/// assert_eq!(seq.next().value(), 5);
/// assert!(seq.next() > seq);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LeaseSequence(pub u64);

impl LeaseSequence {
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the sequence of the lease that supersedes this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LeaseSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A half-open key span `[key, end_key)`.
///
/// An empty `end_key` denotes the single key `key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub key: Bytes,
    pub end_key: Bytes,
}

impl Span {
    pub fn new(key: impl Into<Bytes>, end_key: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            end_key: end_key.into(),
        }
    }

    /// Returns true if the span addresses a single key.
    pub fn is_point(&self) -> bool {
        self.end_key.is_empty()
    }

    /// Returns true if the two spans share at least one key.
    pub fn overlaps(&self, other: &Span) -> bool {
        let self_end = self.effective_end();
        let other_end = other.effective_end();
        self.key < other_end && other.key < self_end
    }

    fn effective_end(&self) -> Bytes {
        if self.is_point() {
            let mut end = self.key.to_vec();
            end.push(0);
            Bytes::from(end)
        } else {
            self.end_key.clone()
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            write!(f, "{}", String::from_utf8_lossy(&self.key))
        } else {
            write!(
                f,
                "[{}, {})",
                String::from_utf8_lossy(&self.key),
                String::from_utf8_lossy(&self.end_key)
            )
        }
    }
}
