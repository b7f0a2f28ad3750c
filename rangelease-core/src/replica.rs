//! # Replica Set Model
//!
//! Describes which physical replicas participate in a range and in what
//! capacity. A [`RangeReplicaSet`] is an immutable snapshot of one version of
//! the membership; membership changes produce a new set (and bump the
//! [`RangeDescriptor`] generation) rather than mutating an existing one.

use crate::{LeaseError, NodeId, RangeId, ReplicaId, Result, Span, StoreId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Role of a replica in the consensus group.
///
/// The `Voter*` variants other than `VoterFull` only exist while a joint
/// (two-phase) membership change is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaType {
    /// Voter in both the old and the new configuration
    #[default]
    VoterFull,
    /// Voter being added; votes in the new configuration only
    VoterIncoming,
    /// Voter being removed; votes in the old configuration only
    VoterOutgoing,
    /// Voter being demoted to a learner
    VoterDemotingLearner,
    /// Voter being demoted to a non-voter
    VoterDemotingNonVoter,
    /// Catching-up replica that does not vote
    Learner,
    /// Long-lived replica that receives the log but never votes
    NonVoter,
}

impl ReplicaType {
    pub const ALL: [ReplicaType; 7] = [
        ReplicaType::VoterFull,
        ReplicaType::VoterIncoming,
        ReplicaType::VoterOutgoing,
        ReplicaType::VoterDemotingLearner,
        ReplicaType::VoterDemotingNonVoter,
        ReplicaType::Learner,
        ReplicaType::NonVoter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaType::VoterFull => "VOTER_FULL",
            ReplicaType::VoterIncoming => "VOTER_INCOMING",
            ReplicaType::VoterOutgoing => "VOTER_OUTGOING",
            ReplicaType::VoterDemotingLearner => "VOTER_DEMOTING_LEARNER",
            ReplicaType::VoterDemotingNonVoter => "VOTER_DEMOTING_NON_VOTER",
            ReplicaType::Learner => "LEARNER",
            ReplicaType::NonVoter => "NON_VOTER",
        }
    }

    /// Returns true if the replica votes in the incoming configuration.
    pub fn is_voter_new_config(&self) -> bool {
        matches!(self, ReplicaType::VoterFull | ReplicaType::VoterIncoming)
    }

    /// Returns true if the replica votes in the outgoing configuration.
    pub fn is_voter_old_config(&self) -> bool {
        matches!(
            self,
            ReplicaType::VoterFull
                | ReplicaType::VoterOutgoing
                | ReplicaType::VoterDemotingLearner
                | ReplicaType::VoterDemotingNonVoter
        )
    }

    pub fn is_any_voter(&self) -> bool {
        self.is_voter_new_config() || self.is_voter_old_config()
    }
}

impl fmt::Display for ReplicaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical placement and role of one replica of a range.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::replica::{ReplicaDescriptor, ReplicaType};
///
/// let learner = ReplicaDescriptor::new(2, 2, 2, ReplicaType::Learner);
/// assert_eq!(learner.to_string(), "(n2,s2):2LEARNER");
///
/// let voter = ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterFull);
/// assert_eq!(voter.to_string(), "(n1,s1):1");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaDescriptor {
    pub node_id: NodeId,
    pub store_id: StoreId,
    pub replica_id: ReplicaId,
    pub replica_type: ReplicaType,
}

impl ReplicaDescriptor {
    pub fn new(node_id: i32, store_id: i32, replica_id: i32, replica_type: ReplicaType) -> Self {
        Self {
            node_id: NodeId::new(node_id),
            store_id: StoreId::new(store_id),
            replica_id: ReplicaId::new(replica_id),
            replica_type,
        }
    }

    /// Returns true if no field of the descriptor has been set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns a copy of this descriptor with a different role.
    pub fn with_type(mut self, replica_type: ReplicaType) -> Self {
        self.replica_type = replica_type;
        self
    }
}

impl fmt::Display for ReplicaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(n{},s{}):{}",
            self.node_id, self.store_id, self.replica_id
        )?;
        if self.replica_type != ReplicaType::VoterFull {
            write!(f, "{}", self.replica_type)?;
        }
        Ok(())
    }
}

/// One version of a range's membership, unique by replica id.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::replica::{RangeReplicaSet, ReplicaDescriptor, ReplicaType};
/// use rangelease_core::ReplicaId;
///
/// let set = RangeReplicaSet::new(vec![
///     ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterOutgoing),
///     ReplicaDescriptor::new(2, 2, 2, ReplicaType::VoterIncoming),
/// ])
/// .unwrap();
/// assert!(set.has_incoming_voter());
/// assert!(set.get_by_replica_id(ReplicaId::new(2)).is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeReplicaSet {
    descriptors: Vec<ReplicaDescriptor>,
}

impl RangeReplicaSet {
    /// Builds a replica set, rejecting duplicate replica ids.
    pub fn new(descriptors: Vec<ReplicaDescriptor>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(descriptors.len());
        for desc in &descriptors {
            if !seen.insert(desc.replica_id) {
                return Err(LeaseError::InvalidReplicaSet {
                    details: format!("duplicate replica id {}", desc.replica_id),
                });
            }
        }
        Ok(Self { descriptors })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn descriptors(&self) -> &[ReplicaDescriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicaDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get_by_replica_id(&self, replica_id: ReplicaId) -> Option<&ReplicaDescriptor> {
        self.descriptors
            .iter()
            .find(|desc| desc.replica_id == replica_id)
    }

    pub fn get_by_store_id(&self, store_id: StoreId) -> Option<&ReplicaDescriptor> {
        self.descriptors.iter().find(|desc| desc.store_id == store_id)
    }

    /// Returns true if any replica is a voter being added by a joint change.
    pub fn has_incoming_voter(&self) -> bool {
        self.descriptors
            .iter()
            .any(|desc| desc.replica_type == ReplicaType::VoterIncoming)
    }

    /// Voters of the incoming configuration.
    pub fn voters(&self) -> impl Iterator<Item = &ReplicaDescriptor> {
        self.descriptors
            .iter()
            .filter(|desc| desc.replica_type.is_voter_new_config())
    }

    pub fn learners(&self) -> impl Iterator<Item = &ReplicaDescriptor> {
        self.descriptors
            .iter()
            .filter(|desc| desc.replica_type == ReplicaType::Learner)
    }

    pub fn non_voters(&self) -> impl Iterator<Item = &ReplicaDescriptor> {
        self.descriptors
            .iter()
            .filter(|desc| desc.replica_type == ReplicaType::NonVoter)
    }

    /// Returns the next version of the set with one replica's role changed.
    pub fn with_replica_type(&self, replica_id: ReplicaId, replica_type: ReplicaType) -> Result<Self> {
        let mut descriptors = self.descriptors.clone();
        let desc = descriptors
            .iter_mut()
            .find(|desc| desc.replica_id == replica_id)
            .ok_or_else(|| LeaseError::InvalidReplicaSet {
                details: format!("replica {} not in set", replica_id),
            })?;
        desc.replica_type = replica_type;
        Ok(Self { descriptors })
    }

    /// Returns the next version of the set with an additional replica.
    pub fn with_added(&self, desc: ReplicaDescriptor) -> Result<Self> {
        let mut descriptors = self.descriptors.clone();
        descriptors.push(desc);
        Self::new(descriptors)
    }
}

impl fmt::Display for RangeReplicaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, desc) in self.descriptors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", desc)?;
        }
        f.write_str("]")
    }
}

/// Descriptor of a range: its key bounds and current membership.
///
/// `generation` increases every time the membership is replaced, giving the
/// replica sets of a range a total order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub range_id: RangeId,
    pub start_key: Bytes,
    pub end_key: Bytes,
    pub replicas: RangeReplicaSet,
    pub generation: u64,
}

impl RangeDescriptor {
    pub fn new(
        range_id: RangeId,
        start_key: impl Into<Bytes>,
        end_key: impl Into<Bytes>,
        replicas: RangeReplicaSet,
    ) -> Self {
        Self {
            range_id,
            start_key: start_key.into(),
            end_key: end_key.into(),
            replicas,
            generation: 1,
        }
    }

    pub fn replicas(&self) -> &RangeReplicaSet {
        &self.replicas
    }

    /// The full key span of the range.
    pub fn span(&self) -> Span {
        Span::new(self.start_key.clone(), self.end_key.clone())
    }

    /// Returns the next version of the descriptor with a new membership.
    pub fn with_replicas(&self, replicas: RangeReplicaSet) -> Self {
        Self {
            range_id: self.range_id,
            start_key: self.start_key.clone(),
            end_key: self.end_key.clone(),
            replicas,
            generation: self.generation + 1,
        }
    }

    pub fn get_replica_descriptor(&self, store_id: StoreId) -> Option<&ReplicaDescriptor> {
        self.replicas.get_by_store_id(store_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap_set() -> RangeReplicaSet {
        RangeReplicaSet::new(vec![
            ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterOutgoing),
            ReplicaDescriptor::new(2, 2, 2, ReplicaType::VoterIncoming),
            ReplicaDescriptor::new(3, 3, 3, ReplicaType::Learner),
            ReplicaDescriptor::new(4, 4, 4, ReplicaType::NonVoter),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_replica_ids_rejected() {
        let result = RangeReplicaSet::new(vec![
            ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterFull),
            ReplicaDescriptor::new(2, 2, 1, ReplicaType::VoterFull),
        ]);
        assert!(matches!(result, Err(LeaseError::InvalidReplicaSet { .. })));
    }

    #[test]
    fn test_lookups() {
        let set = swap_set();
        assert_eq!(set.len(), 4);
        assert_eq!(
            set.get_by_store_id(StoreId::new(2)).map(|d| d.replica_type),
            Some(ReplicaType::VoterIncoming)
        );
        assert!(set.get_by_replica_id(ReplicaId::new(9)).is_none());
        assert_eq!(set.voters().count(), 1);
        assert_eq!(set.learners().count(), 1);
        assert_eq!(set.non_voters().count(), 1);
        assert!(set.has_incoming_voter());
        assert!(!RangeReplicaSet::empty().has_incoming_voter());
    }

    #[test]
    fn test_replica_type_predicates() {
        assert!(ReplicaType::VoterIncoming.is_voter_new_config());
        assert!(!ReplicaType::VoterIncoming.is_voter_old_config());
        assert!(ReplicaType::VoterDemotingNonVoter.is_voter_old_config());
        assert!(!ReplicaType::Learner.is_any_voter());
        assert!(!ReplicaType::NonVoter.is_any_voter());
    }

    #[test]
    fn test_descriptor_generation_bumps_on_membership_change() {
        let desc = RangeDescriptor::new(RangeId::new(1), "a", "z", swap_set());
        let next = desc.with_replicas(
            desc.replicas()
                .with_replica_type(ReplicaId::new(2), ReplicaType::VoterFull)
                .unwrap(),
        );
        assert_eq!(next.generation, desc.generation + 1);
        assert!(!next.replicas().has_incoming_voter());
        assert_eq!(next.span(), Span::new("a", "z"));
    }

    #[test]
    fn test_with_added_keeps_ids_unique() {
        let set = swap_set();
        assert!(set
            .with_added(ReplicaDescriptor::new(5, 5, 1, ReplicaType::Learner))
            .is_err());
        assert_eq!(
            set.with_added(ReplicaDescriptor::new(5, 5, 5, ReplicaType::Learner))
                .unwrap()
                .len(),
            5
        );
    }
}
