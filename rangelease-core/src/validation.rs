use crate::lease::{Lease, LeaseKind};
use crate::replica::{RangeDescriptor, RangeReplicaSet, ReplicaDescriptor};
use crate::{LeaseError, LeaseSequence, Result};
use std::collections::HashSet;

pub trait Validator {
    fn validate(&self) -> Result<()>;
}

impl Validator for ReplicaDescriptor {
    fn validate(&self) -> Result<()> {
        if self.node_id.value() <= 0 || self.store_id.value() <= 0 || self.replica_id.value() <= 0
        {
            return Err(LeaseError::InvalidReplicaSet {
                details: format!("replica {} has an unset id", self),
            });
        }
        Ok(())
    }
}

impl Validator for RangeReplicaSet {
    fn validate(&self) -> Result<()> {
        let mut replica_ids = HashSet::new();
        let mut store_ids = HashSet::new();
        for desc in self.iter() {
            desc.validate()?;
            if !replica_ids.insert(desc.replica_id) {
                return Err(LeaseError::InvalidReplicaSet {
                    details: format!("duplicate replica id {}", desc.replica_id),
                });
            }
            // A store holds at most one replica of a range.
            if !store_ids.insert(desc.store_id) {
                return Err(LeaseError::InvalidReplicaSet {
                    details: format!("store s{} holds more than one replica", desc.store_id),
                });
            }
        }
        Ok(())
    }
}

impl Validator for RangeDescriptor {
    fn validate(&self) -> Result<()> {
        if self.range_id.value() <= 0 {
            return Err(LeaseError::InvalidReplicaSet {
                details: format!("range id {} is not positive", self.range_id.value()),
            });
        }
        if !self.end_key.is_empty() && self.start_key >= self.end_key {
            return Err(LeaseError::InvalidReplicaSet {
                details: format!("{}: start key is not before end key", self.range_id),
            });
        }
        self.replicas().validate()
    }
}

/// Validates a lease about to be proposed or applied.
impl Validator for Lease {
    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(LeaseError::invalid_lease("lease is empty"));
        }
        if self.replica.replica_id.value() <= 0 {
            return Err(LeaseError::invalid_lease(format!(
                "lease {} does not name a replica",
                self
            )));
        }
        match self.kind {
            LeaseKind::Epoch { epoch } if epoch <= 0 => Err(LeaseError::invalid_lease(format!(
                "epoch lease {} has non-positive epoch",
                self
            ))),
            LeaseKind::Expiration {
                expiration: Some(exp),
            } if exp <= self.start.to_timestamp() => Err(LeaseError::invalid_lease(format!(
                "lease {} expires before it starts",
                self
            ))),
            LeaseKind::Expiration { expiration: None } => Err(LeaseError::invalid_lease(format!(
                "expiration lease {} has no expiration",
                self
            ))),
            _ => Ok(()),
        }
    }
}

/// Checks that `next` directly supersedes `previous`.
pub fn validate_lease_sequence(previous: LeaseSequence, next: LeaseSequence) -> Result<()> {
    if next != previous.next() {
        return Err(LeaseError::StaleLeaseSequence {
            expected: previous.next(),
            actual: next,
        });
    }
    Ok(())
}
