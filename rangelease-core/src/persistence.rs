use crate::lease::Lease;
use crate::read_summary::ReadSummary;
use crate::serialization::Serializer;
use crate::{RangeId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lease-related state of a range that must survive a restart.
///
/// Written by the lease applier before a lease is installed in memory, so a
/// replica that restarts never serves under a lease older than one it has
/// already acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableRangeState {
    pub range_id: RangeId,
    pub lease: Lease,
    /// Read summary handed over by the previous leaseholder, if the current
    /// lease was obtained by transfer
    pub prior_read_summary: Option<ReadSummary>,
    /// Log index at which `lease` was committed
    pub applied_index: u64,
}

impl DurableRangeState {
    pub fn new(
        range_id: RangeId,
        lease: Lease,
        prior_read_summary: Option<ReadSummary>,
        applied_index: u64,
    ) -> Self {
        Self {
            range_id,
            lease,
            prior_read_summary,
            applied_index,
        }
    }

    /// Serialize the range state into a checksummed binary frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(Serializer::binary().encode_framed(self)?.to_vec())
    }

    /// Deserialize range state, verifying its checksum.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Serializer::binary().decode_framed(data)
    }
}

/// Durable store for per-range lease state.
///
/// Each range owns one record; saving replaces the previous record atomically.
#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    /// Save the encoded state of `range_id`.
    ///
    /// # Returns
    /// * `Ok(())` if the state was successfully saved
    /// * `Err(LeaseError)` if the save operation failed
    async fn save_range_state(&self, range_id: RangeId, state: &[u8]) -> Result<()>;

    /// Load the encoded state of `range_id`.
    ///
    /// # Returns
    /// * `Ok(Some(state))` if state was found and loaded successfully
    /// * `Ok(None)` if the range has never been saved
    /// * `Err(LeaseError)` if the load operation failed
    async fn load_range_state(&self, range_id: RangeId) -> Result<Option<Vec<u8>>>;

    /// Ranges with saved state, in ascending order.
    async fn list_ranges(&self) -> Result<Vec<RangeId>>;
}
