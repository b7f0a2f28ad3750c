use async_trait::async_trait;
use parking_lot::RwLock;
use rangelease_core::{persistence::PersistenceLayer, RangeId, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory range-state store.
///
/// Clones share the same records, so a "restarted" replica can be handed the
/// store its predecessor wrote to.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    ranges: Arc<RwLock<BTreeMap<RangeId, Vec<u8>>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ranges with a saved record.
    pub fn len(&self) -> usize {
        self.ranges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.read().is_empty()
    }
}

#[async_trait]
impl PersistenceLayer for InMemoryPersistence {
    async fn save_range_state(&self, range_id: RangeId, state: &[u8]) -> Result<()> {
        self.ranges.write().insert(range_id, state.to_vec());
        Ok(())
    }

    async fn load_range_state(&self, range_id: RangeId) -> Result<Option<Vec<u8>>> {
        Ok(self.ranges.read().get(&range_id).cloned())
    }

    async fn list_ranges(&self) -> Result<Vec<RangeId>> {
        Ok(self.ranges.read().keys().copied().collect())
    }
}
