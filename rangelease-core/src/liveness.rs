//! Node liveness epochs, which decide the validity of epoch-based leases.

use crate::NodeId;
use dashmap::DashMap;

/// Source of node liveness epochs.
pub trait NodeLiveness: Send + Sync {
    /// Current liveness epoch of `node_id`, or `None` if the node has no
    /// live liveness record.
    fn epoch(&self, node_id: NodeId) -> Option<i64>;
}

/// Liveness table whose epochs are set explicitly.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::liveness::{NodeLiveness, StaticLiveness};
/// use rangelease_core::NodeId;
///
/// let liveness = StaticLiveness::new();
/// liveness.set_epoch(NodeId::new(1), 3);
/// assert_eq!(liveness.epoch(NodeId::new(1)), Some(3));
/// liveness.increment_epoch(NodeId::new(1));
/// assert_eq!(liveness.epoch(NodeId::new(1)), Some(4));
/// ```
#[derive(Debug, Default)]
pub struct StaticLiveness {
    epochs: DashMap<NodeId, i64>,
}

impl StaticLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_epoch(&self, node_id: NodeId, epoch: i64) {
        self.epochs.insert(node_id, epoch);
    }

    /// Bumps the node's epoch, invalidating every epoch lease it holds.
    pub fn increment_epoch(&self, node_id: NodeId) -> i64 {
        let mut entry = self.epochs.entry(node_id).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn mark_dead(&self, node_id: NodeId) {
        self.epochs.remove(&node_id);
    }
}

impl NodeLiveness for StaticLiveness {
    fn epoch(&self, node_id: NodeId) -> Option<i64> {
        self.epochs.get(&node_id).map(|e| *e)
    }
}
