//! # Loss-of-Quorum Replica Collection
//!
//! When a range loses quorum its metadata has to be rebuilt from whatever
//! replicas survive. This module gathers per-node replica reports into a
//! single [`ClusterReplicaInfo`] and tallies what was seen.
//!
//! Node reports arrive as streams that may break part way. Restarting a
//! node's stream discards everything already received from it, so a retried
//! stream never double counts replicas.

use crate::lease::Lease;
use crate::replica::RangeDescriptor;
use crate::{LeaseError, NodeId, RangeId, Result, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

/// State of one replica as reported by its store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub node_id: NodeId,
    pub store_id: StoreId,
    pub desc: RangeDescriptor,
    pub applied_index: u64,
    /// Last lease applied by this replica
    pub lease: Option<Lease>,
}

impl ReplicaInfo {
    pub fn range_id(&self) -> RangeId {
        self.desc.range_id
    }
}

/// Replicas reported by a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReplicaInfo {
    pub replicas: Vec<ReplicaInfo>,
}

/// Distinct entities found in a [`ClusterReplicaInfo`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterInfoCounters {
    pub nodes: usize,
    pub stores: usize,
    pub replicas: usize,
    pub descriptors: usize,
}

/// Everything collected from the surviving part of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterReplicaInfo {
    pub cluster_id: String,
    /// Range descriptors read from cluster metadata, one per range
    pub descriptors: Vec<RangeDescriptor>,
    pub local_info: Vec<NodeReplicaInfo>,
}

impl ClusterReplicaInfo {
    pub fn counters(&self) -> ClusterInfoCounters {
        let mut nodes = HashSet::new();
        let mut stores = HashSet::new();
        let mut replicas = 0;
        for node in &self.local_info {
            for replica in &node.replicas {
                nodes.insert(replica.node_id);
                stores.insert(replica.store_id);
            }
            replicas += node.replicas.len();
        }
        ClusterInfoCounters {
            nodes: nodes.len(),
            stores: stores.len(),
            replicas,
            descriptors: self.descriptors.len(),
        }
    }

    /// The newest lease any surviving replica applied, per range.
    ///
    /// Sequences totally order the leases of a range, so the highest one seen
    /// is the most recent lease known to the survivors.
    pub fn latest_leases(&self) -> BTreeMap<RangeId, Lease> {
        let mut latest: BTreeMap<RangeId, Lease> = BTreeMap::new();
        for replica in self.local_info.iter().flat_map(|n| n.replicas.iter()) {
            let Some(lease) = &replica.lease else {
                continue;
            };
            let newer = latest
                .get(&replica.range_id())
                .map_or(true, |current| lease.sequence > current.sequence);
            if newer {
                latest.insert(replica.range_id(), lease.clone());
            }
        }
        latest
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Totals observed during a collection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub nodes: usize,
    pub stores: usize,
    pub descriptors: usize,
}

/// Accumulates replica reports from node streams and range descriptors from
/// metadata.
///
/// # Examples
///
/// ```rust
/// use rangelease_core::recovery::{ReplicaInfo, ReplicaInfoCollector};
/// use rangelease_core::replica::{RangeDescriptor, RangeReplicaSet, ReplicaDescriptor, ReplicaType};
/// use rangelease_core::{NodeId, RangeId, StoreId};
///
/// let set = RangeReplicaSet::new(vec![ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterFull)]).unwrap();
/// let desc = RangeDescriptor::new(RangeId::new(1), "a", "b", set);
///
/// let mut collector = ReplicaInfoCollector::new();
/// collector.begin_node(NodeId::new(1));
/// collector
///     .add_replica(ReplicaInfo {
///         node_id: NodeId::new(1),
///         store_id: StoreId::new(1),
///         desc: desc.clone(),
///         applied_index: 10,
///         lease: None,
///     })
///     .unwrap();
/// collector.finish_node(NodeId::new(1)).unwrap();
/// collector.add_descriptor(desc);
///
/// let (info, stats) = collector.finish();
/// assert_eq!(stats.nodes, 1);
/// assert_eq!(info.counters().replicas, 1);
/// ```
#[derive(Debug)]
pub struct ReplicaInfoCollector {
    cluster_id: Uuid,
    descriptors: BTreeMap<RangeId, RangeDescriptor>,
    open: HashMap<NodeId, Vec<ReplicaInfo>>,
    finished: BTreeMap<NodeId, Vec<ReplicaInfo>>,
}

impl Default for ReplicaInfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaInfoCollector {
    pub fn new() -> Self {
        Self::with_cluster_id(Uuid::new_v4())
    }

    pub fn with_cluster_id(cluster_id: Uuid) -> Self {
        Self {
            cluster_id,
            descriptors: BTreeMap::new(),
            open: HashMap::new(),
            finished: BTreeMap::new(),
        }
    }

    /// Starts (or restarts) the replica stream of `node_id`.
    ///
    /// Any data already received from the node is dropped.
    pub fn begin_node(&mut self, node_id: NodeId) {
        let previous_open = self.open.insert(node_id, Vec::new());
        let previous_finished = self.finished.remove(&node_id);
        let discarded = previous_open.map_or(0, |r| r.len()) + previous_finished.map_or(0, |r| r.len());
        if discarded > 0 {
            warn!(
                "Restarting replica stream of node {}, discarding {} replicas",
                node_id, discarded
            );
        }
    }

    pub fn add_replica(&mut self, info: ReplicaInfo) -> Result<()> {
        let stream = self.open.get_mut(&info.node_id).ok_or_else(|| {
            LeaseError::internal(format!(
                "replica {} reported by node {} without an open stream",
                info.range_id(),
                info.node_id
            ))
        })?;
        stream.push(info);
        Ok(())
    }

    /// Completes the stream of `node_id`.
    pub fn finish_node(&mut self, node_id: NodeId) -> Result<()> {
        let replicas = self.open.remove(&node_id).ok_or_else(|| {
            LeaseError::internal(format!("node {} has no open replica stream", node_id))
        })?;
        debug!("Collected {} replicas from node {}", replicas.len(), node_id);
        self.finished.insert(node_id, replicas);
        Ok(())
    }

    /// Records a descriptor read from metadata, keeping the newest
    /// generation seen for each range.
    pub fn add_descriptor(&mut self, desc: RangeDescriptor) {
        match self.descriptors.get(&desc.range_id) {
            Some(existing) if existing.generation >= desc.generation => {}
            _ => {
                self.descriptors.insert(desc.range_id, desc);
            }
        }
    }

    /// Ends the collection. Streams that were never finished are dropped.
    pub fn finish(self) -> (ClusterReplicaInfo, CollectionStats) {
        if !self.open.is_empty() {
            warn!(
                "Dropping {} incomplete replica streams",
                self.open.len()
            );
        }

        let stores: HashSet<StoreId> = self
            .finished
            .values()
            .flat_map(|replicas| replicas.iter().map(|r| r.store_id))
            .collect();
        let stats = CollectionStats {
            nodes: self.finished.len(),
            stores: stores.len(),
            descriptors: self.descriptors.len(),
        };

        let info = ClusterReplicaInfo {
            cluster_id: self.cluster_id.to_string(),
            descriptors: self.descriptors.into_values().collect(),
            local_info: self
                .finished
                .into_values()
                .map(|replicas| NodeReplicaInfo { replicas })
                .collect(),
        };
        (info, stats)
    }
}
