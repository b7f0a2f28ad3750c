//! Multi-store test cluster.
//!
//! Every node runs one store with its own clock, latch table, persistence
//! and notification bus. Liveness is shared cluster-wide. Each range gets its
//! own in-memory log, and a replica of the range on every member store.

use anyhow::{anyhow, Context};
use rangelease_core::hlc::{Clock, HybridClock, ManualTime};
use rangelease_core::lease::Lease;
use rangelease_core::liveness::StaticLiveness;
use rangelease_core::replica::{RangeDescriptor, RangeReplicaSet, ReplicaDescriptor, ReplicaType};
use rangelease_core::{NodeId, RangeId, StoreId};
use rangelease_engine::{
    CommitListener, LatchManager, LeaseConfig, LeaseNotificationBus, RangeLeaseReplica,
    ReplicaServices,
};
use rangelease_persistence::InMemoryPersistence;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::info;

use crate::consensus_sim::InMemoryConsensusLog;

pub type TestReplica = RangeLeaseReplica<InMemoryConsensusLog, InMemoryPersistence>;

/// Wall time every node clock starts at.
pub const CLUSTER_START_NANOS: i64 = 1_000_000_000;

pub struct TestNode {
    pub node_id: NodeId,
    pub store_id: StoreId,
    pub clock: Arc<HybridClock<ManualTime>>,
    pub persistence: Arc<InMemoryPersistence>,
    pub latches: Arc<LatchManager>,
    pub notifications: Arc<LeaseNotificationBus>,
}

impl TestNode {
    fn new(id: i32, config: &LeaseConfig) -> Self {
        let manual = ManualTime::new(CLUSTER_START_NANOS);
        Self {
            node_id: NodeId::new(id),
            store_id: StoreId::new(id),
            clock: Arc::new(HybridClock::new(manual, config.max_clock_offset)),
            persistence: Arc::new(InMemoryPersistence::new()),
            latches: Arc::new(LatchManager::new()),
            notifications: Arc::new(LeaseNotificationBus::with_capacity(
                config.notification_capacity,
            )),
        }
    }

    /// The replica descriptor of this store with the given id and role.
    pub fn descriptor(&self, replica_id: i32, replica_type: ReplicaType) -> ReplicaDescriptor {
        ReplicaDescriptor::new(
            self.node_id.value(),
            self.store_id.value(),
            replica_id,
            replica_type,
        )
    }
}

pub struct LeaseTestCluster {
    config: LeaseConfig,
    liveness: Arc<StaticLiveness>,
    nodes: BTreeMap<StoreId, TestNode>,
    logs: HashMap<RangeId, Arc<InMemoryConsensusLog>>,
    replicas: HashMap<(RangeId, StoreId), Arc<TestReplica>>,
}

impl LeaseTestCluster {
    /// Creates `node_count` live nodes, numbered from 1.
    pub fn new(node_count: usize, config: LeaseConfig) -> Self {
        let liveness = Arc::new(StaticLiveness::new());
        let mut nodes = BTreeMap::new();
        for id in 1..=node_count as i32 {
            let node = TestNode::new(id, &config);
            liveness.set_epoch(node.node_id, 1);
            nodes.insert(node.store_id, node);
        }

        Self {
            config,
            liveness,
            nodes,
            logs: HashMap::new(),
            replicas: HashMap::new(),
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn liveness(&self) -> &Arc<StaticLiveness> {
        &self.liveness
    }

    pub fn node(&self, store_id: StoreId) -> anyhow::Result<&TestNode> {
        self.nodes
            .get(&store_id)
            .ok_or_else(|| anyhow!("no node with store {}", store_id))
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        self.nodes.keys().copied().collect()
    }

    /// Adds a range replicated as a full voter on every node, with replica
    /// ids matching store ids.
    pub fn add_voter_range(&mut self, range_id: RangeId) -> anyhow::Result<RangeDescriptor> {
        let members = self
            .nodes
            .values()
            .map(|node| node.descriptor(node.store_id.value(), ReplicaType::VoterFull))
            .collect();
        self.add_range(range_id, members)
    }

    /// Adds a range with the given members and creates their replicas.
    pub fn add_range(
        &mut self,
        range_id: RangeId,
        members: Vec<ReplicaDescriptor>,
    ) -> anyhow::Result<RangeDescriptor> {
        let start_key = format!("r{:06}", range_id.value());
        let end_key = format!("r{:06}", range_id.value() + 1);
        let descriptor = RangeDescriptor::new(
            range_id,
            start_key,
            end_key,
            RangeReplicaSet::new(members)?,
        );

        let log = Arc::new(InMemoryConsensusLog::new(range_id));
        self.logs.insert(range_id, log);

        for member in descriptor.replicas().descriptors().to_vec() {
            self.create_replica(&descriptor, member.store_id)?;
        }
        info!(
            "Added {} with replicas {:?}",
            range_id,
            descriptor
                .replicas()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        );
        Ok(descriptor)
    }

    fn create_replica(
        &mut self,
        descriptor: &RangeDescriptor,
        store_id: StoreId,
    ) -> anyhow::Result<Arc<TestReplica>> {
        let node = self.node(store_id)?;
        let log = self.log(descriptor.range_id)?;
        let clock: Arc<dyn Clock> = node.clock.clone();
        let services = ReplicaServices {
            clock,
            liveness: self.liveness.clone(),
            consensus: log.clone(),
            persistence: node.persistence.clone(),
            latches: node.latches.clone(),
            notifications: node.notifications.clone(),
        };

        let replica = Arc::new(RangeLeaseReplica::new(
            self.config.clone(),
            store_id,
            descriptor.clone(),
            services,
        )?);
        let listener: Arc<dyn CommitListener> = replica.clone();
        let weak: Weak<dyn CommitListener> = Arc::downgrade(&listener);
        log.register(store_id, weak);

        self.replicas
            .insert((descriptor.range_id, store_id), replica.clone());
        Ok(replica)
    }

    pub fn log(&self, range_id: RangeId) -> anyhow::Result<Arc<InMemoryConsensusLog>> {
        self.logs
            .get(&range_id)
            .cloned()
            .ok_or_else(|| anyhow!("no log for {}", range_id))
    }

    pub fn replica(&self, range_id: RangeId, store_id: StoreId) -> anyhow::Result<Arc<TestReplica>> {
        self.replicas
            .get(&(range_id, store_id))
            .cloned()
            .ok_or_else(|| anyhow!("no replica of {} on store {}", range_id, store_id))
    }

    pub fn replicas_of(&self, range_id: RangeId) -> Vec<Arc<TestReplica>> {
        let mut replicas: Vec<_> = self
            .replicas
            .iter()
            .filter(|((range, _), _)| *range == range_id)
            .map(|(_, replica)| replica.clone())
            .collect();
        replicas.sort_by_key(|replica| replica.store_id());
        replicas
    }

    /// Stores whose replica believes it holds a valid lease on `range_id`.
    pub fn leaseholders(&self, range_id: RangeId) -> Vec<StoreId> {
        self.replicas_of(range_id)
            .iter()
            .filter(|replica| replica.is_leaseholder())
            .map(|replica| replica.store_id())
            .collect()
    }

    /// The lease installed on each replica of `range_id`, by store.
    pub fn installed_leases(&self, range_id: RangeId) -> BTreeMap<StoreId, Lease> {
        self.replicas_of(range_id)
            .iter()
            .map(|replica| (replica.store_id(), replica.current_lease()))
            .collect()
    }

    /// Advances the physical clock of every node.
    pub fn advance_clocks(&self, duration: Duration) {
        for node in self.nodes.values() {
            node.clock.physical().advance_duration(duration);
        }
    }

    /// Installs a new replica set on every replica of the range, creating
    /// replicas on stores that just joined.
    pub async fn change_replicas(
        &mut self,
        range_id: RangeId,
        members: Vec<ReplicaDescriptor>,
    ) -> anyhow::Result<RangeDescriptor> {
        let current = self
            .replicas_of(range_id)
            .first()
            .map(|replica| replica.descriptor())
            .ok_or_else(|| anyhow!("{} has no replicas", range_id))?;
        let next = current.with_replicas(RangeReplicaSet::new(members)?);

        for member in next.replicas().descriptors().to_vec() {
            if !self.replicas.contains_key(&(range_id, member.store_id)) {
                self.create_replica(&next, member.store_id)?;
            }
        }
        for replica in self.replicas_of(range_id) {
            replica.update_descriptor(next.clone()).await?;
        }
        Ok(next)
    }

    /// Replaces the replica on `store_id` with a fresh instance that restores
    /// its lease from the store's persistence, as after a process restart.
    pub async fn restart_replica(
        &mut self,
        range_id: RangeId,
        store_id: StoreId,
    ) -> anyhow::Result<Arc<TestReplica>> {
        let descriptor = self.replica(range_id, store_id)?.descriptor();
        self.replicas.remove(&(range_id, store_id));
        self.log(range_id)?.unregister(store_id);

        // A restarted store begins with fresh latches.
        if let Some(node) = self.nodes.get_mut(&store_id) {
            node.latches = Arc::new(LatchManager::new());
        }

        let replica = self.create_replica(&descriptor, store_id)?;
        replica
            .restore()
            .await
            .with_context(|| format!("restoring {} on store {}", range_id, store_id))?;
        Ok(replica)
    }
}
