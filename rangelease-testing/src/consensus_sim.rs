//! In-memory replicated log for one range.
//!
//! Proposals are committed in order and delivered to every registered
//! replica of the range before `propose` returns. Stores can be isolated so
//! they miss deliveries, then healed to replay what they missed.

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use rangelease_core::consensus::{Committed, ConsensusLog, ReplicatedLeaseEffect};
use rangelease_core::{LeaseError, RangeId, Result, StoreId};
use rangelease_engine::CommitListener;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::fault_injection::{ConsensusFault, FaultInjector};

#[derive(Debug, Clone, Default)]
pub struct LogConditions {
    pub latency_min: Duration,
    pub latency_max: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStats {
    pub proposals: u64,
    pub committed: u64,
    pub rejected: u64,
    pub ambiguous: u64,
    pub deliveries: u64,
    pub failed_deliveries: u64,
}

pub struct InMemoryConsensusLog {
    range_id: RangeId,
    listeners: RwLock<BTreeMap<StoreId, Weak<dyn CommitListener>>>,
    isolated: RwLock<HashSet<StoreId>>,
    /// Committed entries, in index order
    entries: Mutex<Vec<(Committed, ReplicatedLeaseEffect)>>,
    conditions: RwLock<LogConditions>,
    faults: FaultInjector,
    stats: RwLock<LogStats>,
}

impl std::fmt::Debug for InMemoryConsensusLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConsensusLog")
            .field("range_id", &self.range_id)
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl InMemoryConsensusLog {
    pub fn new(range_id: RangeId) -> Self {
        Self {
            range_id,
            listeners: RwLock::new(BTreeMap::new()),
            isolated: RwLock::new(HashSet::new()),
            entries: Mutex::new(Vec::new()),
            conditions: RwLock::new(LogConditions::default()),
            faults: FaultInjector::new(),
            stats: RwLock::new(LogStats::default()),
        }
    }

    pub fn range_id(&self) -> RangeId {
        self.range_id
    }

    /// Registers the replica on `store_id`, replacing any earlier one.
    pub fn register(&self, store_id: StoreId, listener: Weak<dyn CommitListener>) {
        self.listeners.write().insert(store_id, listener);
    }

    pub fn unregister(&self, store_id: StoreId) {
        self.listeners.write().remove(&store_id);
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn set_conditions(&self, conditions: LogConditions) {
        *self.conditions.write() = conditions;
    }

    /// Stops delivering committed entries to `store_id`.
    pub fn isolate(&self, store_id: StoreId) {
        self.isolated.write().insert(store_id);
    }

    /// Resumes delivery to `store_id` and replays the whole log to it.
    pub async fn heal(&self, store_id: StoreId) -> Result<()> {
        self.isolated.write().remove(&store_id);
        let entries = self.entries.lock().await.clone();
        let Some(listener) = self.listener(store_id) else {
            return Ok(());
        };
        for (committed, effect) in entries {
            listener.on_committed(effect, committed).await?;
        }
        Ok(())
    }

    /// Delivers every committed entry again to every reachable replica.
    pub async fn redeliver_all(&self) -> Result<()> {
        let entries = self.entries.lock().await.clone();
        for (committed, effect) in entries {
            self.deliver(&effect, committed).await;
        }
        Ok(())
    }

    pub async fn committed_entries(&self) -> Vec<(Committed, ReplicatedLeaseEffect)> {
        self.entries.lock().await.clone()
    }

    pub fn get_stats(&self) -> LogStats {
        self.stats.read().clone()
    }

    fn listener(&self, store_id: StoreId) -> Option<Arc<dyn CommitListener>> {
        self.listeners.read().get(&store_id).and_then(Weak::upgrade)
    }

    fn reachable_listeners(&self) -> Vec<(StoreId, Arc<dyn CommitListener>)> {
        let isolated = self.isolated.read();
        self.listeners
            .read()
            .iter()
            .filter(|(store_id, _)| !isolated.contains(store_id))
            .filter_map(|(store_id, weak)| weak.upgrade().map(|l| (*store_id, l)))
            .collect()
    }

    async fn simulate_latency(&self) {
        let conditions = self.conditions.read().clone();
        if conditions.latency_max.is_zero() {
            return;
        }
        let latency = if conditions.latency_max > conditions.latency_min {
            rand::thread_rng().gen_range(conditions.latency_min..conditions.latency_max)
        } else {
            conditions.latency_min
        };
        sleep(latency).await;
    }

    /// Appends `effect` and hands it to every reachable replica in order.
    async fn commit(&self, effect: &ReplicatedLeaseEffect) -> Committed {
        let mut entries = self.entries.lock().await;
        let committed = Committed {
            index: entries.len() as u64 + 1,
        };
        entries.push((committed, effect.clone()));
        self.stats.write().committed += 1;
        debug!(
            "Committed lease seq={} for {} at index {}",
            effect.lease.sequence, self.range_id, committed.index
        );

        // Delivery happens under the entries lock so replicas see log order.
        self.deliver(effect, committed).await;
        committed
    }

    async fn deliver(&self, effect: &ReplicatedLeaseEffect, committed: Committed) {
        for (store_id, listener) in self.reachable_listeners() {
            match listener.on_committed(effect.clone(), committed).await {
                Ok(_) => {
                    self.stats.write().deliveries += 1;
                }
                Err(e) => {
                    self.stats.write().failed_deliveries += 1;
                    warn!(
                        "Failed to apply index {} of {} on {}: {}",
                        committed.index, self.range_id, store_id, e
                    );
                }
            }
        }
    }
}

#[async_trait]
impl ConsensusLog for InMemoryConsensusLog {
    async fn propose(&self, effect: ReplicatedLeaseEffect) -> Result<Committed> {
        self.stats.write().proposals += 1;
        if effect.range_id != self.range_id {
            return Err(LeaseError::commit_failed(format!(
                "proposal for {} sent to log of {}",
                effect.range_id, self.range_id
            )));
        }

        self.simulate_latency().await;

        match self.faults.next_fault() {
            None => Ok(self.commit(&effect).await),
            Some(ConsensusFault::Reject) => {
                self.stats.write().rejected += 1;
                Err(LeaseError::commit_failed("proposal rejected"))
            }
            Some(ConsensusFault::AmbiguousCommitted) => {
                self.commit(&effect).await;
                self.stats.write().ambiguous += 1;
                Err(LeaseError::ambiguous_commit("lost contact after proposing"))
            }
            Some(ConsensusFault::AmbiguousDropped) => {
                self.stats.write().ambiguous += 1;
                Err(LeaseError::ambiguous_commit("lost contact before proposing"))
            }
            Some(ConsensusFault::Delay(delay)) => {
                sleep(delay).await;
                Ok(self.commit(&effect).await)
            }
            Some(ConsensusFault::Hang) => std::future::pending().await,
        }
    }
}
