//! # Range Lease Replica
//!
//! One replica of a range on the local store. It ties together the latch
//! manager, the evaluator, the consensus log and the applier:
//!
//! 1. take the exclusive latch of the range
//! 2. evaluate RequestLease or TransferLease against the installed state
//! 3. propose the result and wait, cancellably, for it to commit
//! 4. apply the committed effect
//!
//! Reads and writes served under the lease take the same latch in shared
//! mode, so none is in flight while a transfer picks its start timestamp.

use crate::applier::{ApplyOutcome, CommitListener, LeaseApplier};
use crate::cancel::CancellationSignal;
use crate::config::LeaseConfig;
use crate::eval::{EvalContext, LeaseEvalResult, RequestLeaseRequest, TransferLeaseRequest};
use crate::evaluator;
use crate::latch::{LatchAccess, LatchGuard, LatchManager, LatchStatistics};
use crate::notifications::{
    LeaseChangeEvent, LeaseNotificationBus, NotificationFilter, SubscriptionId,
};
use crate::state::{RangeState, RangeStatistics};
use async_trait::async_trait;
use rangelease_core::consensus::{Committed, ConsensusLog, ReplicatedLeaseEffect};
use rangelease_core::hlc::{Clock, ClockTimestamp, Timestamp};
use rangelease_core::lease::{Lease, LeaseStatus, LeaseType};
use rangelease_core::liveness::NodeLiveness;
use rangelease_core::persistence::PersistenceLayer;
use rangelease_core::read_summary::{ReadScope, ReadSummary, ReadSummaryTracker};
use rangelease_core::replica::{RangeDescriptor, RangeReplicaSet, ReplicaDescriptor};
use rangelease_core::validation::{validate_lease_sequence, Validator};
use rangelease_core::{LeaseError, LeaseSequence, RangeId, ReplicaId, Result, StoreId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Shared services a replica runs against. Usually one set per store.
pub struct ReplicaServices<CL, PL> {
    pub clock: Arc<dyn Clock>,
    pub liveness: Arc<dyn NodeLiveness>,
    pub consensus: Arc<CL>,
    pub persistence: Arc<PL>,
    pub latches: Arc<LatchManager>,
    pub notifications: Arc<LeaseNotificationBus>,
}

impl<CL, PL> Clone for ReplicaServices<CL, PL> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            liveness: self.liveness.clone(),
            consensus: self.consensus.clone(),
            persistence: self.persistence.clone(),
            latches: self.latches.clone(),
            notifications: self.notifications.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicaStatistics {
    pub store_id: StoreId,
    pub range: RangeStatistics,
    pub reads_served: u64,
    pub latches: LatchStatistics,
}

pub struct RangeLeaseReplica<CL, PL>
where
    CL: ConsensusLog + 'static,
    PL: PersistenceLayer + 'static,
{
    config: LeaseConfig,
    store_id: StoreId,
    state: Arc<RangeState>,
    tracker: Arc<ReadSummaryTracker>,
    applier: LeaseApplier<PL>,
    clock: Arc<dyn Clock>,
    liveness: Arc<dyn NodeLiveness>,
    consensus: Arc<CL>,
    latches: Arc<LatchManager>,
    notifications: Arc<LeaseNotificationBus>,
}

impl<CL, PL> RangeLeaseReplica<CL, PL>
where
    CL: ConsensusLog + 'static,
    PL: PersistenceLayer + 'static,
{
    pub fn new(
        config: LeaseConfig,
        store_id: StoreId,
        descriptor: RangeDescriptor,
        services: ReplicaServices<CL, PL>,
    ) -> Result<Self> {
        config.validate()?;
        descriptor.validate()?;
        if services.clock.max_offset() > config.max_clock_offset {
            return Err(LeaseError::internal(format!(
                "clock tolerates offset {:?} beyond the configured {:?}",
                services.clock.max_offset(),
                config.max_clock_offset
            )));
        }

        let state = Arc::new(RangeState::new(descriptor));
        let tracker = Arc::new(ReadSummaryTracker::default());
        let applier = LeaseApplier::new(
            store_id,
            state.clone(),
            tracker.clone(),
            services.persistence,
            services.notifications.clone(),
        );

        Ok(Self {
            config,
            store_id,
            state,
            tracker,
            applier,
            clock: services.clock,
            liveness: services.liveness,
            consensus: services.consensus,
            latches: services.latches,
            notifications: services.notifications,
        })
    }

    pub fn range_id(&self) -> RangeId {
        self.state.range_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn current_lease(&self) -> Lease {
        self.state.lease()
    }

    pub fn descriptor(&self) -> RangeDescriptor {
        self.state.descriptor()
    }

    /// This replica's entry in the current replica set.
    pub fn local_replica(&self) -> Option<ReplicaDescriptor> {
        self.state.descriptor().get_replica_descriptor(self.store_id).copied()
    }

    pub fn read_summary(&self) -> ReadSummary {
        self.tracker.current()
    }

    /// Status of the installed lease as seen by this replica now.
    pub fn lease_status(&self) -> LeaseStatus {
        let lease = self.state.lease();
        let epoch = self.liveness.epoch(lease.replica.node_id);
        self.state
            .lease_status(self.clock.now().to_timestamp(), epoch)
    }

    /// Returns true if this replica holds a valid, unrevoked lease.
    pub fn is_leaseholder(&self) -> bool {
        self.state.lease().owned_by(self.store_id) && self.lease_status() == LeaseStatus::Valid
    }

    /// Evaluates and commits a RequestLease for `lease`.
    pub async fn request_lease(
        &self,
        lease: Lease,
        mut cancel: CancellationSignal,
    ) -> Result<Lease> {
        let _latch = self.acquire_exclusive(&mut cancel).await?;
        let result = evaluator::request_lease(self, RequestLeaseRequest { lease })?;

        // Only the holder may extend a live lease; anyone else has to wait
        // for it to lapse or be handed the lease.
        let current = self.state.lease();
        if !current.same_holder(result.lease()) && self.held_elsewhere_until_offset(&current) {
            debug!(
                "Refusing lease request for {} on {}: {} is still live",
                result.lease().replica,
                self.state.range_id,
                current
            );
            return Err(LeaseError::not_lease_holder(self.state.range_id, &current));
        }
        self.propose_and_apply(result, cancel).await
    }

    /// Returns true if `lease` may still be valid on its holder. Clocks can
    /// disagree by up to the max offset, so an expiration lease is only
    /// considered lapsed once it has expired that long ago on this clock.
    fn held_elsewhere_until_offset(&self, lease: &Lease) -> bool {
        let offset = i64::try_from(self.clock.max_offset().as_nanos()).unwrap_or(i64::MAX);
        let horizon = self.clock.now().to_timestamp().add(offset.saturating_neg(), 0);
        let epoch = self.liveness.epoch(lease.replica.node_id);
        lease.status_at(horizon, epoch) == LeaseStatus::Valid
    }

    /// Acquires (or extends) the lease for this replica, using the lease type
    /// from the configuration.
    pub async fn acquire_lease(&self, cancel: CancellationSignal) -> Result<Lease> {
        let replica = self.local_replica().ok_or_else(|| LeaseError::InvalidReplicaSet {
            details: format!("{} has no replica on {}", self.state.range_id, self.store_id),
        })?;
        let lease = self.candidate_lease(replica, self.clock.now())?;
        self.request_lease(lease, cancel).await
    }

    /// Evaluates and commits a TransferLease. Only the holder of a valid,
    /// unrevoked lease may transfer.
    pub async fn transfer_lease(
        &self,
        request: TransferLeaseRequest,
        mut cancel: CancellationSignal,
    ) -> Result<Lease> {
        let _latch = self.acquire_exclusive(&mut cancel).await?;

        let current = self.state.lease();
        if !current.owned_by(self.store_id) || self.lease_status() != LeaseStatus::Valid {
            return Err(LeaseError::not_lease_holder(self.state.range_id, &current));
        }

        let result = evaluator::transfer_lease(self, request)?;
        self.propose_and_apply(result, cancel).await
    }

    /// Transfers the lease to the replica with id `target`.
    pub async fn transfer_lease_to(
        &self,
        target: ReplicaId,
        cancel: CancellationSignal,
    ) -> Result<Lease> {
        let prev_lease = self.state.lease();
        let replica = self
            .state
            .replica_set()
            .get_by_replica_id(target)
            .copied()
            .unwrap_or(ReplicaDescriptor {
                replica_id: target,
                ..ReplicaDescriptor::default()
            });

        let lease = self.candidate_lease(replica, self.clock.now())?;
        self.transfer_lease(TransferLeaseRequest { lease, prev_lease }, cancel)
            .await
    }

    /// Builds the lease this store would grant `replica` starting at `start`.
    fn candidate_lease(&self, replica: ReplicaDescriptor, start: ClockTimestamp) -> Result<Lease> {
        match self.config.lease_type {
            LeaseType::Expiration => {
                let duration = self.config.range_lease_duration.as_nanos() as i64;
                Ok(Lease::new_expiration(
                    replica,
                    start,
                    start.to_timestamp().add(duration, 0),
                ))
            }
            LeaseType::Epoch => {
                let member = self
                    .state
                    .replica_set()
                    .get_by_replica_id(replica.replica_id)
                    .is_some();
                // Non-members are reported by evaluation, not here.
                let epoch = match self.liveness.epoch(replica.node_id) {
                    Some(epoch) => epoch,
                    None if !member => 0,
                    None => {
                        return Err(LeaseError::invalid_lease(format!(
                            "node {} has no liveness record",
                            replica.node_id
                        )))
                    }
                };
                Ok(Lease::new_epoch(replica, start, epoch))
            }
        }
    }

    async fn acquire_exclusive(&self, cancel: &mut CancellationSignal) -> Result<LatchGuard> {
        let span = self.state.descriptor().span();
        tokio::select! {
            reason = cancel.cancelled() => Err(LeaseError::cancelled(reason)),
            guard = self.latches.acquire(self.state.range_id, span, LatchAccess::Exclusive) => {
                // A cancellation racing the latch still wins before evaluation.
                match cancel.reason() {
                    Some(reason) => Err(LeaseError::cancelled(reason)),
                    None => Ok(guard),
                }
            }
        }
    }

    async fn propose_and_apply(
        &self,
        result: LeaseEvalResult,
        mut cancel: CancellationSignal,
    ) -> Result<Lease> {
        let effect = result.replicated;
        let revoked = effect.revoked_lease_seq;
        let proposal_timeout = self.config.proposal_timeout;

        // A commit from another store may have landed since evaluation.
        validate_lease_sequence(self.state.lease_sequence(), effect.lease.sequence)?;

        let outcome = tokio::select! {
            reason = cancel.cancelled() => Err(LeaseError::cancelled(reason)),
            proposed = timeout(proposal_timeout, self.consensus.propose(effect.clone())) => {
                match proposed {
                    Ok(committed) => committed,
                    Err(_) => Err(LeaseError::ambiguous_commit(format!(
                        "proposal not resolved within {:?}",
                        proposal_timeout
                    ))),
                }
            }
        };

        match outcome {
            Ok(committed) => {
                debug!(
                    "Lease seq={} on {} committed at index {}",
                    effect.lease.sequence, effect.range_id, committed.index
                );
                let lease = effect.lease.clone();
                match self.applier.apply(effect, committed).await? {
                    ApplyOutcome::Applied { .. } => Ok(lease),
                    // The log may already have delivered the entry here.
                    ApplyOutcome::Ignored { installed } if installed == lease => Ok(lease),
                    ApplyOutcome::Ignored { installed } if installed.sequence == lease.sequence => {
                        warn!(
                            "Lease seq={} on {} lost to {}",
                            lease.sequence, self.state.range_id, installed
                        );
                        Err(LeaseError::StaleLeaseSequence {
                            expected: installed.sequence.next(),
                            actual: lease.sequence,
                        })
                    }
                    ApplyOutcome::Ignored { installed } => Err(LeaseError::ambiguous_commit(
                        format!(
                            "lease seq={} committed but {} was installed before it was confirmed",
                            lease.sequence, installed
                        ),
                    )),
                }
            }
            Err(err) => {
                if let Some(seq) = revoked {
                    if matches!(err, LeaseError::CommitFailed { .. }) {
                        if self.state.unrevoke(seq) {
                            info!(
                                "Lease seq={} on {} reinstated after failed transfer",
                                seq, effect.range_id
                            );
                        }
                    } else {
                        warn!(
                            "Lease seq={} on {} stays revoked: {}",
                            seq, effect.range_id, err
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Applies an effect delivered by the replicated log.
    pub async fn apply_committed(
        &self,
        effect: ReplicatedLeaseEffect,
        committed: Committed,
    ) -> Result<ApplyOutcome> {
        // Entries carry the proposer's clock reading.
        self.clock.update(effect.lease.start);
        self.applier.apply(effect, committed).await
    }

    /// Serves a read at `ts` under the local lease.
    pub async fn serve_read(&self, scope: ReadScope, ts: Timestamp) -> Result<()> {
        let _latch = self.acquire_shared().await;
        let lease = self.check_serving_lease(None)?;
        if !lease.covers(ts) {
            return Err(LeaseError::not_lease_holder(self.state.range_id, &lease));
        }
        self.tracker.record_read(scope, ts);
        Ok(())
    }

    /// Admits a write proposed at `ts` by a command evaluated under lease
    /// `lease_seq`. Returns the timestamp the write must use.
    pub async fn serve_write(
        &self,
        scope: ReadScope,
        ts: Timestamp,
        lease_seq: LeaseSequence,
    ) -> Result<Timestamp> {
        let _latch = self.acquire_shared().await;
        self.check_serving_lease(Some(lease_seq))?;
        Ok(self.tracker.forward_write_timestamp(scope, ts))
    }

    async fn acquire_shared(&self) -> LatchGuard {
        self.latches
            .acquire(
                self.state.range_id,
                self.state.descriptor().span(),
                LatchAccess::Shared,
            )
            .await
    }

    fn check_serving_lease(&self, lease_seq: Option<LeaseSequence>) -> Result<Lease> {
        let lease = self.state.lease();
        let stamped_under_other = lease_seq.is_some_and(|seq| seq != lease.sequence);
        if !lease.owned_by(self.store_id)
            || stamped_under_other
            || self.lease_status() != LeaseStatus::Valid
        {
            return Err(LeaseError::not_lease_holder(self.state.range_id, &lease));
        }
        Ok(lease)
    }

    /// Reloads the lease last applied by this replica before a restart.
    pub async fn restore(&self) -> Result<Option<Lease>> {
        let Some(durable) = self.applier.restore().await? else {
            info!("No persisted lease for {}", self.state.range_id);
            return Ok(None);
        };
        // Readings taken from now on must exceed the restored start.
        self.clock.update(durable.lease.start);
        Ok(Some(self.state.lease()))
    }

    /// Installs a newer descriptor, as done after a membership change.
    pub async fn update_descriptor(&self, descriptor: RangeDescriptor) -> Result<bool> {
        if descriptor.range_id != self.state.range_id {
            return Err(LeaseError::InvalidReplicaSet {
                details: format!(
                    "descriptor of {} offered to {}",
                    descriptor.range_id, self.state.range_id
                ),
            });
        }
        descriptor.validate()?;
        let _latch = self
            .latches
            .acquire(
                self.state.range_id,
                self.state.descriptor().span(),
                LatchAccess::Exclusive,
            )
            .await;
        let generation = descriptor.generation;
        let updated = self.state.set_descriptor(descriptor);
        if updated {
            info!(
                "Updated descriptor of {} to generation {}",
                self.state.range_id, generation
            );
        }
        Ok(updated)
    }

    pub async fn subscribe(
        &self,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<LeaseChangeEvent>) {
        self.notifications
            .subscribe(NotificationFilter::Range(self.state.range_id))
            .await
    }

    pub fn statistics(&self) -> ReplicaStatistics {
        ReplicaStatistics {
            store_id: self.store_id,
            range: self.state.get_statistics(),
            reads_served: self.tracker.reads_served(),
            latches: self.latches.get_statistics(),
        }
    }
}

impl<CL, PL> EvalContext for RangeLeaseReplica<CL, PL>
where
    CL: ConsensusLog + 'static,
    PL: PersistenceLayer + 'static,
{
    fn range_id(&self) -> RangeId {
        self.state.range_id
    }

    fn store_id(&self) -> StoreId {
        self.store_id
    }

    fn replica_set(&self) -> RangeReplicaSet {
        self.state.replica_set()
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn current_lease(&self) -> Lease {
        self.state.lease()
    }

    fn current_read_summary(&self) -> ReadSummary {
        self.tracker.current()
    }

    fn revoke_lease(&self, seq: LeaseSequence) {
        if self.state.revoke(seq) {
            debug!("Revoked lease seq={} on {}", seq, self.state.range_id);
        }
    }
}

#[async_trait]
impl<CL, PL> CommitListener for RangeLeaseReplica<CL, PL>
where
    CL: ConsensusLog + 'static,
    PL: PersistenceLayer + 'static,
{
    fn range_id(&self) -> RangeId {
        self.state.range_id
    }

    async fn on_committed(
        &self,
        effect: ReplicatedLeaseEffect,
        committed: Committed,
    ) -> Result<ApplyOutcome> {
        self.apply_committed(effect, committed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation_pair;
    use parking_lot::Mutex;
    use rangelease_core::hlc::{HybridClock, ManualTime};
    use rangelease_core::liveness::StaticLiveness;
    use rangelease_core::replica::ReplicaType;
    use rangelease_core::{LeaseErrorKind, NodeId};
    use rangelease_persistence::InMemoryPersistence;
    use std::time::Duration;

    /// Commits every proposal at the next index, or fails as scripted.
    #[derive(Default)]
    struct ScriptedLog {
        next_index: Mutex<u64>,
        fail_next: Mutex<Option<LeaseError>>,
        hang: Mutex<bool>,
    }

    #[async_trait]
    impl ConsensusLog for ScriptedLog {
        async fn propose(&self, _effect: ReplicatedLeaseEffect) -> Result<Committed> {
            let hang = *self.hang.lock();
            if hang {
                std::future::pending::<()>().await;
            }
            let failure = self.fail_next.lock().take();
            if let Some(err) = failure {
                return Err(err);
            }
            let mut index = self.next_index.lock();
            *index += 1;
            Ok(Committed { index: *index })
        }
    }

    fn voter(id: i32) -> ReplicaDescriptor {
        ReplicaDescriptor::new(id, id, id, ReplicaType::VoterFull)
    }

    type TestReplica = RangeLeaseReplica<ScriptedLog, InMemoryPersistence>;

    fn services(
        clock: HybridClock<ManualTime>,
        persistence: Arc<InMemoryPersistence>,
    ) -> (ReplicaServices<ScriptedLog, InMemoryPersistence>, Arc<StaticLiveness>) {
        let liveness = Arc::new(StaticLiveness::new());
        liveness.set_epoch(NodeId::new(1), 1);
        liveness.set_epoch(NodeId::new(2), 1);
        let services = ReplicaServices {
            clock: Arc::new(clock),
            liveness: liveness.clone(),
            consensus: Arc::new(ScriptedLog::default()),
            persistence,
            latches: Arc::new(LatchManager::new()),
            notifications: Arc::new(LeaseNotificationBus::new()),
        };
        (services, liveness)
    }

    fn descriptor() -> RangeDescriptor {
        let set = RangeReplicaSet::new(vec![voter(1), voter(2)]).unwrap();
        RangeDescriptor::new(RangeId::new(1), "a", "z", set)
    }

    fn replica_with_liveness(
        config: LeaseConfig,
        clock_nanos: i64,
        persistence: Arc<InMemoryPersistence>,
    ) -> (TestReplica, Arc<ScriptedLog>, Arc<StaticLiveness>) {
        let clock = HybridClock::for_testing(ManualTime::new(clock_nanos));
        let (services, liveness) = services(clock, persistence);
        let log = services.consensus.clone();
        let replica = RangeLeaseReplica::new(config, StoreId::new(1), descriptor(), services).unwrap();
        (replica, log, liveness)
    }

    fn replica_on(
        config: LeaseConfig,
        clock_nanos: i64,
        persistence: Arc<InMemoryPersistence>,
    ) -> (TestReplica, Arc<ScriptedLog>) {
        let (replica, log, _) = replica_with_liveness(config, clock_nanos, persistence);
        (replica, log)
    }

    fn replica(config: LeaseConfig) -> (TestReplica, Arc<ScriptedLog>) {
        replica_on(config, 1_000, Arc::new(InMemoryPersistence::new()))
    }

    #[tokio::test]
    async fn test_acquire_then_serve() {
        let (replica, _) = replica(LeaseConfig::default());
        let lease = replica.acquire_lease(CancellationSignal::never()).await.unwrap();
        assert_eq!(lease.sequence, LeaseSequence::new(1));
        assert_eq!(lease.epoch(), Some(1));
        assert!(replica.is_leaseholder());

        let ts = replica.clock.now().to_timestamp();
        replica.serve_read(ReadScope::Global, ts).await.unwrap();
        let write_ts = replica
            .serve_write(ReadScope::Global, ts, lease.sequence)
            .await
            .unwrap();
        assert!(write_ts > ts);

        let err = replica
            .serve_write(ReadScope::Global, ts, LeaseSequence::new(7))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), LeaseErrorKind::NotLeaseHolder);
    }

    #[tokio::test]
    async fn test_failed_transfer_reinstates_lease() {
        let (replica, log) = replica(LeaseConfig::default());
        replica.acquire_lease(CancellationSignal::never()).await.unwrap();

        *log.fail_next.lock() = Some(LeaseError::commit_failed("no quorum"));
        let err = replica
            .transfer_lease_to(ReplicaId::new(2), CancellationSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), LeaseErrorKind::CommitFailed);
        assert!(replica.is_leaseholder());
        assert_eq!(replica.statistics().range.revocations, 1);
    }

    #[tokio::test]
    async fn test_ambiguous_transfer_keeps_revocation() {
        let (replica, log) = replica(LeaseConfig::default());
        replica.acquire_lease(CancellationSignal::never()).await.unwrap();

        *log.fail_next.lock() = Some(LeaseError::ambiguous_commit("connection reset"));
        let err = replica
            .transfer_lease_to(ReplicaId::new(2), CancellationSignal::never())
            .await
            .unwrap_err();
        assert!(err.requires_state_check());
        assert_eq!(replica.lease_status(), LeaseStatus::Revoked);

        let ts = replica.clock.now().to_timestamp();
        let err = replica.serve_read(ReadScope::Global, ts).await.unwrap_err();
        assert_eq!(err.kind(), LeaseErrorKind::NotLeaseHolder);
    }

    #[tokio::test]
    async fn test_proposal_timeout_is_ambiguous() {
        let config = LeaseConfig::default().with_proposal_timeout(Duration::from_millis(20));
        let (replica, log) = replica(config);
        *log.hang.lock() = true;

        let err = replica
            .acquire_lease(CancellationSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), LeaseErrorKind::AmbiguousCommit);
        assert!(replica.current_lease().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_releases_latch() {
        let (replica, log) = replica(LeaseConfig::default());
        *log.hang.lock() = true;

        let (handle, signal) = cancellation_pair();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel("deadline exceeded");
        });
        let err = replica.acquire_lease(signal).await.unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err.kind(), LeaseErrorKind::EvaluationCancelled);
        assert!(replica
            .latches
            .try_acquire(RangeId::new(1), replica.descriptor().span(), LatchAccess::Exclusive)
            .is_some());
    }

    #[test]
    fn test_clock_offset_must_fit_config() {
        let clock = HybridClock::new(ManualTime::new(1_000), Duration::from_secs(1));
        let (services, _) = services(clock, Arc::new(InMemoryPersistence::new()));
        let config = LeaseConfig::default().with_max_clock_offset(Duration::from_millis(500));
        let result = TestReplica::new(config, StoreId::new(1), descriptor(), services);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transfer_requires_valid_lease() {
        let (replica, log, liveness) = replica_with_liveness(
            LeaseConfig::default(),
            1_000,
            Arc::new(InMemoryPersistence::new()),
        );
        replica.acquire_lease(CancellationSignal::never()).await.unwrap();

        liveness.increment_epoch(NodeId::new(1));
        assert_eq!(replica.lease_status(), LeaseStatus::Expired);
        let err = replica
            .transfer_lease_to(ReplicaId::new(2), CancellationSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), LeaseErrorKind::NotLeaseHolder);
        assert_eq!(*log.next_index.lock(), 1);
    }

    #[tokio::test]
    async fn test_transfer_requires_leaseholder() {
        let (replica, _) = replica(LeaseConfig::default());
        let err = replica
            .transfer_lease_to(ReplicaId::new(2), CancellationSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), LeaseErrorKind::NotLeaseHolder);
    }

    #[tokio::test]
    async fn test_restore_after_restart() {
        let config = LeaseConfig::default().with_lease_type(LeaseType::Expiration);
        let persistence = Arc::new(InMemoryPersistence::new());
        let (replica, _) = replica_on(config.clone(), 1_000, persistence.clone());
        let acquired = replica.acquire_lease(CancellationSignal::never()).await.unwrap();

        // The restarted process comes back with a clock behind the lease.
        let (restarted, _) = replica_on(config, 0, persistence);
        let restored = restarted.restore().await.unwrap().unwrap();
        assert_eq!(restored, acquired);
        assert!(restarted.clock.now() > acquired.start);
    }
}
