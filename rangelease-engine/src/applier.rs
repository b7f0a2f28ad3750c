//! # Lease Applier
//!
//! Installs committed lease changes on a replica. Every replica of the range
//! applies the same committed effects in log order; applying an effect whose
//! sequence is not newer than the installed lease is a no-op, so redelivery
//! after a restart or a retried proposal is harmless.
//!
//! On the replica that becomes (or remains) the leaseholder the read summary
//! tracker is seeded so that no write is accepted at or below a timestamp the
//! previous holder may have served a read at.

use crate::notifications::{LeaseChangeEvent, LeaseChangeKind, LeaseNotificationBus};
use crate::state::RangeState;
use rangelease_core::consensus::{Committed, ReplicatedLeaseEffect};
use rangelease_core::lease::Lease;
use rangelease_core::persistence::{DurableRangeState, PersistenceLayer};
use rangelease_core::read_summary::{ReadSummary, ReadSummaryTracker};
use rangelease_core::validation::Validator;
use rangelease_core::{LeaseError, RangeId, Result, StoreId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What applying a committed effect did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The lease was installed, replacing `previous`
    Applied { previous: Lease },
    /// The effect was not newer than the installed lease
    Ignored { installed: Lease },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Receives lease effects committed to the replicated log of a range.
#[async_trait]
pub trait CommitListener: Send + Sync {
    fn range_id(&self) -> RangeId;

    async fn on_committed(
        &self,
        effect: ReplicatedLeaseEffect,
        committed: Committed,
    ) -> Result<ApplyOutcome>;
}

pub struct LeaseApplier<PL: PersistenceLayer> {
    store_id: StoreId,
    state: Arc<RangeState>,
    tracker: Arc<ReadSummaryTracker>,
    persistence: Arc<PL>,
    notifications: Arc<LeaseNotificationBus>,
    apply_lock: Mutex<()>,
}

impl<PL: PersistenceLayer> LeaseApplier<PL> {
    pub fn new(
        store_id: StoreId,
        state: Arc<RangeState>,
        tracker: Arc<ReadSummaryTracker>,
        persistence: Arc<PL>,
        notifications: Arc<LeaseNotificationBus>,
    ) -> Self {
        Self {
            store_id,
            state,
            tracker,
            persistence,
            notifications,
            apply_lock: Mutex::new(()),
        }
    }

    /// Applies a committed lease effect.
    ///
    /// The new state is made durable before it is installed in memory. A
    /// persistence failure leaves the in-memory lease untouched.
    pub async fn apply(
        &self,
        effect: ReplicatedLeaseEffect,
        committed: Committed,
    ) -> Result<ApplyOutcome> {
        let _guard = self.apply_lock.lock().await;

        if effect.range_id != self.state.range_id {
            return Err(LeaseError::internal(format!(
                "lease effect for {} delivered to {}",
                effect.range_id, self.state.range_id
            )));
        }

        let installed = self.state.lease();
        if !installed.is_empty() && effect.lease.sequence <= installed.sequence {
            debug!(
                "Ignoring lease seq={} on {}: seq={} already installed",
                effect.lease.sequence, self.state.range_id, installed.sequence
            );
            self.state.record_ignored();
            return Ok(ApplyOutcome::Ignored { installed });
        }
        effect.lease.validate()?;

        let durable = DurableRangeState::new(
            effect.range_id,
            effect.lease.clone(),
            effect.prior_read_summary,
            committed.index,
        );
        self.persistence
            .save_range_state(effect.range_id, &durable.to_bytes()?)
            .await?;

        let lease = effect.lease;
        let previous = self
            .state
            .install(lease.clone(), effect.prior_read_summary, committed.index);

        if lease.owned_by(self.store_id) {
            let seed = effect
                .prior_read_summary
                .unwrap_or_else(|| ReadSummary::from_timestamp(lease.start.to_timestamp()));
            if previous.same_holder(&lease) {
                self.tracker.merge(seed);
            } else {
                self.tracker.reset(seed);
            }
        }

        let kind = if effect.prior_read_summary.is_some() {
            LeaseChangeKind::Transferred
        } else if previous.same_holder(&lease) {
            LeaseChangeKind::Extended
        } else {
            LeaseChangeKind::Acquired
        };

        info!(
            "Applied lease on {} at index {} ({:?}): {}",
            self.state.range_id, committed.index, kind, lease
        );

        self.notifications
            .publish(LeaseChangeEvent::new(
                self.state.range_id,
                kind,
                previous.clone(),
                lease,
            ))
            .await;

        Ok(ApplyOutcome::Applied { previous })
    }

    /// Reinstalls the lease last made durable for this range.
    ///
    /// Returns the restored state, or `None` if nothing was ever applied.
    /// A persisted lease older than the installed one is left on disk.
    pub async fn restore(&self) -> Result<Option<DurableRangeState>> {
        let _guard = self.apply_lock.lock().await;

        let Some(bytes) = self.persistence.load_range_state(self.state.range_id).await? else {
            return Ok(None);
        };
        let durable = DurableRangeState::from_bytes(&bytes)?;
        if durable.range_id != self.state.range_id {
            return Err(LeaseError::persistence(format!(
                "persisted state of {} found under {}",
                durable.range_id, self.state.range_id
            )));
        }

        let installed = self.state.lease();
        if !installed.is_empty() && durable.lease.sequence <= installed.sequence {
            return Ok(Some(durable));
        }

        self.state.install(
            durable.lease.clone(),
            durable.prior_read_summary,
            durable.applied_index,
        );
        if durable.lease.owned_by(self.store_id) {
            self.tracker.reset(durable.prior_read_summary.unwrap_or_else(|| {
                ReadSummary::from_timestamp(durable.lease.start.to_timestamp())
            }));
        }

        info!(
            "Restored lease on {} from persistence at index {}: {}",
            self.state.range_id, durable.applied_index, durable.lease
        );
        Ok(Some(durable))
    }
}
