//! # Lease Evaluator
//!
//! RequestLease and TransferLease evaluation. Both run while the caller
//! holds the exclusive latch of the range and produce a
//! [`LeaseEvalResult`] that only takes effect once committed and applied.
//!
//! A transfer recomputes the new lease's start at evaluation time rather than
//! trusting the candidate's. Under the exclusive latch nothing can be served
//! under the old lease, so a start chosen now is after every read and write
//! the old leaseholder accepted, and the successor is told (through the prior
//! read summary) about any reads served at future timestamps.

use crate::eval::{EvalContext, LeaseEvalResult, RequestLeaseRequest, TransferLeaseRequest};
use rangelease_core::consensus::ReplicatedLeaseEffect;
use rangelease_core::eligibility::check_can_receive_lease;
use rangelease_core::error::RejectionReason;
use rangelease_core::hlc::ClockTimestamp;
use rangelease_core::lease::LeaseKind;
use rangelease_core::read_summary::ReadSummary;
use rangelease_core::{LeaseError, Result};
use tracing::debug;

/// Evaluates a request by a replica to acquire or extend the lease.
///
/// The sequence always advances by one. An extension by the current holder
/// keeps the previous start; a new holder replacing an expiration-based lease
/// starts no earlier than the previous expiration and keeps its length. Fresh
/// acquisitions carry no prior read summary and revoke nothing.
pub fn request_lease<C>(ctx: &C, args: RequestLeaseRequest) -> Result<LeaseEvalResult>
where
    C: EvalContext + ?Sized,
{
    let prev = ctx.current_lease();
    let requested = args.lease;

    let was_last_leaseholder = prev.same_holder(&requested);
    check_can_receive_lease(&requested.replica, &ctx.replica_set(), was_last_leaseholder)
        .map_err(|reason| LeaseError::rejected(&prev, &requested, reason))?;

    let mut lease = requested.clone();
    let clock = ctx.clock();
    if lease.start.is_empty() {
        lease.start = clock.now();
    }

    if was_last_leaseholder {
        if lease.start < prev.start {
            return Err(LeaseError::rejected(
                &prev,
                &requested,
                RejectionReason::StartMovedBackwards,
            ));
        }
        lease.start = prev.start;
    } else if let LeaseKind::Expiration {
        expiration: Some(prev_expiration),
    } = prev.kind
    {
        // The previous holder may serve until its expiration.
        let prev_end = ClockTimestamp::new(prev_expiration.wall_time, prev_expiration.logical);
        lease.forward_start(prev_end);
    }

    lease.sequence = prev.sequence.next();
    if lease.proposed_at.is_none() {
        lease.proposed_at = Some(clock.now());
    }

    debug!(
        "Evaluated lease request on {}: {} replaces {}",
        ctx.range_id(),
        lease,
        prev
    );

    Ok(LeaseEvalResult {
        replicated: ReplicatedLeaseEffect {
            range_id: ctx.range_id(),
            lease,
            prior_read_summary: None,
            revoked_lease_seq: None,
        },
    })
}

/// Evaluates a transfer of the lease from the evaluating leaseholder to the
/// replica named by `args.lease`.
///
/// Fails with an eligibility error if the target may not hold the lease and
/// with [`LeaseError::StaleLeaseSequence`] if `args.prev_lease` is no longer
/// the installed lease. On success the installed lease is revoked through the
/// context before returning.
pub fn transfer_lease<C>(ctx: &C, args: TransferLeaseRequest) -> Result<LeaseEvalResult>
where
    C: EvalContext + ?Sized,
{
    let prev = ctx.current_lease();
    let target = args.lease.replica;

    let was_last_leaseholder = !prev.is_empty() && prev.replica.replica_id == target.replica_id;
    check_can_receive_lease(&target, &ctx.replica_set(), was_last_leaseholder)?;

    if args.prev_lease.sequence != prev.sequence
        || args.prev_lease.replica.replica_id != prev.replica.replica_id
    {
        return Err(LeaseError::StaleLeaseSequence {
            expected: args.prev_lease.sequence,
            actual: prev.sequence,
        });
    }

    let mut lease = args.lease;
    let clock = ctx.clock();

    // Readings taken after observing the candidate's start exceed it, so the
    // new start is after both the candidate and the start of evaluation.
    clock.update(lease.start);
    let now = clock.now();
    let start = now.max(lease.start);
    lease.forward_start(start);
    lease.sequence = prev.sequence.next();
    if lease.proposed_at.is_none() {
        lease.proposed_at = Some(now);
    }

    let prior_read_summary = ctx
        .current_read_summary()
        .merged(ReadSummary::from_timestamp(lease.start.to_timestamp()));

    ctx.revoke_lease(prev.sequence);

    debug!(
        "Evaluated lease transfer on {}: {} replaces {}, prior reads {}",
        ctx.range_id(),
        lease,
        prev,
        prior_read_summary
    );

    Ok(LeaseEvalResult {
        replicated: ReplicatedLeaseEffect {
            range_id: ctx.range_id(),
            lease,
            prior_read_summary: Some(prior_read_summary),
            revoked_lease_seq: Some(prev.sequence),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rangelease_core::hlc::{Clock, HybridClock, ManualTime, Timestamp};
    use rangelease_core::lease::Lease;
    use rangelease_core::replica::{RangeReplicaSet, ReplicaDescriptor, ReplicaType};
    use rangelease_core::{LeaseErrorKind, LeaseSequence, RangeId, StoreId};

    struct TestContext {
        replicas: RangeReplicaSet,
        clock: HybridClock<ManualTime>,
        lease: Lease,
        read_summary: ReadSummary,
        revoked: Mutex<Option<LeaseSequence>>,
    }

    impl TestContext {
        fn new(replicas: Vec<ReplicaDescriptor>, lease: Lease) -> Self {
            Self {
                replicas: RangeReplicaSet::new(replicas).unwrap(),
                clock: HybridClock::for_testing(ManualTime::new(123)),
                lease,
                read_summary: ReadSummary::default(),
                revoked: Mutex::new(None),
            }
        }
    }

    impl EvalContext for TestContext {
        fn range_id(&self) -> RangeId {
            RangeId::new(1)
        }

        fn store_id(&self) -> StoreId {
            StoreId::new(1)
        }

        fn replica_set(&self) -> RangeReplicaSet {
            self.replicas.clone()
        }

        fn clock(&self) -> &dyn Clock {
            &self.clock
        }

        fn current_lease(&self) -> Lease {
            self.lease.clone()
        }

        fn current_read_summary(&self) -> ReadSummary {
            self.read_summary
        }

        fn revoke_lease(&self, seq: LeaseSequence) {
            *self.revoked.lock() = Some(seq);
        }
    }

    fn voter(id: i32) -> ReplicaDescriptor {
        ReplicaDescriptor::new(id, id, id, ReplicaType::VoterFull)
    }

    fn held_by(replica: ReplicaDescriptor, seq: u64, start: i64, exp: i64) -> Lease {
        let mut lease = Lease::new_expiration(
            replica,
            ClockTimestamp::new(start, 0),
            Timestamp::new(exp, 0),
        );
        lease.sequence = LeaseSequence::new(seq);
        lease
    }

    #[test]
    fn test_request_assigns_start_and_sequence() {
        let ctx = TestContext::new(vec![voter(1), voter(2)], Lease::empty());
        let lease = Lease::new_epoch(voter(1), ClockTimestamp::default(), 1);

        let result = request_lease(&ctx, RequestLeaseRequest { lease }).unwrap();
        assert_eq!(result.lease().sequence, LeaseSequence::new(1));
        assert_eq!(result.lease().start, ClockTimestamp::new(123, 0));
        assert!(result.lease().proposed_at.is_some());
        assert_eq!(result.prior_read_summary(), None);
        assert_eq!(result.revoked_lease_seq(), None);
        assert!(ctx.revoked.lock().is_none());
    }

    #[test]
    fn test_request_extension_keeps_previous_start() {
        let prev = held_by(voter(1), 4, 100, 1_000);
        let ctx = TestContext::new(vec![voter(1), voter(2)], prev);

        let extension = Lease::new_expiration(
            voter(1),
            ClockTimestamp::new(500, 0),
            Timestamp::new(2_000, 0),
        );
        let result = request_lease(&ctx, RequestLeaseRequest { lease: extension }).unwrap();
        assert_eq!(result.lease().start, ClockTimestamp::new(100, 0));
        assert_eq!(result.lease().sequence, LeaseSequence::new(5));
        assert_eq!(result.lease().expiration(), Some(Timestamp::new(2_000, 0)));
    }

    #[test]
    fn test_request_extension_cannot_move_start_backwards() {
        let prev = held_by(voter(1), 4, 100, 1_000);
        let ctx = TestContext::new(vec![voter(1)], prev);
        let extension = Lease::new_expiration(
            voter(1),
            ClockTimestamp::new(50, 0),
            Timestamp::new(2_000, 0),
        );
        let err = request_lease(&ctx, RequestLeaseRequest { lease: extension }).unwrap_err();
        assert_eq!(err.kind(), LeaseErrorKind::LeaseRejected);
    }

    #[test]
    fn test_request_after_expiration_lease_starts_at_previous_expiration() {
        let prev = held_by(voter(1), 2, 100, 1_000);
        let ctx = TestContext::new(vec![voter(1), voter(2)], prev);
        let lease = Lease::new_expiration(
            voter(2),
            ClockTimestamp::new(200, 0),
            Timestamp::new(5_000, 0),
        );
        let result = request_lease(&ctx, RequestLeaseRequest { lease }).unwrap();
        assert_eq!(result.lease().start, ClockTimestamp::new(1_000, 0));
        assert_eq!(result.lease().expiration(), Some(Timestamp::new(5_800, 0)));
        assert_eq!(result.lease().sequence, LeaseSequence::new(3));
    }

    #[test]
    fn test_request_error_messages() {
        let learner = ReplicaDescriptor::new(2, 2, 2, ReplicaType::Learner);
        let ctx = TestContext::new(vec![voter(1), learner], Lease::empty());

        let err = request_lease(
            &ctx,
            RequestLeaseRequest {
                lease: Lease::empty(),
            },
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot replace lease <empty> with <empty>: replica not found in RangeDescriptor"
        );

        let err = request_lease(
            &ctx,
            RequestLeaseRequest {
                lease: Lease {
                    replica: learner,
                    ..Lease::default()
                },
            },
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot replace lease <empty> with repl=(n2,s2):2LEARNER seq=0 start=0,0 exp=<nil>: replica cannot hold lease"
        );
    }

    #[test]
    fn test_transfer_recomputes_start_and_revokes() {
        let prev = Lease {
            replica: voter(1),
            sequence: LeaseSequence::new(1),
            ..Lease::default()
        };
        let mut ctx = TestContext::new(vec![voter(1), voter(2)], prev.clone());
        ctx.read_summary = ReadSummary::from_timestamp(Timestamp::new(50, 0));

        let now = ctx.clock.now();
        let candidate = Lease::new_epoch(voter(2), now, 1);
        ctx.clock.physical().advance(1000);
        let before_eval = ctx.clock.now();

        let result = transfer_lease(
            &ctx,
            TransferLeaseRequest {
                lease: candidate.clone(),
                prev_lease: prev,
            },
        )
        .unwrap();

        assert!(result.lease().start > candidate.start);
        assert!(result.lease().start > before_eval);
        assert_eq!(result.lease().sequence, LeaseSequence::new(2));
        assert_eq!(result.revoked_lease_seq(), Some(LeaseSequence::new(1)));
        assert_eq!(*ctx.revoked.lock(), Some(LeaseSequence::new(1)));
        assert_eq!(
            result.prior_read_summary(),
            Some(ReadSummary::from_timestamp(
                result.lease().start.to_timestamp()
            ))
        );
    }

    #[test]
    fn test_transfer_rejects_stale_previous_lease() {
        let current = held_by(voter(1), 3, 100, 1_000);
        let ctx = TestContext::new(vec![voter(1), voter(2)], current.clone());
        let stale = Lease {
            sequence: LeaseSequence::new(2),
            ..current
        };
        let err = transfer_lease(
            &ctx,
            TransferLeaseRequest {
                lease: Lease::new_epoch(voter(2), ClockTimestamp::new(150, 0), 1),
                prev_lease: stale,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), LeaseErrorKind::StaleLeaseSequence);
        assert!(err.is_retryable());
        assert!(ctx.revoked.lock().is_none());
    }

    #[test]
    fn test_transfer_to_learner_fails_before_revoking() {
        let learner = ReplicaDescriptor::new(2, 2, 2, ReplicaType::Learner);
        let ctx = TestContext::new(vec![voter(1), learner], Lease::empty());
        let err = transfer_lease(
            &ctx,
            TransferLeaseRequest {
                lease: Lease {
                    replica: learner,
                    ..Lease::default()
                },
                prev_lease: Lease::empty(),
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "replica cannot hold lease");
        assert!(ctx.revoked.lock().is_none());
    }
}
