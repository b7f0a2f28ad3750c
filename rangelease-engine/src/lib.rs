//! # Range Lease Engine
//!
//! Evaluation, application and serving for the range-lease protocol.
//!
//! A lease change goes through four steps on the proposing replica: the
//! range's exclusive latch is taken, the request is evaluated against the
//! installed lease, the result is proposed through the replicated log, and
//! the committed effect is applied. Every other replica applies the same
//! committed effect when the log delivers it.
//!
//! ## Key Components
//!
//! - **RangeLeaseReplica**: per-range orchestrator (latch, evaluate, propose, apply)
//! - **evaluator**: RequestLease and TransferLease evaluation
//! - **LeaseApplier**: idempotent, durable installation of committed leases
//! - **LatchManager**: shared/exclusive range latches
//! - **LeaseNotificationBus**: lease-change events for the command layer
//! - **LeaseConfig**: lease durations, proposal timeout and lease type
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use rangelease_core::consensus::{Committed, ConsensusLog, ReplicatedLeaseEffect};
//! use rangelease_core::hlc::HybridClock;
//! use rangelease_core::liveness::StaticLiveness;
//! use rangelease_core::replica::{RangeDescriptor, RangeReplicaSet, ReplicaDescriptor, ReplicaType};
//! use rangelease_core::{NodeId, RangeId, Result, StoreId};
//! use rangelease_engine::{
//!     CancellationSignal, LatchManager, LeaseConfig, LeaseNotificationBus, RangeLeaseReplica,
//!     ReplicaServices,
//! };
//! use rangelease_persistence::InMemoryPersistence;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct SingleNodeLog;
//!
//! #[async_trait::async_trait]
//! impl ConsensusLog for SingleNodeLog {
//!     async fn propose(&self, _effect: ReplicatedLeaseEffect) -> Result<Committed> {
//!         Ok(Committed { index: 1 })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let liveness = Arc::new(StaticLiveness::new());
//!     liveness.set_epoch(NodeId::new(1), 1);
//!
//!     let services = ReplicaServices {
//!         clock: Arc::new(HybridClock::system(Duration::from_millis(500))),
//!         liveness,
//!         consensus: Arc::new(SingleNodeLog),
//!         persistence: Arc::new(InMemoryPersistence::new()),
//!         latches: Arc::new(LatchManager::new()),
//!         notifications: Arc::new(LeaseNotificationBus::new()),
//!     };
//!
//!     let replicas = RangeReplicaSet::new(vec![ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterFull)])?;
//!     let descriptor = RangeDescriptor::new(RangeId::new(1), "a", "z", replicas);
//!     let replica = RangeLeaseReplica::new(LeaseConfig::default(), StoreId::new(1), descriptor, services)?;
//!
//!     let lease = replica.acquire_lease(CancellationSignal::never()).await?;
//!     println!("acquired {}", lease);
//!     Ok(())
//! }
//! ```

pub mod applier;
pub mod cancel;
pub mod config;
pub mod eval;
pub mod evaluator;
pub mod latch;
pub mod notifications;
pub mod replica;
pub mod state;

pub use applier::*;
pub use cancel::*;
pub use config::*;
pub use eval::*;
pub use latch::*;
pub use notifications::*;
pub use replica::*;
pub use state::*;
