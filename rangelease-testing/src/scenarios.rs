//! Lease transfer churn scenarios.
//!
//! A scenario moves the lease of one range around the cluster while reads
//! (some at future timestamps) are served between transfers, and checks
//! after every step that the new holder can never write beneath a read its
//! predecessor served.

use std::time::{Duration, Instant};
use tracing::{info, warn};

use rangelease_core::hlc::{Clock, Timestamp};
use rangelease_core::read_summary::ReadScope;
use rangelease_core::{LeaseErrorKind, RangeId, StoreId};
use rangelease_engine::CancellationSignal;

use crate::cluster::LeaseTestCluster;

#[derive(Debug, Clone)]
pub struct TransferChurnScenario {
    pub name: String,
    pub rounds: usize,
    pub reads_per_round: usize,
    /// How far ahead of the present the future reads are served
    pub future_read_offset: Duration,
    /// Clock advance between rounds
    pub clock_step: Duration,
    /// Probability that a transfer proposal is rejected
    pub reject_rate: f64,
}

#[derive(Debug, Default)]
pub struct ScenarioResult {
    pub scenario: String,
    pub transfers_attempted: usize,
    pub transfers_committed: usize,
    pub transfers_failed: usize,
    pub reads_served: usize,
    pub violations: Vec<String>,
    pub duration: Duration,
}

impl ScenarioResult {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub fn create_churn_scenarios() -> Vec<TransferChurnScenario> {
    vec![
        TransferChurnScenario {
            name: "steady_transfers".to_string(),
            rounds: 10,
            reads_per_round: 4,
            future_read_offset: Duration::ZERO,
            clock_step: Duration::from_millis(100),
            reject_rate: 0.0,
        },
        TransferChurnScenario {
            name: "future_reads".to_string(),
            rounds: 10,
            reads_per_round: 4,
            future_read_offset: Duration::from_secs(1),
            clock_step: Duration::from_millis(10),
            reject_rate: 0.0,
        },
        TransferChurnScenario {
            name: "flaky_consensus".to_string(),
            rounds: 20,
            reads_per_round: 2,
            future_read_offset: Duration::from_millis(500),
            clock_step: Duration::from_millis(50),
            reject_rate: 0.3,
        },
    ]
}

/// Runs `scenario` against `range_id`, which must already have a
/// leaseholder.
pub async fn run_transfer_churn(
    cluster: &LeaseTestCluster,
    range_id: RangeId,
    scenario: &TransferChurnScenario,
) -> anyhow::Result<ScenarioResult> {
    let started = Instant::now();
    let mut result = ScenarioResult {
        scenario: scenario.name.clone(),
        ..ScenarioResult::default()
    };

    let log = cluster.log(range_id)?;
    log.faults().set_reject_rate(scenario.reject_rate);

    let stores = cluster.store_ids();
    for round in 0..scenario.rounds {
        let holders = cluster.leaseholders(range_id);
        let [holder] = holders.as_slice() else {
            result
                .violations
                .push(format!("round {}: leaseholders {:?}", round, holders));
            break;
        };
        let holder = *holder;
        let replica = cluster.replica(range_id, holder)?;
        let prev = replica.current_lease();

        let mut max_read = Timestamp::MIN;
        for i in 0..scenario.reads_per_round {
            let node = cluster.node(holder)?;
            let now = node.clock.now().to_timestamp();
            let ts = if i % 2 == 1 {
                now.add(scenario.future_read_offset.as_nanos() as i64, 0)
            } else {
                now
            };
            replica.serve_read(ReadScope::Global, ts).await?;
            max_read.forward(ts);
            result.reads_served += 1;
        }

        let target = next_store(&stores, holder);
        let target_replica = cluster.replica(range_id, target)?;
        let target_id = match target_replica.local_replica() {
            Some(desc) => desc.replica_id,
            None => {
                warn!("Store {} has no replica of {}", target, range_id);
                continue;
            }
        };

        result.transfers_attempted += 1;
        match replica
            .transfer_lease_to(target_id, CancellationSignal::never())
            .await
        {
            Ok(lease) => {
                result.transfers_committed += 1;
                if lease.sequence != prev.sequence.next() {
                    result.violations.push(format!(
                        "round {}: sequence {} after {}",
                        round, lease.sequence, prev.sequence
                    ));
                }
                let summary = target_replica.read_summary();
                if summary.global.low_water < max_read {
                    result.violations.push(format!(
                        "round {}: new holder low water {} below served read {}",
                        round, summary.global.low_water, max_read
                    ));
                }
                let write_ts = target_replica
                    .serve_write(ReadScope::Global, max_read, lease.sequence)
                    .await?;
                if write_ts <= max_read {
                    result.violations.push(format!(
                        "round {}: write at {} not above served read {}",
                        round, write_ts, max_read
                    ));
                }
            }
            Err(e) if e.kind() == LeaseErrorKind::CommitFailed => {
                result.transfers_failed += 1;
                warn!("Transfer in round {} did not commit: {}", round, e);
            }
            Err(e) => {
                result.transfers_failed += 1;
                result
                    .violations
                    .push(format!("round {}: unexpected error {}", round, e));
            }
        }

        cluster.advance_clocks(scenario.clock_step);
    }

    log.faults().clear();
    result.duration = started.elapsed();
    info!(
        "Scenario {}: {}/{} transfers committed, {} reads, {} violations",
        result.scenario,
        result.transfers_committed,
        result.transfers_attempted,
        result.reads_served,
        result.violations.len()
    );
    Ok(result)
}

fn next_store(stores: &[StoreId], current: StoreId) -> StoreId {
    let position = stores.iter().position(|s| *s == current).unwrap_or(0);
    stores[(position + 1) % stores.len()]
}
