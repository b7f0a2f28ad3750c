//! # Range Lease Testing
//!
//! Test support for the range-lease protocol: an evaluation context that can
//! be configured by hand, an in-memory replicated log with fault injection,
//! a multi-store cluster harness and transfer churn scenarios.

pub mod cluster;
pub mod consensus_sim;
pub mod fault_injection;
pub mod mock_context;
pub mod scenarios;

pub use cluster::{LeaseTestCluster, TestNode, TestReplica, CLUSTER_START_NANOS};
pub use consensus_sim::{InMemoryConsensusLog, LogConditions, LogStats};
pub use fault_injection::{ConsensusFault, FaultInjector};
pub use mock_context::MockEvalContext;
pub use scenarios::{
    create_churn_scenarios, run_transfer_churn, ScenarioResult, TransferChurnScenario,
};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber. Filtered by `RUST_LOG`,
/// `warn` by default. Calling it more than once is harmless.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
