//! Collecting replica state from the survivors of a cluster

use rangelease_core::recovery::{ClusterReplicaInfo, ReplicaInfo, ReplicaInfoCollector};
use rangelease_core::{LeaseSequence, NodeId, RangeId, ReplicaId, StoreId};
use rangelease_engine::{CancellationSignal, LeaseConfig};
use rangelease_testing::{init_test_tracing, LeaseTestCluster, TestReplica};
use uuid::Uuid;

const R1: RangeId = RangeId(1);
const R2: RangeId = RangeId(2);

fn report(cluster: &LeaseTestCluster, replica: &TestReplica) -> ReplicaInfo {
    let node = cluster.node(replica.store_id()).unwrap();
    let lease = replica.current_lease();
    ReplicaInfo {
        node_id: node.node_id,
        store_id: node.store_id,
        desc: replica.descriptor(),
        applied_index: replica.statistics().range.applied_index,
        lease: (!lease.is_empty()).then_some(lease),
    }
}

/// Node 1 is lost; nodes 2 and 3 report what they applied. Node 3 was cut off
/// from the log of range 2 and knows of no lease there.
async fn survivors_of_partial_outage() -> (LeaseTestCluster, ClusterReplicaInfo) {
    init_test_tracing();
    let mut cluster = LeaseTestCluster::new(3, LeaseConfig::default());
    let d1 = cluster.add_voter_range(R1).unwrap();
    let d2 = cluster.add_voter_range(R2).unwrap();

    let r1_holder = cluster.replica(R1, StoreId::new(1)).unwrap();
    r1_holder.acquire_lease(CancellationSignal::never()).await.unwrap();
    r1_holder
        .transfer_lease_to(ReplicaId::new(2), CancellationSignal::never())
        .await
        .unwrap();

    cluster.log(R2).unwrap().isolate(StoreId::new(3));
    cluster
        .replica(R2, StoreId::new(1))
        .unwrap()
        .acquire_lease(CancellationSignal::never())
        .await
        .unwrap();

    let mut collector = ReplicaInfoCollector::with_cluster_id(Uuid::nil());
    collector.add_descriptor(d1);
    collector.add_descriptor(d2);

    for store in [StoreId::new(2), StoreId::new(3)] {
        let node_id = cluster.node(store).unwrap().node_id;
        collector.begin_node(node_id);

        // The first attempt on node 3 breaks after one replica.
        if store == StoreId::new(3) {
            let replica = cluster.replica(R1, store).unwrap();
            collector.add_replica(report(&cluster, &replica)).unwrap();
            collector.begin_node(node_id);
        }

        for range in [R1, R2] {
            let replica = cluster.replica(range, store).unwrap();
            collector.add_replica(report(&cluster, &replica)).unwrap();
        }
        collector.finish_node(node_id).unwrap();
    }

    let (info, stats) = collector.finish();
    assert_eq!(stats.nodes, 2);
    assert_eq!(stats.stores, 2);
    assert_eq!(stats.descriptors, 2);
    (cluster, info)
}

#[tokio::test]
async fn test_collect_from_survivors() {
    let (_cluster, info) = survivors_of_partial_outage().await;

    let counters = info.counters();
    assert_eq!(counters.nodes, 2);
    assert_eq!(counters.stores, 2);
    assert_eq!(counters.replicas, 4);
    assert_eq!(counters.descriptors, 2);

    let node3: Vec<_> = info
        .local_info
        .iter()
        .flat_map(|n| n.replicas.iter())
        .filter(|r| r.node_id == NodeId::new(3))
        .collect();
    assert_eq!(node3.len(), 2);
    let cut_off = node3.iter().find(|r| r.range_id() == R2).unwrap();
    assert_eq!(cut_off.lease, None);
    assert_eq!(cut_off.applied_index, 0);
}

#[tokio::test]
async fn test_latest_leases_from_survivors() {
    let (cluster, info) = survivors_of_partial_outage().await;

    let latest = info.latest_leases();
    assert_eq!(latest.len(), 2);

    let r1 = &latest[&R1];
    assert_eq!(r1.sequence, LeaseSequence::new(2));
    assert!(r1.owned_by(StoreId::new(2)));
    assert_eq!(r1, &cluster.replica(R1, StoreId::new(1)).unwrap().current_lease());

    let r2 = &latest[&R2];
    assert_eq!(r2.sequence, LeaseSequence::new(1));
    assert!(r2.owned_by(StoreId::new(1)));
}

#[tokio::test]
async fn test_collected_info_round_trips_through_json() {
    let (_cluster, info) = survivors_of_partial_outage().await;

    let json = info.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["cluster_id"], Uuid::nil().to_string());
    assert_eq!(value["descriptors"].as_array().unwrap().len(), 2);

    let restored = ClusterReplicaInfo::from_json(&json).unwrap();
    assert_eq!(restored, info);
    assert_eq!(restored.latest_leases(), info.latest_leases());
}
