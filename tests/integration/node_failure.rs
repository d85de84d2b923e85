//! Integration test: node failure.
//!
//! A down node blocks convergence with a timeout naming it; once revived
//! it catches up.

use std::time::Duration;

use rill_engine::{EngineError, EntryEngine, UpdateEntryInput};
use rill_integration_tests::{IntegrationCluster, LOREM, text};

#[tokio::test]
async fn test_down_node_times_out_then_catches_up() {
    let c = IntegrationCluster::new(3);
    c.kill_node(2);

    let origin = c.node(0).create_entry(text(LOREM)).await.unwrap();
    let u1 = c
        .node(0)
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("edited while node 2 was down"),
        })
        .await
        .unwrap();

    // Live nodes still converge with each other.
    c.node(0)
        .await_convergence(&[c.node_id(1)], origin, c.policy())
        .await
        .unwrap();

    let short = c.policy().with_timeout(Duration::from_millis(200));
    match c.node(0).await_convergence(&c.others(0), origin, short).await {
        Err(EngineError::SyncTimeout { lagging, peers, .. }) => {
            assert_eq!(lagging, 1);
            assert_eq!(peers, vec![c.node_id(2)]);
        }
        other => panic!("expected SyncTimeout, got {other:?}"),
    }
    assert!(c.node(2).get_original(origin).await.unwrap().is_none());

    c.revive_node(2);
    c.converge_from(0, origin).await.unwrap();
    assert_eq!(
        c.node(2).get_latest(origin).await.unwrap().unwrap().hash(),
        u1
    );
}

#[tokio::test]
async fn test_revived_node_pulls_what_it_missed() {
    let c = IntegrationCluster::new(3);

    let origin = c.node(0).create_entry(text("v0")).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    c.kill_node(2);
    let d = c.node(1).delete_entry(origin).await.unwrap();
    c.revive_node(2);

    // Node 2 already watches the origin, so a plain pull repairs it.
    assert!(c.node(2).interests().contains(&origin));
    assert!(c.node(2).pull().await.unwrap() >= 1);
    let deletes = c.node(2).get_all_deletes(origin).await.unwrap().unwrap();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].hash(), d);
}
