//! Chaos test: network partition.
//!
//! 4-node cluster split 2 vs 2. Each side keeps writing to the same entry.
//! After healing, every node settles on one history and sees every delete.

use rill_engine::{EntryEngine, UpdateEntryInput};
use rill_integration_tests::{IntegrationCluster, text};

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_partition_branches_then_heals() {
    let c = IntegrationCluster::new(4);

    let origin = c.node(0).create_entry(text("v0")).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    // --- Phase 1: split ---
    c.partition(&[0, 1], &[2, 3]);

    let left = c
        .node(0)
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("left side"),
        })
        .await
        .unwrap();
    let right = c
        .node(2)
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("right side"),
        })
        .await
        .unwrap();
    let right_delete = c.node(3).delete_entry(origin).await.unwrap();

    c.node(0)
        .await_convergence(&[c.node_id(1)], origin, c.policy())
        .await
        .unwrap();
    c.node(2)
        .await_convergence(&[c.node_id(3)], origin, c.policy())
        .await
        .unwrap();

    // Each side only sees its own branch.
    assert_eq!(c.latest_text(1, origin).await.as_deref(), Some("left side"));
    assert_eq!(c.latest_text(3, origin).await.as_deref(), Some("right side"));
    assert!(c.node(1).get_oldest_delete(origin).await.unwrap().is_none());

    // --- Phase 2: heal ---
    c.heal();
    c.converge_all(origin).await.unwrap();

    let winner = c.node(0).get_latest(origin).await.unwrap().unwrap().hash();
    assert!(winner == left || winner == right);
    for i in 0..c.len() {
        let node = c.node(i);
        assert_eq!(node.get_latest(origin).await.unwrap().unwrap().hash(), winner);
        assert_eq!(node.get_all_revisions(origin).await.unwrap().len(), 2);
        assert_eq!(
            node.get_oldest_delete(origin).await.unwrap().unwrap().hash(),
            right_delete
        );
        // Both branches stay readable.
        assert!(node.get_original(left).await.unwrap().is_some());
        assert!(node.get_original(right).await.unwrap().is_some());
    }
}

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_minority_writer_catches_up() {
    let c = IntegrationCluster::new(5);

    let origin = c.node(0).create_entry(text("v0")).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    c.partition(&[4], &[0, 1, 2, 3]);
    let mut previous = origin;
    for i in 1..=3 {
        previous = c
            .node(4)
            .update_entry(UpdateEntryInput {
                original_hash: origin,
                previous_hash: previous,
                updated_content: text(&format!("isolated v{i}")),
            })
            .await
            .unwrap();
    }
    assert_eq!(c.latest_text(0, origin).await.as_deref(), Some("v0"));

    c.heal();
    c.converge_from(4, origin).await.unwrap();
    for i in 0..c.len() {
        assert_eq!(
            c.node(i).get_latest(origin).await.unwrap().unwrap().hash(),
            previous
        );
        assert_eq!(c.node(i).get_all_revisions(origin).await.unwrap().len(), 4);
    }
}
