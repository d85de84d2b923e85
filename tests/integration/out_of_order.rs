//! Integration test: delivery out of order.
//!
//! Every write is published on its own message, and jitter lets later
//! messages overtake earlier ones.

use std::time::Duration;

use rill_engine::{EntryEngine, UpdateEntryInput};
use rill_integration_tests::{IntegrationCluster, text};

/// A burst of updates under jitter still converges to the writer's history.
#[tokio::test]
async fn test_burst_of_updates_under_jitter() {
    let c = IntegrationCluster::new(3);
    c.network().set_jitter(Duration::from_millis(25));
    let a = c.node(0);

    let origin = a.create_entry(text("v0")).await.unwrap();
    let mut previous = origin;
    for i in 1..=8 {
        previous = a
            .update_entry(UpdateEntryInput {
                original_hash: origin,
                previous_hash: previous,
                updated_content: text(&format!("v{i}")),
            })
            .await
            .unwrap();
    }
    c.converge_from(0, origin).await.unwrap();

    let expected: Vec<_> = a
        .get_all_revisions(origin)
        .await
        .unwrap()
        .iter()
        .map(|r| r.hash())
        .collect();
    assert_eq!(expected.len(), 9);

    for i in 1..c.len() {
        let got: Vec<_> = c
            .node(i)
            .get_all_revisions(origin)
            .await
            .unwrap()
            .iter()
            .map(|r| r.hash())
            .collect();
        assert_eq!(got, expected, "node {i} history differs");
        assert_eq!(c.latest_text(i, origin).await.as_deref(), Some("v8"));
    }
}

/// An update published while the create was lost is held until the
/// create arrives.
#[tokio::test]
async fn test_update_arrives_before_create() {
    let c = IntegrationCluster::new(2);
    let (a, b) = (c.node(0), c.node(1));

    // Lose the create's publish.
    c.network().drop_next(1);
    let origin = a.create_entry(text("v0")).await.unwrap();
    let u1 = a
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("v1"),
        })
        .await
        .unwrap();

    // The update is delivered but its lineage has no create yet.
    for _ in 0..200 {
        if b.graph().contains(&u1) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(b.graph().contains(&u1));
    assert!(b.get_latest(origin).await.unwrap().is_none());

    let applied = b.pull().await.unwrap();
    assert_eq!(applied, 1);
    assert_eq!(b.get_latest(origin).await.unwrap().unwrap().hash(), u1);
    assert_eq!(b.get_all_revisions(origin).await.unwrap().len(), 2);
}

/// Pulling an already converged lineage applies nothing.
#[tokio::test]
async fn test_redelivery_is_idempotent() {
    let c = IntegrationCluster::new(3);
    let origin = c.node(0).create_entry(text("v0")).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    for i in 0..c.len() {
        assert_eq!(c.node(i).pull_origin(origin).await.unwrap(), 0);
    }
    let before = c.node(1).chain().all_actions().unwrap().len();
    c.node(0).push(&c.node(0).graph().lineage_actions(&origin)).await.unwrap();
    c.converge_from(0, origin).await.unwrap();
    assert_eq!(c.node(1).chain().all_actions().unwrap().len(), before);
}
