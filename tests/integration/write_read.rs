//! Integration test: writes on one node, reads on another.

use rill_engine::{EntryEngine, TextEntry, UpdateEntryInput};
use rill_integration_tests::{IntegrationCluster, LOREM, text};

/// Create on A, sync, B reads the original.
#[tokio::test]
async fn test_create_sync_get_original() {
    let c = IntegrationCluster::new(2);

    let origin = c.node(0).create_entry(text(LOREM)).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    let record = c.node(1).get_original(origin).await.unwrap().unwrap();
    assert_eq!(record.entry::<TextEntry>().unwrap().content, LOREM);
}

/// Create, update twice, sync: B has three revisions ending in the second update.
#[tokio::test]
async fn test_two_updates_sync_history() {
    let c = IntegrationCluster::new(2);
    let a = c.node(0);

    let origin = a.create_entry(text(LOREM)).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    let u1 = a
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("Lorem ipsum, first revision."),
        })
        .await
        .unwrap();
    let u2 = a
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: u1,
            updated_content: text("Lorem ipsum, second revision."),
        })
        .await
        .unwrap();
    c.converge_from(0, origin).await.unwrap();

    let b = c.node(1);
    let revisions = b.get_all_revisions(origin).await.unwrap();
    let hashes: Vec<_> = revisions.iter().map(|r| r.hash()).collect();
    assert_eq!(hashes, vec![origin, u1, u2]);

    let latest = b.get_latest(origin).await.unwrap().unwrap();
    assert_eq!(latest.hash(), u2);
    assert_eq!(
        c.latest_text(1, origin).await.as_deref(),
        Some("Lorem ipsum, second revision.")
    );
}

/// Create, sync, delete, sync: B has exactly one delete.
#[tokio::test]
async fn test_delete_sync() {
    let c = IntegrationCluster::new(2);
    let a = c.node(0);

    let origin = a.create_entry(text(LOREM)).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    let d = a.delete_entry(origin).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    let b = c.node(1);
    let deletes = b.get_all_deletes(origin).await.unwrap().unwrap();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].hash(), d);
    assert!(b.get_oldest_delete(origin).await.unwrap().is_some());
    assert!(b.get_original(origin).await.unwrap().is_some());
}

/// Every node writes its own entry; every entry reaches every node.
#[tokio::test]
async fn test_every_node_writes() {
    let c = IntegrationCluster::new(4);

    let mut origins = Vec::new();
    for i in 0..c.len() {
        let origin = c
            .node(i)
            .create_entry(text(&format!("entry from node {i}")))
            .await
            .unwrap();
        origins.push(origin);
    }
    for (i, origin) in origins.iter().enumerate() {
        c.converge_from(i, *origin).await.unwrap();
    }

    for reader in 0..c.len() {
        for (writer, origin) in origins.iter().enumerate() {
            assert_eq!(
                c.latest_text(reader, *origin).await,
                Some(format!("entry from node {writer}")),
                "node {reader} missing entry from node {writer}"
            );
        }
    }
}

/// Updates written on different nodes extend one history.
#[tokio::test]
async fn test_update_chain_across_nodes() {
    let c = IntegrationCluster::new(3);

    let origin = c.node(0).create_entry(text("v0")).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    let mut previous = origin;
    for i in 1..=6 {
        let writer = i % c.len();
        previous = c
            .node(writer)
            .update_entry(UpdateEntryInput {
                original_hash: origin,
                previous_hash: previous,
                updated_content: text(&format!("v{i}")),
            })
            .await
            .unwrap();
        c.converge_from(writer, origin).await.unwrap();
    }

    for i in 0..c.len() {
        let revisions = c.node(i).get_all_revisions(origin).await.unwrap();
        assert_eq!(revisions.len(), 7);
        assert_eq!(revisions.last().unwrap().hash(), previous);
        assert_eq!(c.latest_text(i, origin).await.as_deref(), Some("v6"));
    }
}
