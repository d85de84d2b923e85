//! Single-node create, update, delete and read tests.

use rill_types::AnyHash;

use crate::error::EngineError;
use crate::facade::EntryEngine;
use crate::record::{Signal, TextEntry, UpdateEntryInput};

use super::helpers::{LOREM, single_node, text};

// -----------------------------------------------------------------------
// Create / read
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_create_then_get_original() {
    let node = single_node(1);
    let origin = node.create_entry(text(LOREM)).await.unwrap();

    let record = node.get_original(origin).await.unwrap().unwrap();
    assert_eq!(record.hash(), origin);
    assert_eq!(record.entry::<TextEntry>().unwrap().content, LOREM);
}

#[tokio::test]
async fn test_create_is_latest_and_only_revision() {
    let node = single_node(1);
    let origin = node.create_entry(text("first")).await.unwrap();

    let latest = node.get_latest(origin).await.unwrap().unwrap();
    assert_eq!(latest.hash(), origin);

    let revisions = node.get_all_revisions(origin).await.unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].hash(), origin);
}

#[tokio::test]
async fn test_same_content_twice_gives_distinct_origins() {
    let node = single_node(1);
    let a = node.create_entry(text("same")).await.unwrap();
    let b = node.create_entry(text("same")).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(node.content().list().await.unwrap().len(), 1);
}

// -----------------------------------------------------------------------
// Updates
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_chained_updates() {
    let node = single_node(1);
    let origin = node.create_entry(text("v0")).await.unwrap();

    let mut previous = origin;
    let mut updates = Vec::new();
    for i in 1..=4 {
        let hash = node
            .update_entry(UpdateEntryInput {
                original_hash: origin,
                previous_hash: previous,
                updated_content: text(&format!("v{i}")),
            })
            .await
            .unwrap();
        updates.push(hash);
        previous = hash;
    }

    let revisions = node.get_all_revisions(origin).await.unwrap();
    assert_eq!(revisions.len(), 5);
    assert_eq!(revisions[0].hash(), origin);
    for (i, record) in revisions.iter().enumerate() {
        assert_eq!(record.entry::<TextEntry>().unwrap().content, format!("v{i}"));
    }

    let latest = node.get_latest(origin).await.unwrap().unwrap();
    assert_eq!(latest.hash(), *updates.last().unwrap());
    assert_eq!(latest.entry::<TextEntry>().unwrap().content, "v4");

    // The original stays readable.
    let original = node.get_original(origin).await.unwrap().unwrap();
    assert_eq!(original.entry::<TextEntry>().unwrap().content, "v0");
}

#[tokio::test]
async fn test_update_writes_update_link() {
    let node = single_node(1);
    let origin = node.create_entry(text("v0")).await.unwrap();
    let u1 = node
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("v1"),
        })
        .await
        .unwrap();
    let u2 = node
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: u1,
            updated_content: text("v2"),
        })
        .await
        .unwrap();

    let targets: Vec<_> = node
        .get_update_links(origin)
        .into_iter()
        .map(|link| match link.kind {
            rill_chain::ActionKind::CreateLink { target, .. } => target,
            other => panic!("not a link: {other:?}"),
        })
        .collect();
    assert_eq!(targets, vec![AnyHash::from(u1), AnyHash::from(u2)]);
}

#[tokio::test]
async fn test_get_original_of_update_returns_update_content() {
    let node = single_node(1);
    let origin = node.create_entry(text("v0")).await.unwrap();
    let u1 = node
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("v1"),
        })
        .await
        .unwrap();

    let record = node.get_original(u1).await.unwrap().unwrap();
    assert_eq!(record.entry::<TextEntry>().unwrap().content, "v1");
}

// -----------------------------------------------------------------------
// Deletes
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_delete_keeps_original_readable() {
    let node = single_node(1);
    let origin = node.create_entry(text(LOREM)).await.unwrap();
    assert!(node.get_all_deletes(origin).await.unwrap().unwrap().is_empty());
    assert!(node.get_oldest_delete(origin).await.unwrap().is_none());

    let d1 = node.delete_entry(origin).await.unwrap();
    let deletes = node.get_all_deletes(origin).await.unwrap().unwrap();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].hash(), d1);
    assert_eq!(deletes[0].deletes_hash(), Some(origin));

    let d2 = node.delete_entry(origin).await.unwrap();
    let deletes = node.get_all_deletes(origin).await.unwrap().unwrap();
    assert_eq!(deletes.len(), 2);

    let oldest = node.get_oldest_delete(origin).await.unwrap().unwrap();
    assert_eq!(oldest.hash(), d1);
    assert!(oldest.timestamp() < deletes[1].timestamp());
    assert_eq!(deletes[1].hash(), d2);

    assert!(node.get_original(origin).await.unwrap().is_some());
    assert!(node.get_latest(origin).await.unwrap().is_some());
}

#[tokio::test]
async fn test_oldest_delete_of_origin_covers_updates() {
    let node = single_node(1);
    let origin = node.create_entry(text("v0")).await.unwrap();
    let u1 = node
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("v1"),
        })
        .await
        .unwrap();

    let d = node.delete_entry(u1).await.unwrap();

    // The origin has no direct deletes but its lineage does.
    assert!(node.get_all_deletes(origin).await.unwrap().unwrap().is_empty());
    assert_eq!(node.get_oldest_delete(origin).await.unwrap().unwrap().hash(), d);
    assert_eq!(node.get_oldest_delete(u1).await.unwrap().unwrap().hash(), d);
}

#[tokio::test]
async fn test_unknown_hash_reads_are_absent() {
    let node = single_node(1);
    let unknown = rill_types::ActionHash::from_data(b"nothing");

    assert!(node.get_latest(unknown).await.unwrap().is_none());
    assert!(node.get_original(unknown).await.unwrap().is_none());
    assert!(node.get_all_revisions(unknown).await.unwrap().is_empty());
    assert!(node.get_oldest_delete(unknown).await.unwrap().is_none());
    assert!(node.get_all_deletes(unknown).await.unwrap().is_none());
}

// -----------------------------------------------------------------------
// Signals
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_signals_for_local_writes() {
    let node = single_node(1);
    let mut signals = node.subscribe();

    let origin = node.create_entry(text("v0")).await.unwrap();
    let u1 = node
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("v1"),
        })
        .await
        .unwrap();
    let d = node.delete_entry(u1).await.unwrap();

    match signals.recv().await.unwrap() {
        Signal::EntryCreated { action } => assert_eq!(action.hash, origin),
        other => panic!("unexpected signal: {other:?}"),
    }
    match signals.recv().await.unwrap() {
        Signal::EntryUpdated {
            action,
            original_hash,
        } => {
            assert_eq!(action.hash, u1);
            assert_eq!(original_hash, origin);
        }
        other => panic!("unexpected signal: {other:?}"),
    }
    assert!(matches!(
        signals.recv().await.unwrap(),
        Signal::LinkCreated {
            link_type: rill_chain::LinkType::EntryUpdates,
            ..
        }
    ));
    match signals.recv().await.unwrap() {
        Signal::EntryDeleted {
            action,
            deletes_hash,
        } => {
            assert_eq!(action.hash, d);
            assert_eq!(deletes_hash, u1);
        }
        other => panic!("unexpected signal: {other:?}"),
    }
}

// -----------------------------------------------------------------------
// Chain
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_local_writes_form_a_valid_chain() {
    let node = single_node(1);
    let origin = node.create_entry(text("v0")).await.unwrap();
    let u1 = node
        .update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: origin,
            updated_content: text("v1"),
        })
        .await
        .unwrap();
    node.delete_entry(u1).await.unwrap();

    // create, update, update link, delete
    assert_eq!(node.chain().verify_chain(&node.agent_id()).unwrap(), 4);
}

#[tokio::test]
async fn test_pull_without_transport() {
    let node = single_node(1);
    node.create_entry(text("v0")).await.unwrap();
    assert!(matches!(node.pull().await, Err(EngineError::NoTransport)));
}
