//! Chaos test: random writers with lost and delayed messages.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rill_engine::{EntryEngine, UpdateEntryInput};
use rill_integration_tests::{IntegrationCluster, text};

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_random_writes_with_loss_converge() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let c = IntegrationCluster::new(4);
    c.network().set_jitter(Duration::from_millis(10));

    let origin = c.node(0).create_entry(text("v0")).await.unwrap();
    c.converge_from(0, origin).await.unwrap();

    let mut deletes = 0;
    for round in 0..30 {
        let writer = rng.random_range(0..c.len());
        let node = c.node(writer);
        c.network().drop_next(rng.random_range(0..3));

        if rng.random_range(0..10) == 0 {
            node.delete_entry(origin).await.unwrap();
            deletes += 1;
            continue;
        }

        // Build on whatever the writer currently sees as latest.
        let previous = node.get_latest(origin).await.unwrap().unwrap().hash();
        node.update_entry(UpdateEntryInput {
            original_hash: origin,
            previous_hash: previous,
            updated_content: text(&format!("round {round} by node {writer}")),
        })
        .await
        .unwrap();
    }

    c.network().drop_next(0);
    c.converge_all(origin).await.unwrap();

    let status = c.node(0).lineage_status(&origin).unwrap();
    assert_eq!(status.deletes.len(), deletes);
    let latest = c.node(0).get_latest(origin).await.unwrap().unwrap().hash();
    assert_eq!(status.latest, latest);
    for i in 1..c.len() {
        assert_eq!(c.node(i).lineage_status(&origin), Some(status.clone()));
        assert_eq!(
            c.node(i).get_latest(origin).await.unwrap().unwrap().hash(),
            latest
        );
    }
    assert!(c.network().stats().dropped > 0);
}
