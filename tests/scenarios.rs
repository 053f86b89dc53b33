//! End-to-end scenarios exercising the broker's core guarantees, run
//! against the in-memory reference backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use serde_json::json;
use sync_engine::{InMemoryStore, Method, Store, SyncEngine, SyncError};

fn new_engine() -> SyncEngine<InMemoryStore> {
    let _ = env_logger::try_init();
    SyncEngine::new(InMemoryStore::new())
}

/// Each accepted publish increments the recipient's pending count by one.
#[test]
fn pending_counter_tracks_fanout() {
    let engine = new_engine();
    let network = engine.create_network("widgets", false, json!({})).unwrap();
    let n1 = engine
        .create_node(&network.id, "n1", true, true, true, true)
        .unwrap();
    let n2 = engine
        .create_node(&network.id, "n2", true, true, true, true)
        .unwrap();

    assert_eq!(engine.has_pending(&network.id, &n2.id).unwrap(), 0);

    engine
        .send(
            &network.id,
            &n1.id,
            Method::Create,
            Some(json!({"widget": 1})),
            None,
            Some("0001".to_string()),
        )
        .unwrap();
    assert_eq!(engine.has_pending(&network.id, &n2.id).unwrap(), 1);

    engine
        .send(
            &network.id,
            &n1.id,
            Method::Create,
            Some(json!({"widget": 2})),
            None,
            Some("0002".to_string()),
        )
        .unwrap();
    assert_eq!(engine.has_pending(&network.id, &n2.id).unwrap(), 2);
}

/// Fetched messages drain the queue in order; ack and fail both resolve
/// a `sent` message to a terminal state without leaving it fetchable again.
#[test]
fn fetch_drains_queue_then_ack_and_fail_settle_messages() {
    let engine = new_engine();
    let network = engine.create_network("widgets", false, json!({})).unwrap();
    let n1 = engine
        .create_node(&network.id, "n1", true, true, true, true)
        .unwrap();
    let n2 = engine
        .create_node(&network.id, "n2", true, true, true, true)
        .unwrap();

    engine
        .send(
            &network.id,
            &n1.id,
            Method::Create,
            Some(json!({"widget": 1})),
            None,
            Some("0001".to_string()),
        )
        .unwrap();
    engine
        .send(
            &network.id,
            &n1.id,
            Method::Create,
            Some(json!({"widget": 2})),
            None,
            Some("0002".to_string()),
        )
        .unwrap();

    let m1 = engine.fetch(&network.id, &n2.id).unwrap().unwrap();
    let m2 = engine.fetch(&network.id, &n2.id).unwrap().unwrap();
    assert_ne!(m1.id, m2.id);
    assert!(engine.fetch(&network.id, &n2.id).unwrap().is_none());

    engine
        .ack(&network.id, &n2.id, &m1.id, Some("1".to_string()))
        .unwrap();
    engine
        .fail(&network.id, &n2.id, &m2.id, Some("reason".to_string()))
        .unwrap();

    assert!(engine.fetch(&network.id, &n2.id).unwrap().is_none());
}

/// A remote id bound via ack is stamped onto later deliveries, resolves
/// publishes from the node that bound it, and survives a re-sync.
#[test]
fn remote_id_propagates_through_ack_publish_and_sync() {
    let engine = new_engine();
    let network = engine.create_network("widgets", false, json!({})).unwrap();
    let n1 = engine
        .create_node(&network.id, "n1", true, true, true, true)
        .unwrap();
    let n2 = engine
        .create_node(&network.id, "n2", true, true, true, true)
        .unwrap();

    engine
        .send(
            &network.id,
            &n1.id,
            Method::Create,
            Some(json!({"widget": 1})),
            None,
            Some("0001".to_string()),
        )
        .unwrap();
    engine
        .send(
            &network.id,
            &n1.id,
            Method::Update,
            Some(json!({"widget": 2})),
            None,
            Some("0001".to_string()),
        )
        .unwrap();

    assert!(engine.fetch(&network.id, &n1.id).unwrap().is_none());

    let first = engine.fetch(&network.id, &n2.id).unwrap().unwrap();
    engine
        .ack(&network.id, &n2.id, &first.id, Some("abcd".to_string()))
        .unwrap();

    let second = engine.fetch(&network.id, &n2.id).unwrap().unwrap();
    assert_eq!(second.remote_id.as_deref(), Some("abcd"));

    engine
        .send(
            &network.id,
            &n2.id,
            Method::Update,
            Some(json!({"widget": 3})),
            None,
            Some("abcd".to_string()),
        )
        .unwrap();
    assert_eq!(first.record_id, second.record_id);

    engine.sync(&network.id, &n2.id).unwrap();
    let resynced = engine.fetch(&network.id, &n2.id).unwrap().unwrap();
    assert_eq!(resynced.remote_id.as_deref(), Some("abcd"));
}

/// A node without the relevant capability flag is rejected before any
/// record or message is created.
#[test]
fn capability_gate_rejects_unauthorized_method() {
    let engine = new_engine();
    let network = engine.create_network("widgets", false, json!({})).unwrap();
    let n1 = engine
        .create_node(&network.id, "n1", true, true, false, true)
        .unwrap();

    let err = engine
        .send(
            &network.id,
            &n1.id,
            Method::Update,
            Some(json!({"widget": 1})),
            None,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, SyncError::NotAuthorized(_)));

    assert!(engine.store().get_records(&network.id).unwrap().is_empty());
}

/// With `fetch_before_send` enabled, a node with pending messages is
/// refused when it tries to publish.
#[test]
fn fetch_before_send_policy_blocks_publish_with_pending_inbox() {
    let engine = new_engine();
    let network = engine
        .create_network("widgets", true, json!({}))
        .unwrap();
    let n1 = engine
        .create_node(&network.id, "n1", true, true, true, true)
        .unwrap();
    let n2 = engine
        .create_node(&network.id, "n2", true, true, true, true)
        .unwrap();

    engine
        .send(
            &network.id,
            &n1.id,
            Method::Create,
            Some(json!({"widget": 1})),
            None,
            None,
        )
        .unwrap();

    let err = engine
        .send(
            &network.id,
            &n2.id,
            Method::Create,
            Some(json!({"widget": 2})),
            None,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, SyncError::FetchBeforeSend(_)));
}

/// `fetch` called concurrently by several callers on a shared pending
/// queue returns every message exactly once in total, with none dropped
/// or claimed twice. Exercises `InMemoryStore`'s compare-and-set
/// directly, since `SyncEngine` is `Send + Sync` only through its
/// `Store`.
#[test]
fn concurrent_fetch_claims_each_pending_message_exactly_once() {
    let engine = new_engine();
    let network = engine.create_network("widgets", false, json!({})).unwrap();
    let n1 = engine
        .create_node(&network.id, "n1", true, true, true, true)
        .unwrap();
    let n2 = engine
        .create_node(&network.id, "n2", true, true, true, true)
        .unwrap();

    const MESSAGE_COUNT: usize = 40;
    for i in 0..MESSAGE_COUNT {
        engine
            .send(
                &network.id,
                &n1.id,
                Method::Create,
                Some(json!({"widget": i})),
                None,
                None,
            )
            .unwrap();
    }
    assert_eq!(
        engine.has_pending(&network.id, &n2.id).unwrap(),
        MESSAGE_COUNT as i64
    );

    let engine = Arc::new(engine);
    let network_id = network.id.clone();
    let node_id = n2.id.clone();
    let callers = 8;
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let network_id = network_id.clone();
            let node_id = node_id.clone();
            thread::spawn(move || {
                let mut claimed = Vec::new();
                while let Some(message) = engine.fetch(&network_id, &node_id).unwrap() {
                    claimed.push(message.id);
                }
                claimed
            })
        })
        .collect();

    let mut all_claimed = Vec::new();
    for handle in handles {
        all_claimed.extend(handle.join().unwrap());
    }

    assert_eq!(all_claimed.len(), MESSAGE_COUNT);
    let unique: HashSet<_> = all_claimed.iter().cloned().collect();
    assert_eq!(unique.len(), MESSAGE_COUNT, "every message claimed exactly once");
    assert_eq!(engine.has_pending(&network_id, &node_id).unwrap(), 0);
}
