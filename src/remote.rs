use crate::error::SyncError;
use crate::model::Remote;
use crate::store::Store;

/// Translates a caller-supplied remote id into the engine's record id.
pub fn resolve(
    store: &dyn Store,
    network_id: &str,
    node_id: &str,
    remote_id: &str,
) -> Result<Option<String>, SyncError> {
    Ok(store
        .get_remote_by_remote_id(network_id, node_id, remote_id)?
        .map(|r| r.record_id))
}

/// Inverse of [`resolve`]: the destination's local id for a record, if
/// bound. Consulted during fan-out to stamp the recipient's remote id.
pub fn lookup(
    store: &dyn Store,
    network_id: &str,
    node_id: &str,
    record_id: &str,
) -> Result<Option<String>, SyncError> {
    Ok(store
        .get_remote_by_record(network_id, node_id, record_id)?
        .map(|r| r.remote_id))
}

/// Upserts the (node, record) -> remote_id mapping.
///
/// Rejects with `RemoteConflict` if `remote_id` is already bound to a
/// *different* record_id for this node.
pub fn bind(
    store: &dyn Store,
    network_id: &str,
    node_id: &str,
    record_id: &str,
    remote_id: &str,
) -> Result<Remote, SyncError> {
    if let Some(existing) = store.get_remote_by_remote_id(network_id, node_id, remote_id)? {
        if existing.record_id != record_id {
            return Err(SyncError::RemoteConflict(format!(
                "remote id {} already bound to record {} for node {}",
                remote_id, existing.record_id, node_id
            )));
        }
    }
    let remote = store.bind_remote(network_id, node_id, record_id, remote_id)?;
    log::debug!(
        "bound node={} record={} remote_id={}",
        node_id,
        record_id,
        remote_id
    );
    Ok(remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[test]
    fn bind_then_resolve_round_trips() {
        let store = InMemoryStore::new();
        bind(&store, "net", "n1", "r1", "rm1").unwrap();
        assert_eq!(
            resolve(&store, "net", "n1", "rm1").unwrap(),
            Some("r1".to_string())
        );
        assert_eq!(
            lookup(&store, "net", "n1", "r1").unwrap(),
            Some("rm1".to_string())
        );
    }

    #[test]
    fn rebinding_same_remote_id_to_new_record_conflicts() {
        let store = InMemoryStore::new();
        bind(&store, "net", "n1", "r1", "rm1").unwrap();
        let err = bind(&store, "net", "n1", "r2", "rm1").unwrap_err();
        assert!(matches!(err, SyncError::RemoteConflict(_)));
    }

    #[test]
    fn rebinding_same_record_with_new_remote_id_updates_in_place() {
        let store = InMemoryStore::new();
        bind(&store, "net", "n1", "r1", "rm1").unwrap();
        bind(&store, "net", "n1", "r1", "rm2").unwrap();
        assert_eq!(resolve(&store, "net", "n1", "rm1").unwrap(), None);
        assert_eq!(
            resolve(&store, "net", "n1", "rm2").unwrap(),
            Some("r1".to_string())
        );
    }
}
