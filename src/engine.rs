use serde_json::Value;

use crate::error::SyncError;
use crate::fanout;
use crate::ids::generate_id;
use crate::model::{Message, Method, Network, Node};
use crate::queue;
use crate::records;
use crate::remote;
use crate::store::{NewMessage, NewNode, Store};

/// The public node-controller contract: the facade a transport layer
/// sits behind. Every operation takes the network scope and node
/// explicitly — no ambient/thread-local state.
pub struct SyncEngine<S: Store> {
    store: S,
}

impl<S: Store> SyncEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -- network administration ------------------------------------------

    pub fn create_network(
        &self,
        name: &str,
        fetch_before_send: bool,
        payload_schema: Value,
    ) -> Result<Network, SyncError> {
        let id = generate_id();
        let network = self
            .store
            .create_network(&id, name, fetch_before_send, payload_schema)?;
        log::info!("network {} ({}) created", network.id, network.name);
        Ok(network)
    }

    pub fn get_network(&self, network_id: &str) -> Result<Network, SyncError> {
        self.require_network(network_id)
    }

    pub fn update_network(
        &self,
        network_id: &str,
        name: Option<String>,
        fetch_before_send: Option<bool>,
        payload_schema: Option<Value>,
    ) -> Result<Network, SyncError> {
        let mut network = self.require_network(network_id)?;
        if let Some(name) = name {
            network.name = name;
        }
        if let Some(flag) = fetch_before_send {
            network.fetch_before_send = flag;
        }
        if let Some(schema) = payload_schema {
            network.payload_schema = schema;
        }
        self.store.update_network(&network)?;
        Ok(network)
    }

    // -- node administration ----------------------------------------------

    pub fn create_node(
        &self,
        network_id: &str,
        name: &str,
        can_create: bool,
        can_read: bool,
        can_update: bool,
        can_delete: bool,
    ) -> Result<Node, SyncError> {
        self.require_network(network_id)?;
        let node = self.store.create_node(
            network_id,
            NewNode {
                name: name.to_string(),
                can_create,
                can_read,
                can_update,
                can_delete,
            },
        )?;
        log::info!("node {} ({}) created in network {}", node.id, node.name, network_id);
        Ok(node)
    }

    pub fn get_node(&self, network_id: &str, node_id: &str) -> Result<Node, SyncError> {
        self.require_node(network_id, node_id)
    }

    pub fn list_nodes(&self, network_id: &str) -> Result<Vec<Node>, SyncError> {
        self.require_network(network_id)?;
        Ok(self.store.get_nodes(network_id)?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_node(
        &self,
        network_id: &str,
        node_id: &str,
        name: Option<String>,
        can_create: Option<bool>,
        can_read: Option<bool>,
        can_update: Option<bool>,
        can_delete: Option<bool>,
    ) -> Result<Node, SyncError> {
        let mut node = self.require_node(network_id, node_id)?;
        if let Some(name) = name {
            node.name = name;
        }
        if let Some(flag) = can_create {
            node.can_create = flag;
        }
        if let Some(flag) = can_read {
            node.can_read = flag;
        }
        if let Some(flag) = can_update {
            node.can_update = flag;
        }
        if let Some(flag) = can_delete {
            node.can_delete = flag;
        }
        self.store.update_node(network_id, &node)?;
        Ok(node)
    }

    // -- the core contract --------------------------------------------------

    /// Publishes a mutation on behalf of `node_id`.
    ///
    /// Resolution precedence: an explicit `record_id` always wins; a
    /// supplied `remote_id` that disagrees with it is a `RemoteConflict`.
    /// With no `record_id`, a supplied `remote_id` is resolved against
    /// the publisher's own map; if it resolves to nothing, the publish is
    /// treated as a creation and the remote id is bound to the new
    /// record once it exists.
    pub fn send(
        &self,
        network_id: &str,
        node_id: &str,
        method: Method,
        payload: Option<Value>,
        record_id: Option<String>,
        remote_id: Option<String>,
    ) -> Result<Message, SyncError> {
        let network = self.require_network(network_id)?;
        let node = self.require_node(network_id, node_id)?;

        if !node.allows(method) {
            return Err(SyncError::NotAuthorized(format!(
                "node {} is not permitted to {:?}",
                node_id, method
            )));
        }

        if network.fetch_before_send {
            let pending = queue::has_pending(&self.store, network_id, node_id)?;
            if pending > 0 {
                return Err(SyncError::FetchBeforeSend(node_id.to_string()));
            }
        }

        let resolved_record_id = match (&record_id, &remote_id) {
            (Some(rid), Some(remote)) => {
                if let Some(resolved) = remote::resolve(&self.store, network_id, node_id, remote)? {
                    if &resolved != rid {
                        return Err(SyncError::RemoteConflict(format!(
                            "remote id {} resolves to record {}, not {}",
                            remote, resolved, rid
                        )));
                    }
                }
                Some(rid.clone())
            }
            (Some(rid), None) => Some(rid.clone()),
            (None, Some(remote)) => remote::resolve(&self.store, network_id, node_id, remote)?,
            (None, None) => None,
        };

        let (record, change) = records::apply_change(
            &self.store,
            network_id,
            resolved_record_id.as_deref(),
            method,
            payload,
        )?;

        if let Some(remote_id) = &remote_id {
            remote::bind(&self.store, network_id, node_id, &record.id, remote_id)?;
        }

        fanout::publish(&self.store, network_id, node_id, &record, &change)
    }

    /// Returns and claims the next pending message for `node_id`, or
    /// `None` if there is none.
    ///
    /// A node with `can_read = false` never has anything fanned out to
    /// it in the first place, so this degrades to `None` rather than
    /// `NotAuthorized` — there is never anything for it to be forbidden
    /// from seeing (see DESIGN.md for the reasoning behind this choice).
    pub fn fetch(&self, network_id: &str, node_id: &str) -> Result<Option<Message>, SyncError> {
        let node = self.require_node(network_id, node_id)?;
        if !node.can_read {
            return Ok(None);
        }
        queue::fetch(&self.store, network_id, node_id)
    }

    pub fn ack(
        &self,
        network_id: &str,
        node_id: &str,
        message_id: &str,
        remote_id: Option<String>,
    ) -> Result<Message, SyncError> {
        self.require_network(network_id)?;
        queue::ack(&self.store, network_id, node_id, message_id, remote_id)
    }

    pub fn fail(
        &self,
        network_id: &str,
        node_id: &str,
        message_id: &str,
        reason: Option<String>,
    ) -> Result<Message, SyncError> {
        self.require_network(network_id)?;
        queue::fail(&self.store, network_id, node_id, message_id, reason)
    }

    pub fn has_pending(&self, network_id: &str, node_id: &str) -> Result<i64, SyncError> {
        self.require_node(network_id, node_id)?;
        queue::has_pending(&self.store, network_id, node_id)
    }

    /// Reseeds `node_id`: for every non-deleted record not already
    /// represented by a message to this node for its current head
    /// change, enqueues a fresh pending `create` message carrying that
    /// head. Used to onboard late joiners and to retry after `fail`.
    /// Replaying `sync` while messages are still pending enqueues
    /// nothing further for the same head change (idempotent).
    pub fn sync(&self, network_id: &str, node_id: &str) -> Result<(), SyncError> {
        let node = self.require_node(network_id, node_id)?;
        if !node.can_read {
            return Ok(());
        }

        let mut enqueued = 0u32;
        for record in self.store.get_records(network_id)? {
            if record.deleted {
                continue;
            }
            let Some(head) = self.store.get_head_change(network_id, &record.id)? else {
                continue;
            };
            if self
                .store
                .has_message_for_change(network_id, node_id, &head.id)?
            {
                continue;
            }
            let remote_id = remote::lookup(&self.store, network_id, node_id, &record.id)?;
            self.store.insert_message(
                network_id,
                NewMessage {
                    origin_id: None,
                    destination_id: node_id.to_string(),
                    record_id: record.id.clone(),
                    change_id: head.id.clone(),
                    method: Method::Create,
                    remote_id,
                    state: crate::model::MessageState::Pending,
                    parent_id: None,
                },
            )?;
            enqueued += 1;
        }
        log::info!("sync reseeded node {} with {} message(s)", node_id, enqueued);
        Ok(())
    }

    // -- helpers --------------------------------------------------------

    fn require_network(&self, network_id: &str) -> Result<Network, SyncError> {
        self.store
            .get_network(network_id)?
            .ok_or_else(|| SyncError::NotFound(format!("network {} not found", network_id)))
    }

    fn require_node(&self, network_id: &str, node_id: &str) -> Result<Node, SyncError> {
        self.store
            .get_node(network_id, node_id)?
            .ok_or_else(|| SyncError::NotFound(format!("node {} not found", node_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    fn engine() -> SyncEngine<InMemoryStore> {
        SyncEngine::new(InMemoryStore::new())
    }

    fn setup_two_nodes(engine: &SyncEngine<InMemoryStore>) -> (Network, Node, Node) {
        let network = engine
            .create_network("widgets", false, serde_json::json!({}))
            .unwrap();
        let n1 = engine
            .create_node(&network.id, "n1", true, true, true, true)
            .unwrap();
        let n2 = engine
            .create_node(&network.id, "n2", true, true, true, true)
            .unwrap();
        (network, n1, n2)
    }

    #[test]
    fn capability_gate_blocks_unauthorized_method() {
        let engine = engine();
        let network = engine
            .create_network("widgets", false, serde_json::json!({}))
            .unwrap();
        let node = engine
            .create_node(&network.id, "n1", true, true, false, true)
            .unwrap();
        let err = engine
            .send(
                &network.id,
                &node.id,
                Method::Update,
                Some(serde_json::json!({})),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::NotAuthorized(_)));
        assert_eq!(engine.list_nodes(&network.id).unwrap().len(), 1);
    }

    #[test]
    fn fetch_before_send_blocks_publish_with_pending_inbox() {
        let engine = engine();
        let (network, n1, n2) = setup_two_nodes(&engine);
        engine
            .update_network(&network.id, None, Some(true), None)
            .unwrap();

        engine
            .send(
                &network.id,
                &n1.id,
                Method::Create,
                Some(serde_json::json!({"a": 1})),
                None,
                Some("0001".into()),
            )
            .unwrap();

        let err = engine
            .send(
                &network.id,
                &n2.id,
                Method::Create,
                Some(serde_json::json!({})),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::FetchBeforeSend(_)));
    }

    #[test]
    fn sync_reseeds_without_duplicating_pending() {
        let engine = engine();
        let (network, n1, n2) = setup_two_nodes(&engine);
        engine
            .send(
                &network.id,
                &n1.id,
                Method::Create,
                Some(serde_json::json!({"a": 1})),
                None,
                None,
            )
            .unwrap();
        // n2 already has one pending message from fan-out.
        assert_eq!(engine.has_pending(&network.id, &n2.id).unwrap(), 1);
        engine.sync(&network.id, &n2.id).unwrap();
        assert_eq!(engine.has_pending(&network.id, &n2.id).unwrap(), 1);
    }

    #[test]
    fn explicit_record_id_wins_over_disagreeing_remote_id() {
        let engine = engine();
        let (network, n1, _n2) = setup_two_nodes(&engine);

        let first = engine
            .send(
                &network.id,
                &n1.id,
                Method::Create,
                Some(serde_json::json!({"a": 1})),
                None,
                Some("rm-a".into()),
            )
            .unwrap();
        let second = engine
            .send(
                &network.id,
                &n1.id,
                Method::Create,
                Some(serde_json::json!({"a": 2})),
                None,
                Some("rm-b".into()),
            )
            .unwrap();

        let err = engine
            .send(
                &network.id,
                &n1.id,
                Method::Update,
                Some(serde_json::json!({"a": 3})),
                Some(second.record_id.clone()),
                Some("rm-a".into()),
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteConflict(_)));
        assert_ne!(first.record_id, second.record_id);
    }
}
