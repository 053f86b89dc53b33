use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::ids::generate_id;
use crate::model::{Change, Message, MessageState, Network, Node, Record, Remote};
use crate::store::{NewChange, NewMessage, NewNode, Store, StoreError};

/// Everything belonging to one storage scope (one network). Guarded by a
/// single `Mutex` so that `fetch_next_pending` and the publish
/// transaction can each acquire it once and perform their full
/// read-modify-write atomically, giving compare-and-set and
/// serializable-transaction guarantees without a real database.
#[derive(Default)]
struct NetworkData {
    network: Option<Network>,
    nodes: HashMap<String, Node>,
    records: HashMap<String, Record>,
    changes: HashMap<String, Change>,
    messages: HashMap<String, Message>,
    /// Creation order of messages, for `fetch_next_pending`'s ordering
    /// guarantee. Timestamps alone are not a reliable tie-breaker at
    /// `DateTime<Utc>`'s resolution under concurrent inserts.
    message_order: Vec<String>,
    remotes_by_record: HashMap<(String, String), Remote>,
    remotes_by_remote_id: HashMap<(String, String), String>,
}

/// Reference [`Store`] implementation backed by an in-process `Mutex`.
/// Intended for tests and embedded deployments. Document-store and
/// relational backends are separate crates implementing the same trait.
#[derive(Default)]
pub struct InMemoryStore {
    scopes: Mutex<HashMap<String, NetworkData>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, NetworkData>>, StoreError> {
        self.scopes
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store mutex poisoned".into()))
    }
}

impl Store for InMemoryStore {
    fn create_network(
        &self,
        id: &str,
        name: &str,
        fetch_before_send: bool,
        payload_schema: serde_json::Value,
    ) -> Result<Network, StoreError> {
        let network = Network {
            id: id.to_string(),
            name: name.to_string(),
            fetch_before_send,
            payload_schema,
            created_at: Utc::now(),
        };
        let mut scopes = self.lock()?;
        let entry = scopes.entry(id.to_string()).or_default();
        entry.network = Some(network.clone());
        Ok(network)
    }

    fn get_network(&self, network_id: &str) -> Result<Option<Network>, StoreError> {
        let scopes = self.lock()?;
        Ok(scopes.get(network_id).and_then(|s| s.network.clone()))
    }

    fn update_network(&self, network: &Network) -> Result<(), StoreError> {
        let mut scopes = self.lock()?;
        let entry = scopes
            .entry(network.id.clone())
            .or_default();
        entry.network = Some(network.clone());
        Ok(())
    }

    fn create_node(&self, network_id: &str, new: NewNode) -> Result<Node, StoreError> {
        let node = Node {
            id: generate_id(),
            network_id: network_id.to_string(),
            name: new.name,
            can_create: new.can_create,
            can_read: new.can_read,
            can_update: new.can_update,
            can_delete: new.can_delete,
            created_at: Utc::now(),
        };
        let mut scopes = self.lock()?;
        let entry = scopes.entry(network_id.to_string()).or_default();
        entry.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    fn get_node(&self, network_id: &str, node_id: &str) -> Result<Option<Node>, StoreError> {
        let scopes = self.lock()?;
        Ok(scopes
            .get(network_id)
            .and_then(|s| s.nodes.get(node_id).cloned()))
    }

    fn get_nodes(&self, network_id: &str) -> Result<Vec<Node>, StoreError> {
        let scopes = self.lock()?;
        Ok(scopes
            .get(network_id)
            .map(|s| s.nodes.values().cloned().collect())
            .unwrap_or_default())
    }

    fn update_node(&self, network_id: &str, node: &Node) -> Result<(), StoreError> {
        let mut scopes = self.lock()?;
        let entry = scopes.entry(network_id.to_string()).or_default();
        entry.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    fn get_record(&self, network_id: &str, record_id: &str) -> Result<Option<Record>, StoreError> {
        let scopes = self.lock()?;
        Ok(scopes
            .get(network_id)
            .and_then(|s| s.records.get(record_id).cloned()))
    }

    fn get_records(&self, network_id: &str) -> Result<Vec<Record>, StoreError> {
        let scopes = self.lock()?;
        Ok(scopes
            .get(network_id)
            .map(|s| s.records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn get_change(&self, network_id: &str, change_id: &str) -> Result<Option<Change>, StoreError> {
        let scopes = self.lock()?;
        Ok(scopes
            .get(network_id)
            .and_then(|s| s.changes.get(change_id).cloned()))
    }

    fn get_head_change(
        &self,
        network_id: &str,
        record_id: &str,
    ) -> Result<Option<Change>, StoreError> {
        let scopes = self.lock()?;
        let Some(scope) = scopes.get(network_id) else {
            return Ok(None);
        };
        let Some(record) = scope.records.get(record_id) else {
            return Ok(None);
        };
        let Some(head_id) = record.head_id.as_ref() else {
            return Ok(None);
        };
        Ok(scope.changes.get(head_id).cloned())
    }

    fn create_record(
        &self,
        network_id: &str,
        record_id: &str,
        change: NewChange,
    ) -> Result<(Record, Change), StoreError> {
        let change_row = Change {
            id: generate_id(),
            network_id: network_id.to_string(),
            record_id: record_id.to_string(),
            version: change.version,
            method: change.method,
            payload: change.payload,
            created_at: Utc::now(),
        };
        let record = Record {
            id: record_id.to_string(),
            network_id: network_id.to_string(),
            head_id: Some(change_row.id.clone()),
            deleted: false,
        };
        let mut scopes = self.lock()?;
        let entry = scopes.entry(network_id.to_string()).or_default();
        entry.records.insert(record.id.clone(), record.clone());
        entry
            .changes
            .insert(change_row.id.clone(), change_row.clone());
        Ok((record, change_row))
    }

    fn append_change(
        &self,
        network_id: &str,
        deleted: bool,
        change: NewChange,
    ) -> Result<(Record, Change), StoreError> {
        let change_row = Change {
            id: generate_id(),
            network_id: network_id.to_string(),
            record_id: change.record_id.clone(),
            version: change.version,
            method: change.method,
            payload: change.payload,
            created_at: Utc::now(),
        };
        let mut scopes = self.lock()?;
        let entry = scopes.entry(network_id.to_string()).or_default();
        let record = entry
            .records
            .get_mut(&change.record_id)
            .ok_or_else(|| StoreError::Unavailable("record vanished mid-transaction".into()))?;
        record.head_id = Some(change_row.id.clone());
        record.deleted = deleted;
        let record = record.clone();
        entry
            .changes
            .insert(change_row.id.clone(), change_row.clone());
        Ok((record, change_row))
    }

    fn get_remote_by_record(
        &self,
        network_id: &str,
        node_id: &str,
        record_id: &str,
    ) -> Result<Option<Remote>, StoreError> {
        let scopes = self.lock()?;
        Ok(scopes.get(network_id).and_then(|s| {
            s.remotes_by_record
                .get(&(node_id.to_string(), record_id.to_string()))
                .cloned()
        }))
    }

    fn get_remote_by_remote_id(
        &self,
        network_id: &str,
        node_id: &str,
        remote_id: &str,
    ) -> Result<Option<Remote>, StoreError> {
        let scopes = self.lock()?;
        let Some(scope) = scopes.get(network_id) else {
            return Ok(None);
        };
        let Some(record_id) = scope
            .remotes_by_remote_id
            .get(&(node_id.to_string(), remote_id.to_string()))
        else {
            return Ok(None);
        };
        Ok(scope
            .remotes_by_record
            .get(&(node_id.to_string(), record_id.clone()))
            .cloned())
    }

    fn bind_remote(
        &self,
        network_id: &str,
        node_id: &str,
        record_id: &str,
        remote_id: &str,
    ) -> Result<Remote, StoreError> {
        let remote = Remote {
            network_id: network_id.to_string(),
            node_id: node_id.to_string(),
            record_id: record_id.to_string(),
            remote_id: remote_id.to_string(),
        };
        let mut scopes = self.lock()?;
        let entry = scopes.entry(network_id.to_string()).or_default();

        // Clear any previous remote_id this (node, record) pair held, so
        // the reverse index never carries a stale entry.
        if let Some(previous) = entry
            .remotes_by_record
            .get(&(node_id.to_string(), record_id.to_string()))
        {
            entry
                .remotes_by_remote_id
                .remove(&(node_id.to_string(), previous.remote_id.clone()));
        }

        entry.remotes_by_record.insert(
            (node_id.to_string(), record_id.to_string()),
            remote.clone(),
        );
        entry.remotes_by_remote_id.insert(
            (node_id.to_string(), remote_id.to_string()),
            record_id.to_string(),
        );
        Ok(remote)
    }

    fn insert_message(&self, network_id: &str, new: NewMessage) -> Result<Message, StoreError> {
        let now = Utc::now();
        let message = Message {
            id: generate_id(),
            network_id: network_id.to_string(),
            origin_id: new.origin_id,
            destination_id: new.destination_id,
            record_id: new.record_id,
            change_id: new.change_id,
            method: new.method,
            remote_id: new.remote_id,
            state: new.state,
            parent_id: new.parent_id,
            reason: None,
            created_at: now,
            updated_at: now,
        };
        let mut scopes = self.lock()?;
        let entry = scopes.entry(network_id.to_string()).or_default();
        entry.message_order.push(message.id.clone());
        entry.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    fn get_message(&self, network_id: &str, message_id: &str) -> Result<Option<Message>, StoreError> {
        let scopes = self.lock()?;
        Ok(scopes
            .get(network_id)
            .and_then(|s| s.messages.get(message_id).cloned()))
    }

    fn fetch_next_pending(
        &self,
        network_id: &str,
        destination_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        let mut scopes = self.lock()?;
        let Some(scope) = scopes.get_mut(network_id) else {
            return Ok(None);
        };
        let claimed_id = scope.message_order.iter().find_map(|id| {
            let msg = scope.messages.get(id)?;
            if msg.destination_id == destination_id && msg.state == MessageState::Pending {
                Some(id.clone())
            } else {
                None
            }
        });
        let Some(claimed_id) = claimed_id else {
            return Ok(None);
        };
        let msg = scope.messages.get_mut(&claimed_id).expect("just located");
        msg.state = MessageState::Sent;
        msg.updated_at = Utc::now();
        Ok(Some(msg.clone()))
    }

    fn stamp_remote_id(
        &self,
        network_id: &str,
        message_id: &str,
        remote_id: String,
    ) -> Result<Message, StoreError> {
        let mut scopes = self.lock()?;
        let entry = scopes.entry(network_id.to_string()).or_default();
        let msg = entry
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StoreError::Unavailable("message vanished mid-transaction".into()))?;
        msg.remote_id = Some(remote_id);
        Ok(msg.clone())
    }

    fn finish_message(
        &self,
        network_id: &str,
        message_id: &str,
        state: MessageState,
        remote_id: Option<String>,
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<Message, StoreError> {
        let mut scopes = self.lock()?;
        let entry = scopes.entry(network_id.to_string()).or_default();
        let msg = entry
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StoreError::Unavailable("message vanished mid-transaction".into()))?;
        msg.state = state;
        if remote_id.is_some() {
            msg.remote_id = remote_id;
        }
        msg.reason = reason;
        msg.updated_at = updated_at;
        Ok(msg.clone())
    }

    fn count_pending(&self, network_id: &str, destination_id: &str) -> Result<i64, StoreError> {
        let scopes = self.lock()?;
        let Some(scope) = scopes.get(network_id) else {
            return Ok(0);
        };
        Ok(scope
            .messages
            .values()
            .filter(|m| m.destination_id == destination_id && m.state == MessageState::Pending)
            .count() as i64)
    }

    fn has_message_for_change(
        &self,
        network_id: &str,
        destination_id: &str,
        change_id: &str,
    ) -> Result<bool, StoreError> {
        let scopes = self.lock()?;
        let Some(scope) = scopes.get(network_id) else {
            return Ok(false);
        };
        Ok(scope
            .messages
            .values()
            .any(|m| m.destination_id == destination_id && m.change_id == change_id))
    }
}
