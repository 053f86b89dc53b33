use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Change, Message, MessageState, Method, Network, Node, Record, Remote};

/// Failure surfaced by a `Store` implementation. Kept deliberately small:
/// the contract only needs to tell the engine "this operation could not
/// be completed", everything else (not-found, conflict, ...) is a
/// business-rule decision the engine layers on top of `Option`/`bool`
/// results, not something the backend decides for it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Fields needed to create a `Node`; `id` and `created_at` are assigned
/// by the store.
pub struct NewNode {
    pub name: String,
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

/// A `Change` to append, paired with the `Record` head it updates. The
/// store persists both atomically (spec: "save of a Change and the
/// corresponding Record head update are observed atomically").
pub struct NewChange {
    pub record_id: String,
    pub version: i64,
    pub method: Method,
    pub payload: Option<serde_json::Value>,
}

/// Fields needed to insert a `Message`; `id`, `state`'s initial value,
/// and the timestamps are assigned by the store/engine.
pub struct NewMessage {
    pub origin_id: Option<String>,
    pub destination_id: String,
    pub record_id: String,
    pub change_id: String,
    pub method: Method,
    pub remote_id: Option<String>,
    pub state: MessageState,
    pub parent_id: Option<String>,
}

/// The abstract persistence contract the engine is written against.
///
/// Implementations must provide:
/// - atomic visibility of a `Change` append together with its `Record`
///   head update;
/// - `fetch_next_pending` as an atomic compare-and-set (`pending -> sent`)
///   so concurrent callers observing the same pending message succeed at
///   most once;
/// - repeatable reads within a single call (the engine never assumes
///   snapshot isolation across separate calls).
///
/// This crate ships one implementation, [`crate::memory::InMemoryStore`],
/// intended for tests and embedded use; document-store and relational
/// backends are external collaborators that implement this same trait.
pub trait Store: Send + Sync {
    // -- network -----------------------------------------------------
    fn create_network(
        &self,
        id: &str,
        name: &str,
        fetch_before_send: bool,
        payload_schema: serde_json::Value,
    ) -> Result<Network, StoreError>;
    fn get_network(&self, network_id: &str) -> Result<Option<Network>, StoreError>;
    fn update_network(&self, network: &Network) -> Result<(), StoreError>;

    // -- node ----------------------------------------------------------
    fn create_node(&self, network_id: &str, new: NewNode) -> Result<Node, StoreError>;
    fn get_node(&self, network_id: &str, node_id: &str) -> Result<Option<Node>, StoreError>;
    fn get_nodes(&self, network_id: &str) -> Result<Vec<Node>, StoreError>;
    fn update_node(&self, network_id: &str, node: &Node) -> Result<(), StoreError>;

    // -- record + change -------------------------------------------------
    fn get_record(&self, network_id: &str, record_id: &str) -> Result<Option<Record>, StoreError>;
    fn get_records(&self, network_id: &str) -> Result<Vec<Record>, StoreError>;
    fn get_change(&self, network_id: &str, change_id: &str) -> Result<Option<Change>, StoreError>;
    fn get_head_change(
        &self,
        network_id: &str,
        record_id: &str,
    ) -> Result<Option<Change>, StoreError>;
    /// Creates a new `Record` (version 1) together with its first
    /// `Change`, atomically.
    fn create_record(
        &self,
        network_id: &str,
        record_id: &str,
        change: NewChange,
    ) -> Result<(Record, Change), StoreError>;
    /// Appends a `Change` to an existing `Record` and updates its head
    /// (and `deleted` flag, for a delete), atomically.
    fn append_change(
        &self,
        network_id: &str,
        deleted: bool,
        change: NewChange,
    ) -> Result<(Record, Change), StoreError>;

    // -- remote map ------------------------------------------------------
    fn get_remote_by_record(
        &self,
        network_id: &str,
        node_id: &str,
        record_id: &str,
    ) -> Result<Option<Remote>, StoreError>;
    fn get_remote_by_remote_id(
        &self,
        network_id: &str,
        node_id: &str,
        remote_id: &str,
    ) -> Result<Option<Remote>, StoreError>;
    /// Upserts the (node, record) -> remote_id mapping. The engine is
    /// responsible for the uniqueness check against a *different*
    /// record_id (spec `RemoteConflictError`) before calling this.
    fn bind_remote(
        &self,
        network_id: &str,
        node_id: &str,
        record_id: &str,
        remote_id: &str,
    ) -> Result<Remote, StoreError>;

    // -- messages --------------------------------------------------------
    fn insert_message(&self, network_id: &str, new: NewMessage) -> Result<Message, StoreError>;
    fn get_message(&self, network_id: &str, message_id: &str) -> Result<Option<Message>, StoreError>;
    /// Atomically claims the oldest pending message for `destination_id`
    /// (ascending creation order, tie-broken by id), transitioning it to
    /// `sent`. Returns `None` if there is none.
    fn fetch_next_pending(
        &self,
        network_id: &str,
        destination_id: &str,
    ) -> Result<Option<Message>, StoreError>;
    /// Overwrites a message's `remote_id` in place, without touching its
    /// `state`. Used to re-stamp the destination's *current* remote id
    /// onto a message at the moment it is delivered — a message fanned
    /// out before its destination had bound a remote id must still carry
    /// that id once one becomes available by the time of delivery.
    fn stamp_remote_id(
        &self,
        network_id: &str,
        message_id: &str,
        remote_id: String,
    ) -> Result<Message, StoreError>;
    /// Transitions a message to a terminal state, stamping `remote_id`
    /// and/or `reason` as supplied. Callers must have already verified
    /// the message is in `sent` and destined to the right node.
    fn finish_message(
        &self,
        network_id: &str,
        message_id: &str,
        state: MessageState,
        remote_id: Option<String>,
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<Message, StoreError>;
    fn count_pending(&self, network_id: &str, destination_id: &str) -> Result<i64, StoreError>;
    /// Messages already delivered (any state) to `destination_id` for the
    /// given `change_id`, used by `sync` to dedupe its reseed.
    fn has_message_for_change(
        &self,
        network_id: &str,
        destination_id: &str,
        change_id: &str,
    ) -> Result<bool, StoreError>;
}
