use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutation kind carried by a `Change` and propagated through `Message`s.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Create,
    Update,
    Delete,
}

/// Lifecycle state of a per-destination `Message`.
///
/// `pending -> sent -> {acknowledged, failed}`; `acknowledged` and
/// `failed` are terminal (spec invariant: no other transitions exist).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Pending,
    Sent,
    Acknowledged,
    Failed,
}

/// A replication group's configuration. Exactly one per storage scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    /// When true, a node with pending messages destined to itself is
    /// refused on publish (`FetchBeforeSend`).
    pub fetch_before_send: bool,
    /// Payload JSON schema handed to external validators; opaque here.
    pub payload_schema: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A participant in a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub network_id: String,
    pub name: String,
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub created_at: DateTime<Utc>,
}

impl Node {
    pub fn allows(&self, method: Method) -> bool {
        match method {
            Method::Create => self.can_create,
            Method::Update => self.can_update,
            Method::Delete => self.can_delete,
        }
    }
}

/// The logical object being synchronized. Never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub network_id: String,
    pub head_id: Option<String>,
    pub deleted: bool,
}

/// An immutable, versioned payload revision for one `Record`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub network_id: String,
    pub record_id: String,
    pub version: i64,
    pub method: Method,
    /// Absent for `delete`.
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A per-destination delivery unit for one `Change`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub network_id: String,
    /// Null only for the synthetic origin message.
    pub origin_id: Option<String>,
    pub destination_id: String,
    pub record_id: String,
    pub change_id: String,
    pub method: Method,
    pub remote_id: Option<String>,
    pub state: MessageState,
    /// The upstream origin message; null for the origin message itself.
    pub parent_id: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The (node, record) -> remote_id mapping. Unique on both projections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remote {
    pub network_id: String,
    pub node_id: String,
    pub record_id: String,
    pub remote_id: String,
}
