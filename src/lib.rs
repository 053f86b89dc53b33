//! Multi-node data-synchronization broker core.
//!
//! A network is a replication group of nodes that exchange typed
//! mutation messages (create/update/delete) about shared records. This
//! crate is the synchronization engine: the record/message/remote-id
//! data model, the fan-out and delivery state machine, per-node
//! queueing, acknowledgement/failure handling, and the storage-agnostic
//! persistence contract that supports it.
//!
//! The transport layer, JSON-schema validation, and concrete relational
//! or document-store backends are out of scope here; see
//! [`store::Store`] for the boundary and [`memory::InMemoryStore`] for
//! the one backend this crate carries (a reference implementation used
//! for tests and embedded deployments).

pub mod engine;
pub mod error;
pub mod fanout;
pub mod ids;
pub mod memory;
pub mod model;
pub mod queue;
pub mod records;
pub mod remote;
pub mod store;

pub use engine::SyncEngine;
pub use error::SyncError;
pub use memory::InMemoryStore;
pub use model::{Change, Message, MessageState, Method, Network, Node, Record, Remote};
pub use store::Store;
