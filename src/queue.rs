use chrono::Utc;

use crate::error::SyncError;
use crate::model::{Message, MessageState};
use crate::remote;
use crate::store::Store;

/// Returns the oldest pending message for `node_id`, atomically
/// transitioning it to `sent`. `None` means "no content" at the
/// transport layer.
///
/// Before returning, re-resolves the destination's remote id against
/// the live remote-id map and re-stamps the message if it has since
/// become bound — rewriting happens on send and on ack, not only at the
/// moment fan-out first materialized the message.
pub fn fetch(store: &dyn Store, network_id: &str, node_id: &str) -> Result<Option<Message>, SyncError> {
    let Some(mut msg) = store.fetch_next_pending(network_id, node_id)? else {
        return Ok(None);
    };
    if let Some(remote_id) = remote::lookup(store, network_id, node_id, &msg.record_id)? {
        if msg.remote_id.as_deref() != Some(remote_id.as_str()) {
            msg = store.stamp_remote_id(network_id, &msg.id, remote_id)?;
        }
    }
    log::debug!("node {} fetched message {}", node_id, msg.id);
    Ok(Some(msg))
}

fn load_sent_message(
    store: &dyn Store,
    network_id: &str,
    node_id: &str,
    message_id: &str,
) -> Result<Message, SyncError> {
    let message = store
        .get_message(network_id, message_id)?
        .ok_or_else(|| SyncError::NotFound(format!("message {} not found", message_id)))?;
    if message.destination_id != node_id {
        return Err(SyncError::NotFound(format!("message {} not found", message_id)));
    }
    if message.state != MessageState::Sent {
        return Err(SyncError::State(format!(
            "message {} is {:?}, not sent",
            message_id, message.state
        )));
    }
    Ok(message)
}

/// Acknowledges a delivered message. If `remote_id` is supplied, binds
/// it into the remote-id map for (node, message.record_id).
pub fn ack(
    store: &dyn Store,
    network_id: &str,
    node_id: &str,
    message_id: &str,
    remote_id: Option<String>,
) -> Result<Message, SyncError> {
    let message = load_sent_message(store, network_id, node_id, message_id)?;
    if let Some(remote_id) = &remote_id {
        remote::bind(store, network_id, node_id, &message.record_id, remote_id)?;
    }
    let message = store.finish_message(
        network_id,
        message_id,
        MessageState::Acknowledged,
        remote_id,
        None,
        Utc::now(),
    )?;
    log::info!("node {} acknowledged message {}", node_id, message.id);
    Ok(message)
}

/// Marks a delivered message as failed. No automatic retry; a later
/// explicit `sync` call is the retry mechanism.
pub fn fail(
    store: &dyn Store,
    network_id: &str,
    node_id: &str,
    message_id: &str,
    reason: Option<String>,
) -> Result<Message, SyncError> {
    let _message = load_sent_message(store, network_id, node_id, message_id)?;
    let message = store.finish_message(
        network_id,
        message_id,
        MessageState::Failed,
        None,
        reason,
        Utc::now(),
    )?;
    log::warn!(
        "node {} failed message {} ({:?})",
        node_id,
        message.id,
        message.reason
    );
    Ok(message)
}

/// Count of pending messages destined to `node_id`.
pub fn has_pending(store: &dyn Store, network_id: &str, node_id: &str) -> Result<i64, SyncError> {
    Ok(store.count_pending(network_id, node_id)?)
}
