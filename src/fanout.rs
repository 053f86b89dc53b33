use crate::error::SyncError;
use crate::model::{Change, Message, MessageState, Record};
use crate::remote;
use crate::store::{NewMessage, Store};

/// Materializes the origin message and one pending delivery message per
/// eligible recipient for a freshly-accepted publish.
///
/// Eligible recipients are every node in the network other than
/// `origin_node_id` with `can_read = true`. The origin message itself is
/// never delivered: it is inserted already `acknowledged`, purely as the
/// fan-out's audit/parent record.
pub fn publish(
    store: &dyn Store,
    network_id: &str,
    origin_node_id: &str,
    record: &Record,
    change: &Change,
) -> Result<Message, SyncError> {
    let origin_message = store.insert_message(
        network_id,
        NewMessage {
            origin_id: Some(origin_node_id.to_string()),
            destination_id: origin_node_id.to_string(),
            record_id: record.id.clone(),
            change_id: change.id.clone(),
            method: change.method,
            remote_id: None,
            state: MessageState::Acknowledged,
            parent_id: None,
        },
    )?;

    let recipients: Vec<_> = store
        .get_nodes(network_id)?
        .into_iter()
        .filter(|n| n.id != origin_node_id && n.can_read)
        .collect();

    for recipient in &recipients {
        let remote_id = remote::lookup(store, network_id, &recipient.id, &record.id)?;
        store.insert_message(
            network_id,
            NewMessage {
                origin_id: Some(origin_node_id.to_string()),
                destination_id: recipient.id.clone(),
                record_id: record.id.clone(),
                change_id: change.id.clone(),
                method: change.method,
                remote_id,
                state: MessageState::Pending,
                parent_id: Some(origin_message.id.clone()),
            },
        )?;
    }

    log::info!(
        "publish by {} on record {} fanned out to {} node(s)",
        origin_node_id,
        record.id,
        recipients.len()
    );
    Ok(origin_message)
}
