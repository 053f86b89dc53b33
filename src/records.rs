use serde_json::Value;

use crate::error::SyncError;
use crate::model::{Change, Method, Record};
use crate::store::{NewChange, Store};

/// Applies one mutation to a record, creating it if `record_id` is
/// `None` and the method is `Create`.
///
/// Rules:
/// - `create` on an existing non-deleted record is a `Conflict`.
/// - `create` on an existing *deleted* record resurrects it (append a
///   fresh `Create` change, clear `deleted`) — see DESIGN.md for the
///   reasoning behind this choice.
/// - `update`/`delete` on a record that does not resolve is `NotFound`.
/// - `update`/`delete` on an already-deleted record is `Gone`.
pub fn apply_change(
    store: &dyn Store,
    network_id: &str,
    record_id: Option<&str>,
    method: Method,
    payload: Option<Value>,
) -> Result<(Record, Change), SyncError> {
    if method == Method::Delete && payload.is_some() {
        return Err(SyncError::Validation(
            "delete must not carry a payload".into(),
        ));
    }

    let existing = match record_id {
        Some(id) => store.get_record(network_id, id)?,
        None => None,
    };

    match existing {
        None => {
            if method != Method::Create {
                return Err(SyncError::NotFound(format!(
                    "record {:?} does not exist",
                    record_id
                )));
            }
            let id = record_id
                .map(str::to_string)
                .unwrap_or_else(crate::ids::generate_id);
            let (record, change) = store.create_record(
                network_id,
                &id,
                NewChange {
                    record_id: id.clone(),
                    version: 1,
                    method,
                    payload,
                },
            )?;
            log::debug!("record {} created (v1)", record.id);
            Ok((record, change))
        }
        Some(record) => {
            if method == Method::Create && !record.deleted {
                return Err(SyncError::Conflict(format!(
                    "record {} already exists",
                    record.id
                )));
            }
            if method != Method::Create && record.deleted {
                return Err(SyncError::Gone(format!("record {} was deleted", record.id)));
            }
            let head = store
                .get_head_change(network_id, &record.id)?
                .ok_or_else(|| {
                    SyncError::StorageUnavailable(format!(
                        "record {} has no head change",
                        record.id
                    ))
                })?;
            let deleted = method == Method::Delete;
            let (record, change) = store.append_change(
                network_id,
                deleted,
                NewChange {
                    record_id: record.id.clone(),
                    version: head.version + 1,
                    method,
                    payload,
                },
            )?;
            log::debug!(
                "record {} advanced to v{} ({:?})",
                record.id,
                change.version,
                method
            );
            Ok((record, change))
        }
    }
}

/// Returns the latest `Change` for a record.
pub fn head(store: &dyn Store, network_id: &str, record_id: &str) -> Result<Change, SyncError> {
    store
        .get_head_change(network_id, record_id)?
        .ok_or_else(|| SyncError::NotFound(format!("record {} not found", record_id)))
}
