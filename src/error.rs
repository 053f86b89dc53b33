use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the node controller and every layer it composes.
///
/// Variants map directly onto the error kinds a transport collaborator is
/// expected to translate into status codes; this crate does not perform
/// that translation itself.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("gone: {0}")]
    Gone(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("fetch before send: node {0} has pending messages")]
    FetchBeforeSend(String),

    #[error("remote id conflict: {0}")]
    RemoteConflict(String),

    #[error("invalid state: {0}")]
    State(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => SyncError::StorageUnavailable(msg),
        }
    }
}
