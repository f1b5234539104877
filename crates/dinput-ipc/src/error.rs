//! Remote call errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    /// The call could not be delivered or its reply was lost.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The remote side refused the request synchronously.
    #[error("remote rejected request with status {0}")]
    Rejected(i32),

    /// The remote object has died.
    #[error("remote object is dead")]
    Dead,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
