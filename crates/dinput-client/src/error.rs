//! Client errors.

use dinput_ipc::IpcError;
use dinput_types::{ErrorKind, ServiceRole};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{0} service unavailable")]
    ServiceUnavailable(ServiceRole),

    #[error("request already pending: {0}")]
    AlreadyPending(String),

    #[error("transport failure: {0}")]
    Transport(#[from] IpcError),

    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    /// The status kind this error is reported as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PreconditionFailed(_)
            | Self::MalformedPayload(_)
            | Self::InvalidPayload(_)
            | Self::Config(_) => ErrorKind::PreconditionFailed,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::AlreadyPending(_) => ErrorKind::AlreadyPending,
            Self::Transport(_) | Self::Other(_) => ErrorKind::TransportFailure,
        }
    }

    /// Integer status code for this error.
    pub fn code(&self) -> i32 {
        self.kind().code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            ClientError::PreconditionFailed("empty".into()).kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            ClientError::ServiceUnavailable(ServiceRole::Sink).kind(),
            ErrorKind::ServiceUnavailable
        );
        assert_eq!(
            ClientError::AlreadyPending("dev/dh".into()).code(),
            ErrorKind::AlreadyPending.code()
        );
        assert_eq!(
            ClientError::Transport(IpcError::Dead).kind(),
            ErrorKind::TransportFailure
        );
    }

    #[test]
    fn bad_json_is_a_precondition_failure() {
        let err: ClientError = serde_json::from_str::<Vec<i32>>("[1,")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }
}
