//! Status codes shared by every client operation and callback.

use thiserror::Error;

/// Status code the remote side reports for a successful operation.
pub const DH_SUCCESS: i32 = 0;

/// The closed set of outcome kinds.
///
/// Every client operation resolves to exactly one of these, either as its
/// synchronous return or through the callback it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(i32)]
pub enum ErrorKind {
    #[error("success")]
    Success = 0,

    /// Invalid arguments; nothing was sent to the remote side.
    #[error("precondition failed")]
    PreconditionFailed = -1001,

    /// The remote service could not be reached.
    #[error("service unavailable")]
    ServiceUnavailable = -1002,

    /// An identical request is already in flight.
    #[error("request already pending")]
    AlreadyPending = -1003,

    /// The remote call itself failed.
    #[error("transport failure")]
    TransportFailure = -1004,

    /// The remote side completed the request with a non-success status.
    #[error("remote reported failure")]
    RemoteReportedFailure = -1005,
}

impl ErrorKind {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Classify a status code. Unknown non-zero codes are remote failures.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1001 => Self::PreconditionFailed,
            -1002 => Self::ServiceUnavailable,
            -1003 => Self::AlreadyPending,
            -1004 => Self::TransportFailure,
            _ => Self::RemoteReportedFailure,
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::Success.code(), DH_SUCCESS);
        assert_eq!(ErrorKind::PreconditionFailed.code(), -1001);
        assert_eq!(ErrorKind::TransportFailure.code(), -1004);
    }

    #[test]
    fn from_code_inverts_code() {
        for kind in [
            ErrorKind::Success,
            ErrorKind::PreconditionFailed,
            ErrorKind::ServiceUnavailable,
            ErrorKind::AlreadyPending,
            ErrorKind::TransportFailure,
            ErrorKind::RemoteReportedFailure,
        ] {
            assert_eq!(ErrorKind::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn unknown_codes_are_remote_failures() {
        assert_eq!(ErrorKind::from_code(42), ErrorKind::RemoteReportedFailure);
        assert_eq!(ErrorKind::from_code(-67_000), ErrorKind::RemoteReportedFailure);
    }
}
