//! Typed error handling for dispatch operations.
//!
//! Entry points only fail for problems found before a request enters the
//! state machine. Everything that goes wrong afterwards is reported through
//! the sender's callback as a [`SendResult`](smsroute_common::SendResult).

use smsroute_common::ResultCode;
use thiserror::Error;

use crate::types::RequestKind;

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request failed validation and was never queued.
    #[error("Request rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// Internal failure of the dispatch machinery itself.
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// Reasons a request is refused before any dispatch is attempted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("destination address is empty")]
    EmptyDestination,

    #[error("message payload is empty")]
    EmptyPayload,

    /// A payload was submitted through the wrong entry point.
    #[error("expected a {expected:?} payload, got {actual:?}")]
    PayloadMismatch {
        expected: RequestKind,
        actual: RequestKind,
    },

    /// Reported by the storage collaborator.
    #[error("message storage is unavailable")]
    StorageUnavailable,
}

#[derive(Debug, Error)]
pub enum SystemError {
    /// The dispatch service is not running or has shut down.
    #[error("Dispatch service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Failure reported by a domain selection future instead of a domain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("domain selection failed: {0}")]
    Failed(String),

    /// The resolver dropped the request without answering.
    #[error("domain selection was abandoned by the resolver")]
    Abandoned,
}

/// Failure reported by the emergency state tracker when opening an
/// emergency SMS session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmergencyError {
    #[error("emergency SMS start rejected with cause {0}")]
    Rejected(u32),

    #[error("emergency state tracker unavailable")]
    Unavailable,
}

impl DispatchError {
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// The result code a caller-facing API would surface for this error.
    #[must_use]
    pub const fn result_code(&self) -> ResultCode {
        match self {
            Self::Rejected(RejectReason::StorageUnavailable) => ResultCode::NoMemory,
            Self::Rejected(_) => ResultCode::InvalidArguments,
            Self::System(_) => ResultCode::SystemError,
        }
    }
}
