use http::StatusCode;
use seals_core::{DeltaError, RoomCodeError, SessionStatus};

use crate::store::StoreError;

/// Typed failure of a session protocol call.
///
/// Every store error is converted at the protocol boundary; callers see one
/// of these and never a raw store fault. Losing the winner race is not an
/// error and has no variant here.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    InvalidRoomCode(#[from] RoomCodeError),

    #[error(transparent)]
    InvalidProgress(#[from] DeltaError),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Team not found in the session")]
    TeamNotFound,

    #[error("Session is not accepting new teams")]
    SessionNotJoinable,

    #[error("Session is full")]
    SessionFull,

    #[error("Only the host team can perform this action: {0}")]
    NotHost(&'static str),

    #[error("Cannot {action} while the session is {status:?}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("Session is locked")]
    SessionLocked,

    #[error("No free room code after {0} attempts")]
    CodeExhausted(u32),

    #[error("Failed to create session: {0}")]
    SessionCreateFailed(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProtocolError {
    pub fn to_status(&self) -> StatusCode {
        match self {
            ProtocolError::InvalidInput(_)
            | ProtocolError::InvalidRoomCode(_)
            | ProtocolError::InvalidProgress(_) => StatusCode::BAD_REQUEST,
            ProtocolError::SessionNotFound | ProtocolError::TeamNotFound => StatusCode::NOT_FOUND,
            ProtocolError::SessionNotJoinable
            | ProtocolError::SessionFull
            | ProtocolError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ProtocolError::NotHost(_) => StatusCode::FORBIDDEN,
            ProtocolError::SessionLocked => StatusCode::LOCKED,
            ProtocolError::CodeExhausted(_) | ProtocolError::SessionCreateFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProtocolError::Store(err) if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ProtocolError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transient store failures. Contention and validation errors never
    /// qualify: retrying cannot change their precondition.
    pub fn is_transient(&self) -> bool {
        match self {
            ProtocolError::Store(err) | ProtocolError::SessionCreateFailed(err) => {
                err.is_transient()
            }
            _ => false,
        }
    }
}
