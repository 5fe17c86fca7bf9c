use std::time::Duration;

use thiserror::Error;

use crate::protocol::{CommandError, DecodeError};

use super::SessionStatus;

/// Everything a session transition can end in besides a fresh page. All of
/// these are recovered at the session boundary; none of them poison it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("storage access was not granted")]
    AuthorizationDenied,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("store call failed: {0}")]
    Executor(String),

    #[error("cannot {intent} while the session is {status}")]
    InvalidTransition {
        intent: &'static str,
        status: SessionStatus,
    },

    /// A newer intent replaced this one before it completed.
    #[error("superseded by a newer query")]
    Superseded,
}

impl SessionError {
    /// Failures that `QuerySession::retry` can address.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Decode(_) | SessionError::Timeout(_) | SessionError::Executor(_)
        )
    }
}
