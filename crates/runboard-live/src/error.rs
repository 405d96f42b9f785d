use crate::connection::ConnectionState;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    #[error("cannot {operation} a connection that is {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
    #[error("invalid stream url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("run view is already active")]
    AlreadyActive,
}
