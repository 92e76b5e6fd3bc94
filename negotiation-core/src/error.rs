//! Error types for contract negotiation.

use thiserror::Error;

use crate::state::{MessageKind, NegotiationState, Role};

/// Why the state machine refused a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The message targets a negotiation that does not exist.
    #[error("no negotiation exists for {message}")]
    Absent { message: MessageKind },

    /// The negotiation is finalized or terminated.
    #[error("negotiation is closed ({state}), {message} not applied")]
    Closed {
        state: NegotiationState,
        message: MessageKind,
    },

    /// The message is not legal in the current state.
    #[error("{message} is not legal in state {state}")]
    Illegal {
        state: NegotiationState,
        message: MessageKind,
    },

    /// Only the provider-side automaton is implemented.
    #[error("no state machine for role {0:?}")]
    UnsupportedRole(Role),
}

/// Domain errors raised by negotiation handlers.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// `providerPid` does not resolve to a record.
    #[error("negotiation not found: {provider_pid}")]
    NotFound { provider_pid: String },

    /// Inbound message failed structural validation.
    #[error("bad request: {}", .reasons.join("; "))]
    BadRequest { reasons: Vec<String> },

    /// The state machine refused the message.
    #[error("transition rejected: {0}")]
    Rejected(#[from] Rejection),

    /// The record changed since it was read.
    #[error("negotiation {provider_pid} was modified concurrently (expected version {expected_version})")]
    Conflict {
        provider_pid: String,
        expected_version: u64,
    },

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NegotiationError {
    pub fn not_found(provider_pid: impl Into<String>) -> Self {
        Self::NotFound {
            provider_pid: provider_pid.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reasons: vec![reason.into()],
        }
    }
}

/// Result type alias for negotiation operations.
pub type NegotiationResult<T> = Result<T, NegotiationError>;
