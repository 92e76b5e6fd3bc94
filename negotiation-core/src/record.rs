//! Persisted negotiation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Rejection;
use crate::state::{transition, MessageKind, NegotiationState, Role};

/// Provider-side record of a single negotiation.
///
/// `provider_pid` and `state` are private: the identifier never changes after
/// creation, and the only way to obtain a record in a new state is
/// [`NegotiationRecord::apply`], which goes through [`transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    provider_pid: String,
    pub consumer_pid: String,
    state: NegotiationState,
    /// Bumped by the store on every successful save.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NegotiationRecord {
    /// Build a fresh record, validating the initial state against `message`.
    pub fn create(
        provider_pid: impl Into<String>,
        consumer_pid: impl Into<String>,
        message: MessageKind,
        role: Role,
    ) -> Result<Self, Rejection> {
        let state = transition(None, message, role)?;
        Ok(Self::with_state(provider_pid, consumer_pid, state))
    }

    /// Build a fresh record in an already-validated initial state.
    pub fn with_state(
        provider_pid: impl Into<String>,
        consumer_pid: impl Into<String>,
        state: NegotiationState,
    ) -> Self {
        let now = Utc::now();
        Self {
            provider_pid: provider_pid.into(),
            consumer_pid: consumer_pid.into(),
            state,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn provider_pid(&self) -> &str {
        &self.provider_pid
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Apply `message` and return the resulting record. `self` is untouched;
    /// the caller is responsible for persisting the returned value.
    pub fn apply(&self, message: MessageKind, role: Role) -> Result<Self, Rejection> {
        let next = transition(Some(self.state), message, role)?;
        if next == self.state {
            return Ok(self.clone());
        }
        Ok(Self {
            state: next,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }
}
