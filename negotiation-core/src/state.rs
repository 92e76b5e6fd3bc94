//! Negotiation state machine for the provider side of the DSP.
//!
//! `transition` is the only place where the next state of a negotiation is
//! decided. It is a pure function over closed enums; handlers call it (via
//! [`crate::NegotiationRecord::apply`]) and persist the result separately.

use serde::{Deserialize, Serialize};

use crate::error::Rejection;

/// Contract negotiation states, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationState {
    #[serde(rename = "dspace:REQUESTED")]
    Requested,
    #[serde(rename = "dspace:OFFERED")]
    Offered,
    #[serde(rename = "dspace:ACCEPTED")]
    Accepted,
    #[serde(rename = "dspace:AGREED")]
    Agreed,
    #[serde(rename = "dspace:VERIFIED")]
    Verified,
    #[serde(rename = "dspace:FINALIZED")]
    Finalized,
    #[serde(rename = "dspace:TERMINATED")]
    Terminated,
}

impl NegotiationState {
    /// All states in protocol order.
    pub const ALL: [NegotiationState; 7] = [
        Self::Requested,
        Self::Offered,
        Self::Accepted,
        Self::Agreed,
        Self::Verified,
        Self::Finalized,
        Self::Terminated,
    ];

    /// A closed negotiation accepts no further mutating messages.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Finalized | Self::Terminated)
    }

    /// Wire token, e.g. `dspace:REQUESTED`.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Requested => "dspace:REQUESTED",
            Self::Offered => "dspace:OFFERED",
            Self::Accepted => "dspace:ACCEPTED",
            Self::Agreed => "dspace:AGREED",
            Self::Verified => "dspace:VERIFIED",
            Self::Finalized => "dspace:FINALIZED",
            Self::Terminated => "dspace:TERMINATED",
        }
    }

    /// Parse a wire token. Returns `None` for anything unrecognised.
    pub fn from_wire(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_wire() == token)
    }
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Event types a consumer may declare in a `ContractNegotiationEventMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "dspace:ACCEPTED")]
    Accepted,
    #[serde(rename = "dspace:FINALIZED")]
    Finalized,
}

impl EventType {
    pub fn from_wire(token: &str) -> Option<Self> {
        match token {
            "dspace:ACCEPTED" => Some(Self::Accepted),
            "dspace:FINALIZED" => Some(Self::Finalized),
            _ => None,
        }
    }
}

/// Protocol message kinds that drive transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `ContractRequestMessage` posted to `/negotiations/request`.
    ContractRequest,
    /// Provider-initiated offer, originated locally.
    ProviderOffer,
    /// `ContractRequestMessage` posted to `/negotiations/{pid}/request`,
    /// accepting or reasserting an offer.
    OfferAcceptance,
    /// `ContractNegotiationEventMessage`.
    Event(EventType),
    /// `ContractAgreementVerificationMessage`.
    AgreementVerification,
    /// `ContractNegotiationTerminationMessage`.
    Termination,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContractRequest => write!(f, "contract request"),
            Self::ProviderOffer => write!(f, "provider offer"),
            Self::OfferAcceptance => write!(f, "offer acceptance request"),
            Self::Event(EventType::Accepted) => write!(f, "ACCEPTED event"),
            Self::Event(EventType::Finalized) => write!(f, "FINALIZED event"),
            Self::AgreementVerification => write!(f, "agreement verification"),
            Self::Termination => write!(f, "termination"),
        }
    }
}

/// The local party evaluating a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Provider,
    Consumer,
}

/// Compute the next state of a negotiation.
///
/// `current` is `None` when no record exists yet. Returning the current state
/// unchanged is a legal no-op (re-fetch, re-termination, reasserted offer).
pub fn transition(
    current: Option<NegotiationState>,
    message: MessageKind,
    role: Role,
) -> Result<NegotiationState, Rejection> {
    use MessageKind as M;
    use NegotiationState as S;

    if role == Role::Consumer {
        return Err(Rejection::UnsupportedRole(role));
    }

    let current = match current {
        None => {
            return match message {
                M::ContractRequest => Ok(S::Requested),
                M::ProviderOffer => Ok(S::Offered),
                other => Err(Rejection::Absent { message: other }),
            }
        }
        Some(state) => state,
    };

    let next = match (current, message) {
        // Read-only re-fetch, legal whatever the state.
        (state, M::ContractRequest) => state,
        (S::Terminated, M::Termination) => S::Terminated,
        (state, message) if state.is_closed() => {
            return Err(Rejection::Closed { state, message });
        }
        (S::Offered, M::OfferAcceptance) => S::Offered,
        (_, M::OfferAcceptance) => S::Requested,
        (_, M::Event(EventType::Accepted)) => S::Accepted,
        (S::Verified, M::Event(EventType::Finalized)) => S::Finalized,
        (_, M::AgreementVerification) => S::Verified,
        (_, M::Termination) => S::Terminated,
        (S::Requested, M::ProviderOffer) => S::Offered,
        (state, message @ (M::Event(EventType::Finalized) | M::ProviderOffer)) => {
            return Err(Rejection::Illegal { state, message });
        }
    };

    if next != current {
        tracing::debug!("State transition: {} -> {} on {}", current, next, message);
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: Role = Role::Provider;

    fn open_states() -> impl Iterator<Item = NegotiationState> {
        NegotiationState::ALL.into_iter().filter(|s| !s.is_closed())
    }

    #[test]
    fn wire_tokens() {
        assert_eq!(
            serde_json::to_string(&NegotiationState::Requested).unwrap(),
            "\"dspace:REQUESTED\""
        );
        for state in NegotiationState::ALL {
            assert_eq!(NegotiationState::from_wire(state.as_wire()), Some(state));
        }
        assert_eq!(NegotiationState::from_wire("REQUESTED"), None);
    }

    #[test]
    fn closed_states() {
        assert!(NegotiationState::Terminated.is_closed());
        assert!(NegotiationState::Finalized.is_closed());
        assert!(!NegotiationState::Verified.is_closed());
    }

    #[test]
    fn contract_request_creates_requested() {
        assert_eq!(
            transition(None, MessageKind::ContractRequest, P),
            Ok(NegotiationState::Requested)
        );
    }

    #[test]
    fn provider_offer_creates_offered() {
        assert_eq!(
            transition(None, MessageKind::ProviderOffer, P),
            Ok(NegotiationState::Offered)
        );
    }

    #[test]
    fn absent_record_rejects_other_messages() {
        for message in [
            MessageKind::OfferAcceptance,
            MessageKind::Event(EventType::Accepted),
            MessageKind::AgreementVerification,
            MessageKind::Termination,
        ] {
            assert_eq!(
                transition(None, message, P),
                Err(Rejection::Absent { message })
            );
        }
    }

    #[test]
    fn contract_request_refetch_keeps_state() {
        for state in NegotiationState::ALL {
            assert_eq!(
                transition(Some(state), MessageKind::ContractRequest, P),
                Ok(state)
            );
        }
    }

    #[test]
    fn offer_acceptance() {
        assert_eq!(
            transition(Some(NegotiationState::Offered), MessageKind::OfferAcceptance, P),
            Ok(NegotiationState::Offered)
        );
        for state in open_states().filter(|s| *s != NegotiationState::Offered) {
            assert_eq!(
                transition(Some(state), MessageKind::OfferAcceptance, P),
                Ok(NegotiationState::Requested)
            );
        }
    }

    #[test]
    fn accepted_event_from_any_open_state() {
        for state in open_states() {
            assert_eq!(
                transition(Some(state), MessageKind::Event(EventType::Accepted), P),
                Ok(NegotiationState::Accepted)
            );
        }
    }

    #[test]
    fn finalized_event_requires_verified() {
        let finalize = MessageKind::Event(EventType::Finalized);
        assert_eq!(
            transition(Some(NegotiationState::Verified), finalize, P),
            Ok(NegotiationState::Finalized)
        );
        assert_eq!(
            transition(Some(NegotiationState::Accepted), finalize, P),
            Err(Rejection::Illegal {
                state: NegotiationState::Accepted,
                message: finalize,
            })
        );
    }

    #[test]
    fn verification_from_any_open_state() {
        for state in open_states() {
            assert_eq!(
                transition(Some(state), MessageKind::AgreementVerification, P),
                Ok(NegotiationState::Verified)
            );
        }
    }

    #[test]
    fn termination_from_open_states_and_idempotent() {
        for state in open_states() {
            assert_eq!(
                transition(Some(state), MessageKind::Termination, P),
                Ok(NegotiationState::Terminated)
            );
        }
        assert_eq!(
            transition(Some(NegotiationState::Terminated), MessageKind::Termination, P),
            Ok(NegotiationState::Terminated)
        );
    }

    #[test]
    fn closed_records_reject_mutations() {
        let mutating = [
            MessageKind::OfferAcceptance,
            MessageKind::Event(EventType::Accepted),
            MessageKind::Event(EventType::Finalized),
            MessageKind::AgreementVerification,
            MessageKind::ProviderOffer,
        ];
        for state in [NegotiationState::Terminated, NegotiationState::Finalized] {
            for message in mutating {
                assert_eq!(
                    transition(Some(state), message, P),
                    Err(Rejection::Closed { state, message })
                );
            }
        }
        assert_eq!(
            transition(Some(NegotiationState::Finalized), MessageKind::Termination, P),
            Err(Rejection::Closed {
                state: NegotiationState::Finalized,
                message: MessageKind::Termination,
            })
        );
    }

    #[test]
    fn provider_offer_only_counters_a_request() {
        assert_eq!(
            transition(Some(NegotiationState::Requested), MessageKind::ProviderOffer, P),
            Ok(NegotiationState::Offered)
        );
        assert!(matches!(
            transition(Some(NegotiationState::Accepted), MessageKind::ProviderOffer, P),
            Err(Rejection::Illegal { .. })
        ));
    }

    #[test]
    fn consumer_role_unsupported() {
        assert_eq!(
            transition(None, MessageKind::ContractRequest, Role::Consumer),
            Err(Rejection::UnsupportedRole(Role::Consumer))
        );
    }
}
