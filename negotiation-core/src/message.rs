//! Wire projection for DSP negotiation messages.
//!
//! Outbound, a [`NegotiationRecord`] is projected to a
//! `dspace:ContractNegotiation` document. Inbound, the handful of fields the
//! provider cares about are pulled out of an arbitrary JSON body; anything
//! unknown or missing is tolerated here and left to request validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::NegotiationRecord;
use crate::state::NegotiationState;

/// JSON-LD context of every DSP 2024-1 message.
pub const DSPACE_CONTEXT: &str = "https://w3id.org/dspace/2024/1/context.json";

/// `@type` of the negotiation document.
pub const CONTRACT_NEGOTIATION_TYPE: &str = "dspace:ContractNegotiation";

pub const PROVIDER_PID: &str = "dspace:providerPid";
pub const CONSUMER_PID: &str = "dspace:consumerPid";
pub const STATE: &str = "dspace:state";
pub const EVENT_TYPE: &str = "dspace:eventType";

/// Externally visible negotiation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationDocument {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@type")]
    pub kind: String,
    #[serde(rename = "dspace:providerPid")]
    pub provider_pid: String,
    #[serde(rename = "dspace:consumerPid")]
    pub consumer_pid: String,
    #[serde(rename = "dspace:state")]
    pub state: NegotiationState,
}

impl From<&NegotiationRecord> for NegotiationDocument {
    fn from(record: &NegotiationRecord) -> Self {
        Self {
            context: DSPACE_CONTEXT.to_string(),
            kind: CONTRACT_NEGOTIATION_TYPE.to_string(),
            provider_pid: record.provider_pid().to_string(),
            consumer_pid: record.consumer_pid.clone(),
            state: record.state(),
        }
    }
}

/// Fields extracted from an inbound message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_type: Option<String>,
    pub provider_pid: Option<String>,
    pub consumer_pid: Option<String>,
    pub state: Option<NegotiationState>,
    /// Raw `dspace:eventType` tokens; the schema allows a string or an array.
    pub event_types: Vec<String>,
}

impl InboundMessage {
    pub fn from_value(body: &Value) -> Self {
        let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
        // Blank pids count as absent.
        let pid = |key: &str| text(key).filter(|s| !s.trim().is_empty());

        let event_types = match body.get(EVENT_TYPE) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        Self {
            message_type: text("@type"),
            provider_pid: pid(PROVIDER_PID),
            consumer_pid: pid(CONSUMER_PID),
            state: body
                .get(STATE)
                .and_then(Value::as_str)
                .and_then(NegotiationState::from_wire),
            event_types,
        }
    }
}
