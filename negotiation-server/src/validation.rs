//! Structural checks on inbound DSP messages.
//!
//! These run before any handler touches the store. Each check contributes a
//! human-readable reason; any reason at all turns the request into a 400.

use serde_json::Value;

use negotiation_core::message::{CONSUMER_PID, EVENT_TYPE, PROVIDER_PID};
use negotiation_core::{EventType, InboundMessage, NegotiationError, NegotiationResult};

pub const CONTRACT_REQUEST_MESSAGE: &str = "dspace:ContractRequestMessage";
pub const EVENT_MESSAGE: &str = "dspace:ContractNegotiationEventMessage";
pub const VERIFICATION_MESSAGE: &str = "dspace:ContractAgreementVerificationMessage";

#[derive(Default)]
struct Reasons(Vec<String>);

impl Reasons {
    fn push(&mut self, reason: impl Into<String>) {
        self.0.push(reason.into());
    }

    fn finish<T>(self, value: T) -> NegotiationResult<T> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(NegotiationError::BadRequest { reasons: self.0 })
        }
    }
}

fn check_object(body: &Value, reasons: &mut Reasons) -> bool {
    if body.is_object() {
        true
    } else {
        reasons.push("message body must be a JSON object");
        false
    }
}

fn check_type(body: &Value, expected: &str, reasons: &mut Reasons) {
    match body.get("@type") {
        None => {}
        Some(Value::String(t)) if t == expected => {}
        Some(_) => reasons.push(format!("'@type' must be '{}'", expected)),
    }
}

fn check_required_pid(body: &Value, key: &str, reasons: &mut Reasons) {
    match body.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(Value::String(_)) => reasons.push(format!("'{}' must not be empty", key)),
        Some(_) => reasons.push(format!("'{}' must be a string", key)),
        None => reasons.push(format!("'{}' is required", key)),
    }
}

/// `null` is treated like a missing key.
fn check_optional_string(body: &Value, key: &str, reasons: &mut Reasons) {
    match body.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => reasons.push(format!("'{}' must be a string", key)),
    }
}

fn check_path_pid(body: &Value, path_pid: &str, reasons: &mut Reasons) {
    if let Some(Value::String(body_pid)) = body.get(PROVIDER_PID) {
        if !body_pid.trim().is_empty() && body_pid != path_pid {
            reasons.push(format!(
                "'{}' does not match the negotiation in the request path",
                PROVIDER_PID
            ));
        }
    }
}

/// `POST /negotiations/request`
pub fn validate_contract_request(body: &Value) -> NegotiationResult<InboundMessage> {
    let mut reasons = Reasons::default();
    if check_object(body, &mut reasons) {
        check_type(body, CONTRACT_REQUEST_MESSAGE, &mut reasons);
        check_required_pid(body, CONSUMER_PID, &mut reasons);
        check_optional_string(body, PROVIDER_PID, &mut reasons);
    }
    reasons.finish(InboundMessage::from_value(body))
}

/// `POST /negotiations/{providerPid}/events`
pub fn validate_event(provider_pid: &str, body: &Value) -> NegotiationResult<EventType> {
    let mut reasons = Reasons::default();
    if !check_object(body, &mut reasons) {
        return reasons.finish(EventType::Accepted);
    }
    check_type(body, EVENT_MESSAGE, &mut reasons);
    check_optional_string(body, PROVIDER_PID, &mut reasons);
    check_optional_string(body, CONSUMER_PID, &mut reasons);
    check_path_pid(body, provider_pid, &mut reasons);

    let message = InboundMessage::from_value(body);
    let event = match (body.get(EVENT_TYPE), message.event_types.as_slice()) {
        (None, _) => {
            reasons.push(format!("'{}' is required", EVENT_TYPE));
            None
        }
        (Some(_), [token]) => {
            let event = EventType::from_wire(token);
            if event.is_none() {
                reasons.push(format!(
                    "'{}' must be 'dspace:ACCEPTED' or 'dspace:FINALIZED'",
                    EVENT_TYPE
                ));
            }
            event
        }
        (Some(_), _) => {
            reasons.push(format!("'{}' must hold exactly one event type", EVENT_TYPE));
            None
        }
    };

    match event {
        Some(event) => reasons.finish(event),
        None => Err(NegotiationError::BadRequest { reasons: reasons.0 }),
    }
}

/// `POST /negotiations/{providerPid}/agreement/verification`
pub fn validate_agreement_verification(
    provider_pid: &str,
    body: &Value,
) -> NegotiationResult<InboundMessage> {
    let mut reasons = Reasons::default();
    if check_object(body, &mut reasons) {
        check_type(body, VERIFICATION_MESSAGE, &mut reasons);
        check_required_pid(body, PROVIDER_PID, &mut reasons);
        check_required_pid(body, CONSUMER_PID, &mut reasons);
        check_path_pid(body, provider_pid, &mut reasons);
    }
    reasons.finish(InboundMessage::from_value(body))
}
