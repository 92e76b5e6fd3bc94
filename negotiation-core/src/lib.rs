//! # negotiation-core
//!
//! Core library for the provider side of the Dataspace Protocol (DSP)
//! contract negotiation.
//!
//! This crate provides the negotiation state machine, the persisted record
//! type, identifier minting and the JSON wire projection. It carries no
//! async runtime; storage and HTTP bindings live in `negotiation-server`.

pub mod error;
pub mod identifier;
pub mod message;
pub mod record;
pub mod state;

pub use error::{NegotiationError, NegotiationResult, Rejection};
pub use identifier::{is_urn_uuid, IdentifierService, UrnUuidMinter};
pub use message::{InboundMessage, NegotiationDocument, DSPACE_CONTEXT};
pub use record::NegotiationRecord;
pub use state::{transition, EventType, MessageKind, NegotiationState, Role};

/// Dataspace Protocol version implemented.
pub const PROTOCOL_VERSION: &str = "2024-1";
