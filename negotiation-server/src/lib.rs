//! # negotiation-server
//!
//! Provider-side HTTP bindings for DSP contract negotiation: record stores,
//! message handlers, request validation and the axum router.

pub mod config;
pub mod error;
pub mod file_store;
pub mod handler;
pub mod negotiation;
pub mod store;
pub mod validation;

pub use config::{Cli, Environment, ServerConfig, StoreConfig};
pub use error::{ApiError, ServerError};
pub use file_store::FileStore;
pub use handler::{build_router, Server};
pub use negotiation::NegotiationService;
pub use store::{open_store, MemoryStore, NegotiationStore, StoreError};
