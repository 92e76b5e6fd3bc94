//! Provider-side negotiation identifiers.

use uuid::Uuid;

/// URN prefix applied to every minted `providerPid`.
pub const URN_UUID_PREFIX: &str = "urn:uuid:";

/// Mints provider-scoped negotiation identifiers.
pub trait IdentifierService: Send + Sync {
    /// Return an identifier never handed out before.
    fn mint(&self) -> String;
}

/// Random (v4) UUIDs formatted as `urn:uuid:<uuid>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrnUuidMinter;

impl IdentifierService for UrnUuidMinter {
    fn mint(&self) -> String {
        format!("{}{}", URN_UUID_PREFIX, Uuid::new_v4())
    }
}

/// Check that `pid` is a well-formed `urn:uuid:` identifier.
pub fn is_urn_uuid(pid: &str) -> bool {
    pid.strip_prefix(URN_UUID_PREFIX)
        .map(|rest| Uuid::parse_str(rest).is_ok())
        .unwrap_or(false)
}
