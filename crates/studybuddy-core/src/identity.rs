//! Owner identity.
//!
//! Authentication happens elsewhere; the engine only ever sees the opaque
//! owner id an [`IdentityProvider`] derives from a validated session token.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque identifier of the user owning a partition of events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "owner_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OwnerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves a session token to the owner it was issued for.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, session_token: &str) -> Result<OwnerId, ValidationError>;
}

/// Identity provider for a single, already-known owner (CLI and tests).
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    owner: OwnerId,
}

impl StaticIdentity {
    pub fn new(owner: OwnerId) -> Self {
        Self { owner }
    }
}

impl IdentityProvider for StaticIdentity {
    fn resolve(&self, _session_token: &str) -> Result<OwnerId, ValidationError> {
        Ok(self.owner.clone())
    }
}
