//! Opaque change token
//!
//! A change token marks a point in a backend's change stream. Its bytes are
//! meaningful only to the adapter that produced them; the engine stores and
//! returns them unchanged.

use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};

/// Opaque checkpoint bytes issued by a sync service
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(Vec<u8>);

impl ChangeToken {
    /// Borrow the raw token bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the token, returning its bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for ChangeToken {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Debug for ChangeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeToken({} bytes)", self.0.len())
    }
}
