//! Identity types.
//!
//! A client *claims* an identity; a backend *verifies* one. The two are
//! distinct types so that nothing which grants privileges can be handed a
//! claim by mistake: the permission resolver only accepts
//! [`VerifiedIdentity`].

use std::fmt;

/// Client-asserted identity. Untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClaimedIdentity {
    /// Self-reported account id.
    pub id: String,
    /// Self-reported display name.
    pub display_name: String,
}

impl ClaimedIdentity {
    /// Creates a claim.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// A claim carrying nothing but defaults: no id and no name.
    pub fn is_placeholder(&self) -> bool {
        self.id.trim().is_empty() && self.display_name.trim().is_empty()
    }
}

/// Identity confirmed by an authentication backend.
///
/// Backends are the only intended producers. The session stores it
/// write-once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerifiedIdentity(String);

impl VerifiedIdentity {
    /// Wraps an id a backend has verified.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The verified id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerifiedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How much the server knows about who is behind a session.
///
/// ```text
/// Unknown ──(claim)──→ Claimed ──(backend success)──→ Verified
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStatus {
    /// No claim has been received yet.
    Unknown,
    /// The client told us who it is; nobody has checked.
    Claimed,
    /// A backend confirmed the identity.
    Verified,
}
