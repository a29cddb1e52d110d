//! Permission levels resolved from verified identities.
//!
//! The resolver only ever accepts a [`VerifiedIdentity`]. There is no way
//! to ask it about a claim.

use std::collections::BTreeSet;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{AuthState, Session, SessionError, VerifiedIdentity};

/// What a session is allowed to do, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionLevel {
    /// Not authenticated, or banned.
    None,
    /// An ordinary authenticated player.
    Player,
    /// May run moderation commands.
    Operator,
    /// May do everything, including editing these lists.
    Administrator,
}

/// Persisted allow-lists, keyed by verified identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionRecord {
    pub operators: BTreeSet<String>,
    pub admins: BTreeSet<String>,
    pub banned_identities: BTreeSet<String>,
}

/// Lookup from verified identity to [`PermissionLevel`].
///
/// The lists are only changed by the administrative mutators below, never
/// by the handshake. Changes stay in memory until [`flush`](Self::flush).
#[derive(Debug)]
pub struct PermissionResolver {
    record: RwLock<PermissionRecord>,
    backing_file: Option<PathBuf>,
}

impl PermissionResolver {
    /// An in-memory resolver.
    pub fn new(record: PermissionRecord) -> Self {
        Self {
            record: RwLock::new(record),
            backing_file: None,
        }
    }

    /// A resolver that [`flush`](Self::flush)es to `path`.
    pub fn with_backing_file(record: PermissionRecord, path: PathBuf) -> Self {
        Self {
            record: RwLock::new(record),
            backing_file: Some(path),
        }
    }

    /// The level of `identity`. Banned identities resolve to `None`; the
    /// ban itself is enforced by the session registry.
    pub fn level(&self, identity: &VerifiedIdentity) -> PermissionLevel {
        let record = self.record.read();
        let id = identity.as_str();
        if record.banned_identities.contains(id) {
            PermissionLevel::None
        } else if record.admins.contains(id) {
            PermissionLevel::Administrator
        } else if record.operators.contains(id) {
            PermissionLevel::Operator
        } else {
            PermissionLevel::Player
        }
    }

    /// Whether `identity` holds at least `required`.
    pub fn can_perform(
        &self,
        identity: &VerifiedIdentity,
        required: PermissionLevel,
    ) -> bool {
        self.level(identity) >= required
    }

    /// Whether `identity` is on the ban list.
    pub fn is_banned(&self, identity: &VerifiedIdentity) -> bool {
        self.record.read().banned_identities.contains(identity.as_str())
    }

    /// Ban-list lookup by raw id. Used to refuse a claim early; it can only
    /// ever deny, so it is safe to feed untrusted input.
    pub(crate) fn denies(&self, id: &str) -> bool {
        self.record.read().banned_identities.contains(id)
    }

    /// The level of a session, read from its verified identity only.
    ///
    /// An authenticated loopback session is the server itself and gets
    /// `Administrator`; an authenticated session admitted without a ticket
    /// gets `Player`. Anything not yet authenticated gets `None`.
    pub fn session_level(&self, session: &Session) -> PermissionLevel {
        if session.auth_state() != AuthState::Authenticated {
            return PermissionLevel::None;
        }
        match session.verified() {
            Some(identity) => self.level(identity),
            None if session.is_loopback() => PermissionLevel::Administrator,
            None => PermissionLevel::Player,
        }
    }

    // -----------------------------------------------------------------------
    // Administrative mutators
    // -----------------------------------------------------------------------

    /// Adds `id` to the operators. Returns `false` if already there.
    pub fn grant_operator(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        tracing::info!(%id, "granting operator");
        self.record.write().operators.insert(id)
    }

    /// Adds `id` to the admins. Returns `false` if already there.
    pub fn grant_admin(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        tracing::info!(%id, "granting admin");
        self.record.write().admins.insert(id)
    }

    /// Removes `id` from the operators and admins.
    pub fn revoke(&self, id: &str) -> bool {
        let mut record = self.record.write();
        let was_operator = record.operators.remove(id);
        let was_admin = record.admins.remove(id);
        if was_operator || was_admin {
            tracing::info!(%id, "privileges revoked");
        }
        was_operator || was_admin
    }

    /// Adds `id` to the ban list. Already-connected sessions are not
    /// kicked by this call.
    pub fn ban(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        tracing::info!(%id, "identity banned");
        self.record.write().banned_identities.insert(id)
    }

    /// Removes `id` from the ban list.
    pub fn unban(&self, id: &str) -> bool {
        self.record.write().banned_identities.remove(id)
    }

    /// A copy of the current lists.
    pub fn snapshot(&self) -> PermissionRecord {
        self.record.read().clone()
    }

    /// Writes the lists to the `[permissions]` table of the backing file.
    /// Other keys in the file are preserved.
    ///
    /// # Errors
    /// - [`SessionError::NoBackingFile`] for an in-memory resolver
    /// - [`SessionError::Io`] / [`SessionError::Config`] if the existing
    ///   file can't be read or parsed
    /// - [`SessionError::ConfigWrite`] if serialization fails
    pub fn flush(&self) -> Result<(), SessionError> {
        let path = self
            .backing_file
            .as_ref()
            .ok_or(SessionError::NoBackingFile)?;

        let mut document = if path.exists() {
            std::fs::read_to_string(path)?.parse::<toml::Table>()?
        } else {
            toml::Table::new()
        };
        document.insert(
            "permissions".to_string(),
            toml::Value::try_from(self.snapshot())?,
        );

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml::to_string_pretty(&document)?)?;
        tracing::info!(path = %path.display(), "permissions flushed");
        Ok(())
    }
}
