//! Server settings and the context object shared by every component.
//!
//! Settings are read once at startup from `warden.toml`:
//!
//! ```toml
//! require_authentication = true
//! auth_timeout_seconds = 30
//! max_players = 10
//! loopback_bypass = true
//! server_identity = "warden-server"
//!
//! [permissions]
//! operators = ["1001"]
//! admins = ["1000"]
//! banned_identities = []
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PermissionRecord, PermissionResolver, SessionError};

/// Tunables for the handshake and the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// When `false`, every session is admitted without a ticket.
    pub require_authentication: bool,
    /// Seconds a session may stay unauthenticated before it is evicted.
    pub auth_timeout_seconds: u64,
    /// Maximum number of concurrent sessions.
    pub max_players: usize,
    /// Admit the server's own loopback client without a ticket.
    pub loopback_bypass: bool,
    /// Sent to clients as `serverIdentityHint` in the challenge.
    pub server_identity: String,
    /// When set, clients announcing another version are refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_client_version: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            require_authentication: true,
            auth_timeout_seconds: 30,
            max_players: 10,
            loopback_bypass: true,
            server_identity: "warden-server".to_string(),
            required_client_version: None,
        }
    }
}

impl ServerSettings {
    /// Parses settings from TOML text. Unknown keys (such as the
    /// `[permissions]` table) are ignored.
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] if the text is not valid TOML or a
    /// key has the wrong type.
    pub fn from_toml(text: &str) -> Result<Self, SessionError> {
        Ok(toml::from_str(text)?)
    }

    /// The handshake timeout as a [`Duration`].
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_seconds)
    }
}

/// The `[permissions]` table of a configuration file.
#[derive(Debug, Default, Deserialize)]
struct PermissionsSection {
    #[serde(default)]
    permissions: PermissionRecord,
}

/// Everything the session layer reads from configuration, built once and
/// shared as `Arc<ServerContext>`.
#[derive(Debug)]
pub struct ServerContext {
    settings: ServerSettings,
    permissions: PermissionResolver,
}

impl ServerContext {
    /// A context with empty permission lists and no backing file.
    pub fn new(settings: ServerSettings) -> Self {
        Self::with_permissions(settings, PermissionResolver::new(PermissionRecord::default()))
    }

    /// A context with the given resolver.
    pub fn with_permissions(
        settings: ServerSettings,
        permissions: PermissionResolver,
    ) -> Self {
        if settings.max_players == 0 {
            tracing::warn!("max_players is 0; every connection will be refused");
        }
        Self {
            settings,
            permissions,
        }
    }

    /// Parses settings and permission lists from one TOML document.
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] on malformed input.
    pub fn from_toml(text: &str) -> Result<Self, SessionError> {
        let settings = ServerSettings::from_toml(text)?;
        let section: PermissionsSection = toml::from_str(text)?;
        Ok(Self::with_permissions(
            settings,
            PermissionResolver::new(section.permissions),
        ))
    }

    /// Loads `path`. A missing file yields the defaults; the path is still
    /// remembered so [`PermissionResolver::flush`] can create it.
    ///
    /// # Errors
    /// Returns [`SessionError::Io`] if the file exists but can't be read,
    /// or [`SessionError::Config`] if it doesn't parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let (settings, record) = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let section: PermissionsSection = toml::from_str(&text)?;
            (ServerSettings::from_toml(&text)?, section.permissions)
        } else {
            tracing::info!(path = %path.display(), "no configuration file, using defaults");
            (ServerSettings::default(), PermissionRecord::default())
        };
        tracing::info!(
            path = %path.display(),
            require_authentication = settings.require_authentication,
            max_players = settings.max_players,
            "configuration loaded"
        );
        Ok(Self::with_permissions(
            settings,
            PermissionResolver::with_backing_file(record, PathBuf::from(path)),
        ))
    }

    /// The immutable settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// The permission lists.
    pub fn permissions(&self) -> &PermissionResolver {
        &self.permissions
    }
}

impl Default for ServerContext {
    fn default() -> Self {
        Self::new(ServerSettings::default())
    }
}
