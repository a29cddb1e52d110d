//! Handshake messages.
//!
//! Four messages establish trust between a client and the server:
//!
//! ```text
//! client                         server
//!   │ ── hello{clientVersion} ──────▶ │
//!   │ ◀── challenge{provider, serverIdentityHint, nonce} ── │
//!   │ ── ticket{provider, claimedId, ticketHex, nonce} ───▶ │
//!   │ ◀── result{success, message, verifiedId} ──────────── │
//! ```
//!
//! On the wire each message is a JSON object whose `"command"` field names
//! the message and whose remaining fields are the payload:
//!
//! ```json
//! { "command": "ticket", "provider": "steam", "claimedId": "100",
//!   "ticketHex": "a1b2", "nonce": "n1" }
//! ```

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Client → Server: opens the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// Version string of the connecting client.
    pub client_version: String,
}

/// Server → Client: asks for a credential from a specific provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Tag of the identity provider the server validates against.
    pub provider: String,
    /// Identity of the server, for providers that bind tickets to it.
    pub server_identity_hint: String,
    /// Per-handshake nonce the ticket must echo back.
    pub nonce: String,
}

/// Client → Server: a provider credential for the claimed identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Provider tag the credential was issued by.
    pub provider: String,
    /// Identity the client claims. Untrusted until validated.
    pub claimed_id: String,
    /// Opaque credential bytes, hex encoded.
    pub ticket_hex: String,
    /// Nonce copied from the challenge.
    pub nonce: String,
}

impl Ticket {
    /// Builds a ticket, hex-encoding the raw credential.
    pub fn new(
        provider: impl Into<String>,
        claimed_id: impl Into<String>,
        credential: &[u8],
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            claimed_id: claimed_id.into(),
            ticket_hex: hex::encode(credential),
            nonce: nonce.into(),
        }
    }

    /// Decodes `ticket_hex` back into the raw credential bytes.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidMessage`] if the payload is empty.
    /// - [`ProtocolError::InvalidHex`] if it isn't valid hexadecimal.
    pub fn credential_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.ticket_hex.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "ticket payload is empty".into(),
            ));
        }
        Ok(hex::decode(&self.ticket_hex)?)
    }

    /// Checks that every field a server needs is present.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] naming the first empty field.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let fields = [
            ("provider", &self.provider),
            ("claimedId", &self.claimed_id),
            ("nonce", &self.nonce),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ProtocolError::InvalidMessage(format!(
                    "ticket field `{name}` is empty"
                )));
            }
        }
        Ok(())
    }
}

/// Server → Client: the terminal outcome of the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResult {
    /// Whether the client is now authenticated.
    pub success: bool,
    /// Human-readable reason, shown to the player on failure.
    pub message: String,
    /// The identity the server verified. Empty on failure or when
    /// authentication was not required.
    #[serde(default)]
    pub verified_id: String,
}

/// Every message exchanged during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HandshakeMessage {
    Hello(Hello),
    Challenge(Challenge),
    Ticket(Ticket),
    Result(HandshakeResult),
}

impl HandshakeMessage {
    /// The wire name of this message (the `"command"` field).
    pub fn command(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Challenge(_) => "challenge",
            Self::Ticket(_) => "ticket",
            Self::Result(_) => "result",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket {
            provider: "p".into(),
            claimed_id: "100".into(),
            ticket_hex: "a1b2".into(),
            nonce: "n1".into(),
        }
    }

    #[test]
    fn test_credential_bytes_decodes_hex() {
        assert_eq!(ticket().credential_bytes().unwrap(), vec![0xA1, 0xB2]);
    }

    #[test]
    fn test_credential_bytes_accepts_uppercase() {
        let t = Ticket { ticket_hex: "A1B2".into(), ..ticket() };
        assert_eq!(t.credential_bytes().unwrap(), vec![0xA1, 0xB2]);
    }

    #[test]
    fn test_credential_bytes_odd_length_is_invalid_hex() {
        let t = Ticket { ticket_hex: "a1b".into(), ..ticket() };
        assert!(matches!(
            t.credential_bytes(),
            Err(ProtocolError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_credential_bytes_empty_is_invalid_message() {
        let t = Ticket { ticket_hex: String::new(), ..ticket() };
        assert!(matches!(
            t.credential_bytes(),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_ticket_new_hex_encodes_lowercase() {
        let t = Ticket::new("p", "100", &[0xA1, 0xB2], "n1");
        assert_eq!(t, ticket());
    }

    #[test]
    fn test_validate_rejects_blank_claimed_id() {
        let t = Ticket { claimed_id: "  ".into(), ..ticket() };
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("claimedId"));
    }

    #[test]
    fn test_command_names() {
        let hello = HandshakeMessage::Hello(Hello { client_version: "1".into() });
        assert_eq!(hello.command(), "hello");
        assert_eq!(HandshakeMessage::Ticket(ticket()).command(), "ticket");
    }
}
