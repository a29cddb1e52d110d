//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding or interpreting a
/// handshake message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, unknown command, missing
    /// or mistyped fields.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates a handshake rule, e.g. a ticket
    /// with an empty claimed id.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// `ticketHex` is not valid hexadecimal.
    #[error("invalid ticket hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
