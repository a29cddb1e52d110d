//! Wire protocol for the Warden handshake.
//!
//! - **Messages** ([`HandshakeMessage`] and its payloads): what travels
//!   between client and server while trust is being established.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (HandshakeMessage) → Session (registry)
//! ```

mod codec;
mod error;
mod messages;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    Challenge, HandshakeMessage, HandshakeResult, Hello, Ticket,
};

/// Client version string sent in `hello` by default.
pub const PROTOCOL_VERSION: &str = "1";
