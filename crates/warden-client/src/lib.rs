//! Client side of the Warden handshake.
//!
//! [`ClientHandshake`] drives `hello → challenge → ticket → result` over a
//! [`Link`](warden_transport::Link), asking a [`CredentialIssuer`] for a
//! fresh single-use credential for every challenge.
//!
//! ```text
//!        update()          challenge            ticket sent
//! Idle ──────────→ HelloSent ──────→ ChallengeReceived ──────→ TicketSent
//!  ▲                   │                                          │
//!  │              (send failed,                              result │
//!  └── 1 s backoff ────┘                          ┌───────────────┴──┐
//!                                                 ▼                  ▼
//!                                           Authenticated          Failed
//! ```

mod error;
mod handshake;

pub use error::ClientError;
pub use handshake::{
    ClientEvent, ClientHandshake, ClientState, CredentialIssuer,
    HELLO_RETRY_DELAY,
};
