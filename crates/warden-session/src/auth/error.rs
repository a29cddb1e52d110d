//! Authentication failure taxonomy.

/// Why an identity provider refused a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The credential is not a valid ticket.
    InvalidTicket,
    /// The ticket was valid once but has expired.
    ExpiredTicket,
    /// The ticket was already redeemed.
    TicketAlreadyUsed,
    /// The provider itself has banned this account.
    Banned,
    /// The ticket belongs to a different account or network identity.
    IdentityMismatch,
    /// The account logged in from another machine.
    LoggedInElsewhere,
    /// Any other provider outcome, with its raw code.
    Other(u32),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTicket => f.write_str("ticket is invalid"),
            Self::ExpiredTicket => f.write_str("ticket has expired"),
            Self::TicketAlreadyUsed => f.write_str("ticket was already used"),
            Self::Banned => f.write_str("account is banned by the identity provider"),
            Self::IdentityMismatch => {
                f.write_str("ticket does not match the connecting identity")
            }
            Self::LoggedInElsewhere => {
                f.write_str("account logged in from another location")
            }
            Self::Other(code) => write!(f, "rejected by provider (code {code})"),
        }
    }
}

/// Everything that can stop a session from authenticating.
///
/// Terminal variants end the connection; the others leave the session
/// retryable until the handshake timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The client's ticket could not be parsed.
    #[error("malformed ticket: {0}")]
    MalformedTicket(String),

    /// The backend or its provider is not ready yet.
    #[error("identity provider unavailable")]
    ProviderUnavailable,

    /// A validation for the same claimed identity is already outstanding.
    #[error("authentication already pending for identity {0}")]
    DuplicatePendingRequest(String),

    /// The provider refused the ticket.
    #[error("authentication rejected: {0}")]
    ProviderRejected(RejectReason),

    /// No completion arrived within the configured window.
    #[error("authentication timed out")]
    HandshakeTimeout,

    /// The server is full.
    #[error("server is full ({max} players)")]
    CapacityExceeded { max: usize },

    /// The identity is on the server's ban list.
    #[error("you are banned from this server")]
    Banned,

    /// The client runs a version the server does not accept.
    #[error("client version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: String, got: String },

    /// The configured backend cannot validate tickets.
    #[error("authentication backend not implemented: {0}")]
    NotImplemented(String),
}

impl AuthError {
    /// Whether the connection must be closed.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::MalformedTicket(_)
                | Self::ProviderUnavailable
                | Self::DuplicatePendingRequest(_)
        )
    }

    /// Whether the submitted ticket may be re-dispatched as is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable)
    }
}
