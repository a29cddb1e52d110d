//! One server, three clients, one process.
//!
//! - the server's own loopback client, admitted without a ticket
//! - "alice", whose passphrase the demo provider accepts
//! - "mallory", who guesses and is disconnected
//!
//! Run with `RUST_LOG=debug` to see every handshake step.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use warden::client::ClientError;
use warden::prelude::*;
use warden::session::ValidationSink;
use warden::transport::MemoryLink;

// ---------------------------------------------------------------------------
// Server side: an identity provider that answers from a worker thread
// ---------------------------------------------------------------------------

const PASSPHRASE: &[u8] = b"open sesame";

/// Checks passphrases off the tick thread, like a vendor SDK would.
#[derive(Default)]
struct PassphraseProvider {
    sink: Option<ValidationSink>,
}

impl IdentityProvider for PassphraseProvider {
    fn tag(&self) -> &str {
        "passphrase"
    }

    fn initialize(&mut self, sink: ValidationSink) -> Result<(), AuthError> {
        self.sink = Some(sink);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.sink.is_some()
    }

    fn begin_validate(
        &mut self,
        credential: &[u8],
        claimed_id: &str,
    ) -> Result<(), AuthError> {
        let sink = self.sink.clone().ok_or(AuthError::ProviderUnavailable)?;
        let claimed_id = claimed_id.to_string();
        let code = if credential == PASSPHRASE { 0 } else { 1 };
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            sink.deliver_code(&claimed_id, code);
        });
        Ok(())
    }

    fn cancel(&mut self, claimed_id: &str) {
        tracing::debug!(claimed_id, "validation cancelled");
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

struct Player {
    name: &'static str,
    secret: &'static [u8],
}

impl CredentialIssuer for Player {
    fn supports(&self, provider: &str) -> bool {
        provider == "passphrase"
    }

    fn issue_credential(&mut self) -> Result<(String, Vec<u8>), ClientError> {
        Ok((self.name.to_string(), self.secret.to_vec()))
    }

    fn cancel_credential(&mut self) {}
}

/// Drives every client until each one finishes, then signals `done`.
async fn drive_clients(transport: MemoryTransport, done: oneshot::Sender<()>) {
    let players = [
        (Locality::Loopback, Player { name: "host", secret: b"" }),
        (Locality::Remote, Player { name: "alice", secret: PASSPHRASE }),
        (Locality::Remote, Player { name: "mallory", secret: b"password1" }),
    ];
    let mut clients: Vec<(MemoryLink, ClientHandshake<Player>)> = players
        .into_iter()
        .map(|(locality, player)| {
            let link = transport.link(transport.open(locality));
            (link, ClientHandshake::new(player))
        })
        .collect();

    let mut interval = tokio::time::interval(Duration::from_millis(50));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        interval.tick().await;
        for (link, client) in &mut clients {
            client.update(link);
            for bytes in transport.take_sent(link.connection()) {
                match client.handle_message(link, &bytes) {
                    Ok(Some(ClientEvent::Authenticated { verified_id })) => {
                        tracing::info!(player = client.issuer().name, ?verified_id, "client: in");
                    }
                    Ok(Some(ClientEvent::Rejected { message })) => {
                        tracing::info!(player = client.issuer().name, %message, "client: turned away");
                    }
                    Ok(None) => {}
                    Err(error) => tracing::warn!(%error, "client: bad message"),
                }
            }
        }
        if clients.iter().all(|(_, client)| client.state().is_finished()) {
            break;
        }
    }
    let _ = done.send(());
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), WardenError> {
    warden::init_tracing();

    let settings = ServerSettings {
        auth_timeout_seconds: 5,
        ..ServerSettings::default()
    };
    let ctx = Arc::new(ServerContext::new(settings));
    ctx.permissions().grant_operator("alice");

    let orchestrator = AuthOrchestrator::new(
        ProviderTicketBackend::new(PassphraseProvider::default()),
        &ctx,
    );
    let transport = MemoryTransport::new();
    let registry = SessionRegistry::new(ctx, orchestrator, transport.clone());
    let mut host = SessionHost::new(registry);
    let mut events = host.subscribe();

    let (done_tx, done_rx) = oneshot::channel();
    let clients = tokio::spawn(drive_clients(transport, done_tx));
    host.run(async {
        let _ = done_rx.await;
    })
    .await;
    if let Err(error) = clients.await {
        tracing::error!(%error, "client task failed");
    }

    for event in events.drain() {
        let session = event.session();
        let kind = match &event {
            SessionEvent::Joined(_) => "joined",
            SessionEvent::Left(_) => "left",
            SessionEvent::IdentityBound(_) => "identity bound",
            SessionEvent::AuthenticationCompleted { .. } => "auth completed",
        };
        tracing::info!(conn = %session.connection(), "{kind}");
    }
    for session in host.registry().sessions() {
        tracing::info!(
            conn = %session.connection(),
            state = ?session.auth_state(),
            level = ?host.registry().permission_level(session.connection()),
            "final"
        );
    }
    Ok(())
}
