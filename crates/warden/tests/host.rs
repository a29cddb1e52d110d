//! Integration tests for `SessionHost`: transport pumping, frame loop and
//! configuration loading. Uses `start_paused` so frames are deterministic.

use std::sync::Arc;
use std::time::Duration;

use warden::prelude::*;
use warden::session::VerifiedIdentity;

// =========================================================================
// Helpers
// =========================================================================

fn host_with(settings: ServerSettings) -> (SessionHost<MemoryTransport>, MemoryTransport) {
    let ctx = Arc::new(ServerContext::new(settings));
    let orchestrator = AuthOrchestrator::new(NoAuthBackend, &ctx);
    let transport = MemoryTransport::new();
    let registry = SessionRegistry::new(ctx, orchestrator, transport.clone());
    (SessionHost::new(registry), transport)
}

struct Issuer;

impl CredentialIssuer for Issuer {
    fn supports(&self, provider: &str) -> bool {
        provider == "none"
    }

    fn issue_credential(
        &mut self,
    ) -> Result<(String, Vec<u8>), warden::client::ClientError> {
        Ok(("7".into(), vec![1]))
    }

    fn cancel_credential(&mut self) {}
}

// =========================================================================
// pump / tick
// =========================================================================

#[test]
fn test_pump_routes_pending_events() {
    let (mut host, transport) = host_with(ServerSettings::default());
    let a = transport.open(Locality::Remote);
    let b = transport.open(Locality::Remote);

    assert_eq!(host.pump(), 2);
    assert_eq!(host.registry().len(), 2);

    transport.disconnect(a);
    assert_eq!(host.pump(), 1);
    assert!(host.registry().get(a).is_none());
    assert!(host.registry().get(b).is_some());
    assert_eq!(host.pump(), 0);
}

#[test]
fn test_pump_refused_connection_keeps_going() {
    let settings = ServerSettings {
        max_players: 1,
        ..ServerSettings::default()
    };
    let (mut host, transport) = host_with(settings);
    let first = transport.open(Locality::Remote);
    let second = transport.open(Locality::Remote);
    let third = transport.open(Locality::Remote);

    assert_eq!(host.pump(), 3);

    assert!(host.registry().get(first).is_some());
    assert_eq!(transport.close_count(second), 1);
    assert_eq!(transport.close_count(third), 1);
    assert_eq!(host.registry().len(), 1);
}

#[test]
fn test_tick_completes_client_handshake() {
    let (mut host, transport) = host_with(ServerSettings::default());
    let conn = transport.open(Locality::Remote);
    let link = transport.link(conn);
    let mut client = ClientHandshake::new(Issuer);

    let mut events = Vec::new();
    for _ in 0..3 {
        client.update(&link);
        host.tick();
        for bytes in transport.take_sent(conn) {
            if let Some(event) = client.handle_message(&link, &bytes).unwrap() {
                events.push(event);
            }
        }
    }

    assert_eq!(
        events,
        vec![ClientEvent::Authenticated { verified_id: Some("7".into()) }]
    );
    assert_eq!(host.registry().permission_level(conn), PermissionLevel::Player);
}

// =========================================================================
// run
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let (mut host, transport) = host_with(ServerSettings::default());
    let mut events = host.subscribe();
    let conn = transport.open(Locality::Loopback);

    host.run(tokio::time::sleep(Duration::from_millis(350))).await;

    assert_eq!(host.scheduler().tick_count(), 3);
    let session = host.registry().get(conn).unwrap();
    assert_eq!(session.auth_state(), AuthState::Authenticated);
    let seen = events.drain();
    assert!(seen.iter().any(|e| matches!(e, SessionEvent::Joined(_))));
    // Shutdown released the sender.
    assert!(events.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_run_evicts_silent_connection() {
    let settings = ServerSettings {
        auth_timeout_seconds: 1,
        ..ServerSettings::default()
    };
    let (mut host, transport) = host_with(settings);
    let conn = transport.open(Locality::Remote);

    host.run(tokio::time::sleep(Duration::from_millis(1_500))).await;

    assert_eq!(transport.close_count(conn), 1);
    assert!(transport.close_reason(conn).unwrap().contains("timed out"));
    assert!(host.registry().is_empty());
}

// =========================================================================
// from_config
// =========================================================================

#[test]
fn test_from_config_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.toml");

    let host =
        SessionHost::from_config(&path, NoAuthBackend, MemoryTransport::new())
            .unwrap();

    let settings = host.registry().context().settings();
    assert!(settings.require_authentication);
    assert_eq!(settings.max_players, 10);
}

#[test]
fn test_from_config_reads_settings_and_permissions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.toml");
    std::fs::write(
        &path,
        "max_players = 1\n\n[permissions]\nbanned_identities = [\"9\"]\n",
    )
    .unwrap();

    let host =
        SessionHost::from_config(&path, NoAuthBackend, MemoryTransport::new())
            .unwrap();

    let ctx = host.registry().context();
    assert_eq!(ctx.settings().max_players, 1);
    assert!(ctx.permissions().is_banned(&VerifiedIdentity::new("9")));
}

#[test]
fn test_from_config_malformed_file_is_session_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.toml");
    std::fs::write(&path, "max_players = \"many\"\n").unwrap();

    let result =
        SessionHost::from_config(&path, NoAuthBackend, MemoryTransport::new());

    assert!(matches!(result, Err(WardenError::Session(_))));
}
