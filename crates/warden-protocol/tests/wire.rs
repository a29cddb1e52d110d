//! Wire-format tests: what the JSON actually looks like, and that the
//! server decodes exactly what the client encoded.

use warden_protocol::{
    Challenge, Codec, HandshakeMessage, HandshakeResult, Hello, JsonCodec,
    ProtocolError, Ticket,
};

fn to_json(msg: &HandshakeMessage) -> serde_json::Value {
    let bytes = JsonCodec.encode(msg).expect("encode");
    serde_json::from_slice(&bytes).expect("valid json")
}

#[test]
fn test_ticket_client_encode_server_decode_preserves_fields() {
    let client_side = HandshakeMessage::Ticket(Ticket {
        provider: "p".into(),
        claimed_id: "100".into(),
        ticket_hex: "a1b2".into(),
        nonce: "n1".into(),
    });
    let bytes = JsonCodec.encode(&client_side).unwrap();

    let server_side: HandshakeMessage = JsonCodec.decode(&bytes).unwrap();

    let HandshakeMessage::Ticket(ticket) = server_side else {
        panic!("expected ticket");
    };
    assert_eq!(ticket.provider, "p");
    assert_eq!(ticket.claimed_id, "100");
    assert_eq!(ticket.ticket_hex, "a1b2");
    assert_eq!(ticket.nonce, "n1");
    assert_eq!(ticket.credential_bytes().unwrap(), vec![0xA1, 0xB2]);
}

#[test]
fn test_hello_uses_command_tag_and_camel_case() {
    let json = to_json(&HandshakeMessage::Hello(Hello {
        client_version: "1.2".into(),
    }));

    assert_eq!(json["command"], "hello");
    assert_eq!(json["clientVersion"], "1.2");
}

#[test]
fn test_challenge_field_names() {
    let json = to_json(&HandshakeMessage::Challenge(Challenge {
        provider: "steam".into(),
        server_identity_hint: "srv".into(),
        nonce: "abc".into(),
    }));

    assert_eq!(json["command"], "challenge");
    assert_eq!(json["serverIdentityHint"], "srv");
    assert_eq!(json["nonce"], "abc");
}

#[test]
fn test_result_field_names() {
    let json = to_json(&HandshakeMessage::Result(HandshakeResult {
        success: true,
        message: "ok".into(),
        verified_id: "42".into(),
    }));

    assert_eq!(json["command"], "result");
    assert_eq!(json["success"], true);
    assert_eq!(json["verifiedId"], "42");
}

#[test]
fn test_result_without_verified_id_decodes_empty() {
    let raw = br#"{"command":"result","success":false,"message":"nope"}"#;

    let msg: HandshakeMessage = JsonCodec.decode(raw).unwrap();

    assert_eq!(
        msg,
        HandshakeMessage::Result(HandshakeResult {
            success: false,
            message: "nope".into(),
            verified_id: String::new(),
        })
    );
}

#[test]
fn test_unknown_command_fails_to_decode() {
    let raw = br#"{"command":"teleport","x":1}"#;

    let result: Result<HandshakeMessage, _> = JsonCodec.decode(raw);

    assert!(matches!(result, Err(ProtocolError::Decode(_))));
}

#[test]
fn test_truncated_json_fails_to_decode() {
    let result: Result<HandshakeMessage, _> =
        JsonCodec.decode(br#"{"command":"hello","#);

    assert!(matches!(result, Err(ProtocolError::Decode(_))));
}
