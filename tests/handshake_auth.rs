mod common;

use common::pim_hello;
use upbproxy::upb::auth::{expected_response, AuthState, Credentials};
use upbproxy::upb::events::DecodeEvent;
use upbproxy::upb::framing::FramingMode;
use upbproxy::upb::handshake::{parse_pim_hello, PimHello};
use upbproxy::upb::session::{ClientSession, PimSession, SharedHandshake, StreamDecoder};

fn shared() -> SharedHandshake {
    SharedHandshake::new(Some(Credentials {
        username: "upstart".to_string(),
        password: "correct horse".to_string(),
    }))
}

fn auth_results(events: &[DecodeEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            DecodeEvent::AuthResult { success, .. } => Some(*success),
            _ => None,
        })
        .collect()
}

#[test]
fn pim_hello_with_64_hex_digit_challenge() {
    let challenge: Vec<u8> = (0u8..32).collect();
    let frame = pim_hello(&challenge);
    match parse_pim_hello(&frame[..frame.len() - 1]).unwrap() {
        PimHello::Hello { info, challenge: c } => {
            assert_eq!(info.version.major, 5);
            assert_eq!(info.version.minor, 2);
            assert_eq!(info.auth, "AUTH REQUIRED");
            assert_eq!(info.challenge_len, 32);
            assert_eq!(c.unwrap(), challenge);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn correct_response_then_line_mode() {
    let challenge = [0x99u8; 32];
    let shared = shared();
    let mut pim = PimSession::new(shared.clone());
    let mut client = ClientSession::new(shared.clone());

    let events = pim.feed(&pim_hello(&challenge));
    assert!(matches!(events[0], DecodeEvent::HandshakeInfo(_)));
    assert_eq!(shared.auth_state(), AuthState::ChallengeReceived);

    let answer = expected_response("correct horse", &challenge).unwrap();
    let events = client.feed(format!("upstart/{}\0", answer).as_bytes());
    assert_eq!(auth_results(&events), vec![true]);
    assert_eq!(shared.auth_state(), AuthState::Authenticated);

    let events = pim.feed(b"AUTH_SUCCEEDED/192.168.1.20\0");
    assert_eq!(auth_results(&events), vec![true]);
    assert!(shared.authenticated());
    assert!(!shared.wrapped());
    assert_eq!(pim.mode(), FramingMode::LineOriented);

    client.feed(b"");
    assert_eq!(client.mode(), FramingMode::LineOriented);
}

#[test]
fn wrong_password_fails_and_retry_is_stale() {
    let challenge = [0x07u8; 32];
    let shared = shared();
    let mut pim = PimSession::new(shared.clone());
    let mut client = ClientSession::new(shared.clone());
    pim.feed(&pim_hello(&challenge));

    let wrong = expected_response("battery staple", &challenge).unwrap();
    let events = client.feed(format!("upstart/{}\0", wrong).as_bytes());
    assert_eq!(auth_results(&events), vec![false]);
    assert_eq!(shared.auth_state(), AuthState::Failed);
    assert!(!shared.has_challenge());

    // Same challenge, right answer: still refused.
    let right = expected_response("correct horse", &challenge).unwrap();
    let events = client.feed(format!("upstart/{}\0", right).as_bytes());
    match &events[..] {
        [DecodeEvent::ClientHello { .. }, DecodeEvent::AuthResult { success, reason }] => {
            assert!(!success);
            assert!(reason.contains("stale"), "reason was {:?}", reason);
        }
        other => panic!("unexpected {:?}", other),
    }

    let events = pim.feed(b"AUTH_FAILED/192.168.1.20\0");
    assert_eq!(auth_results(&events), vec![false]);
    assert!(!shared.authenticated());
    assert_eq!(pim.mode(), FramingMode::Handshake);
    assert!(pim.info().is_none());
}

#[test]
fn fresh_challenge_allows_retry() {
    let shared = shared();
    let mut pim = PimSession::new(shared.clone());
    let mut client = ClientSession::new(shared.clone());

    pim.feed(&pim_hello(&[0x01; 32]));
    client.feed(b"upstart/00000000000000000000000000000000\0");
    pim.feed(b"AUTH_FAILED/x\0");

    let second = [0x02u8; 32];
    pim.feed(&pim_hello(&second));
    let answer = expected_response("correct horse", &second).unwrap();
    let events = client.feed(format!("upstart/{}\0", answer).as_bytes());
    assert_eq!(auth_results(&events), vec![true]);
}

#[test]
fn refusal_text_is_reported_without_state_change() {
    let shared = shared();
    let mut pim = PimSession::new(shared.clone());
    let events = pim.feed(b"MAX CONNECTIONS REACHED\0");
    assert_eq!(
        events,
        vec![DecodeEvent::UnhandledError {
            message: "MAX CONNECTIONS REACHED".to_string()
        }]
    );
    assert_eq!(shared.auth_state(), AuthState::AwaitingChallenge);
    assert_eq!(shared.auth_required(), None);
}

#[test]
fn unverified_without_credentials() {
    let shared = SharedHandshake::new(None);
    let mut pim = PimSession::new(shared.clone());
    let mut client = ClientSession::new(shared.clone());
    pim.feed(&pim_hello(&[0x11; 32]));
    let events = client.feed(b"upstart/ABCDEF0123\0");
    assert_eq!(
        events,
        vec![DecodeEvent::ClientHello {
            username: "upstart".to_string(),
            wrapped: false
        }]
    );
}
