mod common;

use common::client_line;
use upbproxy::upb::events::DecodeEvent;
use upbproxy::upb::session::{ClientSession, PimSession, SharedHandshake, StreamDecoder};
use upbproxy::upb::types::{CoreCommand, MdidClassification, MdidSet, PimCommand};

fn line_client() -> ClientSession {
    let shared = SharedHandshake::new(None);
    let mut pim = PimSession::new(shared.clone());
    pim.feed(b"PIM/5.2/PU/NO AUTH\0");
    ClientSession::new(shared)
}

#[test]
fn network_transmit_line_decodes_packet() {
    let mut client = line_client();
    // 0x14 "070000010011" + checksum
    let events = client.feed(b"\x14070000010011E7\r");
    assert_eq!(
        events[0],
        DecodeEvent::ClientCommand {
            command: PimCommand::NetworkTransmit,
            payload: vec![0x07, 0x00, 0x00, 0x01, 0x00, 0x11]
        }
    );
    match &events[1] {
        DecodeEvent::Packet(p) => {
            assert_eq!(p.network_id, 0);
            assert_eq!(p.destination_id, 1);
            assert_eq!(p.source_id, 0);
            assert_eq!(p.mdid_set, MdidSet::CoreCommands);
            assert_eq!(
                p.classification,
                MdidClassification::Core(CoreCommand::GetRegisterValues)
            );
            assert!(p.checksum_valid);
        }
        other => panic!("expected packet, got {:?}", other),
    }
}

#[test]
fn register_query_arguments_are_decoded() {
    let mut client = line_client();
    let body = [0x09, 0x00, 0x02, 0x33, 0xFF, 0x11, 0x06, 0x04];
    let events = client.feed(&client_line(0x14, &body));
    let p = events
        .iter()
        .find_map(|e| match e {
            DecodeEvent::Packet(p) => Some(p),
            _ => None,
        })
        .expect("packet");
    let q = p.register_query.expect("register query");
    assert_eq!((q.start, q.count), (0x06, 0x04));
}

#[test]
fn declared_length_mismatch_is_reported() {
    let mut client = line_client();
    // Control word claims 21 bytes; only 7 are present.
    let body = [0x15, 0x00, 0x00, 0x01, 0x00, 0x11];
    let events = client.feed(&client_line(0x14, &body));
    assert_eq!(
        events[1],
        DecodeEvent::LengthMismatch {
            declared: 21,
            actual: 7
        }
    );
}

#[test]
fn pim_write_checksum_verified() {
    let mut client = line_client();
    let good = client_line(0x17, &[0x70, 0x03]);
    assert_eq!(
        client.feed(&good),
        vec![DecodeEvent::ClientCommand {
            command: PimCommand::PimWrite,
            payload: vec![0x70, 0x03]
        }]
    );

    let events = client.feed(b"\x177003FF\r");
    assert_eq!(
        events,
        vec![DecodeEvent::ChecksumMismatch {
            expected: 0x8D,
            got: 0xFF
        }]
    );
}

#[test]
fn unknown_command_byte_is_unparsable() {
    let mut client = line_client();
    let events = client.feed(b"\x19ABCD\r\x120604F6\r");
    assert_eq!(
        events[0],
        DecodeEvent::UnparsableFrame {
            raw: b"\x19ABCD".to_vec()
        }
    );
    assert!(matches!(
        events[1],
        DecodeEvent::ClientCommand {
            command: PimCommand::PimRead,
            ..
        }
    ));
}

#[test]
fn bad_hex_is_unparsable() {
    let mut client = line_client();
    let events = client.feed(b"\x14ZZ0000010011E7\r");
    assert!(matches!(events[0], DecodeEvent::UnparsableFrame { .. }));
}
