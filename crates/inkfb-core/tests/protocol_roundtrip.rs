//! Integration tests for the inkfb-core protocol codec.
//!
//! These tests verify complete round-trip encoding and decoding of every
//! message type through the public API, plus the notification framing the
//! launcher channel shares with the surface channel.

use inkfb_core::protocol::framing::{
    decode_frame, encode_frame, SYSTEM_LOST_COORDINATOR, SYSTEM_NEW_COORDINATOR, SYSTEM_TERMINATE,
};
use inkfb_core::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ClientMessage, InputKind, PixelFormat, ServerMessage, UserInput, MAX_MESSAGE_SIZE,
};

fn roundtrip_client(msg: ClientMessage) -> ClientMessage {
    let bytes = encode_client_message(&msg);
    assert!(bytes.len() <= MAX_MESSAGE_SIZE, "message exceeds the packet bound");
    decode_client_message(&bytes).expect("decode must succeed")
}

fn roundtrip_server(msg: ServerMessage) -> ServerMessage {
    let bytes = encode_server_message(&msg);
    assert!(bytes.len() <= MAX_MESSAGE_SIZE, "message exceeds the packet bound");
    decode_server_message(&bytes).expect("decode must succeed")
}

#[test]
fn test_roundtrip_initialize() {
    let original = ClientMessage::Initialize {
        key: 245209899,
        format: PixelFormat::Rgb565,
    };
    assert_eq!(original, roundtrip_client(original));
}

#[test]
fn test_roundtrip_initialize_custom() {
    let original = ClientMessage::InitializeCustom {
        key: 7,
        format: PixelFormat::Rgba8888,
        width: 954,
        height: 1696,
    };
    assert_eq!(original, roundtrip_client(original));
}

#[test]
fn test_roundtrip_updates_and_terminate() {
    assert_eq!(ClientMessage::UpdateAll, roundtrip_client(ClientMessage::UpdateAll));
    assert_eq!(ClientMessage::Terminate, roundtrip_client(ClientMessage::Terminate));

    let partial = ClientMessage::UpdatePartial {
        x: 10,
        y: 20,
        w: 100,
        h: 50,
    };
    assert_eq!(partial, roundtrip_client(partial));
}

#[test]
fn test_roundtrip_negative_rectangle_coordinates() {
    // Legacy clients occasionally signal clipped rectangles with negative
    // origins; the codec must carry them unchanged.
    let partial = ClientMessage::UpdatePartial {
        x: -4,
        y: -2,
        w: 1404,
        h: 1872,
    };
    assert_eq!(partial, roundtrip_client(partial));
}

#[test]
fn test_roundtrip_init_ok() {
    let original = ServerMessage::InitOk {
        shm_id: 0x5A5A5A5,
        shm_size: 1404 * 1872 * 2,
    };
    assert_eq!(original, roundtrip_server(original));
}

#[test]
fn test_roundtrip_every_user_input_kind() {
    for kind in [
        InputKind::TouchPress,
        InputKind::TouchRelease,
        InputKind::TouchUpdate,
        InputKind::PenPress,
        InputKind::PenRelease,
        InputKind::PenUpdate,
        InputKind::ButtonPress,
        InputKind::ButtonRelease,
    ] {
        let original = ServerMessage::UserInput(UserInput {
            kind,
            device_id: 1,
            x: 702,
            y: 936,
            pressure: 73,
        });
        assert_eq!(original, roundtrip_server(original));
    }
}

#[test]
fn test_client_and_server_channels_do_not_overlap() {
    let inbound = encode_client_message(&ClientMessage::UpdateAll);
    assert!(decode_server_message(&inbound).is_err());

    let outbound = encode_server_message(&ServerMessage::InitOk {
        shm_id: 1,
        shm_size: 2,
    });
    assert!(decode_client_message(&outbound).is_err());
}

#[test]
fn test_system_notification_frames_roundtrip() {
    for (ty, payload) in [
        (SYSTEM_TERMINATE, &b"close"[..]),
        (SYSTEM_NEW_COORDINATOR, b"1"),
        (SYSTEM_LOST_COORDINATOR, b"0"),
    ] {
        let bytes = encode_frame(ty, payload).unwrap();
        let (frame, consumed) = decode_frame(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(frame.frame_type, ty);
        assert_eq!(frame.payload, payload);
    }
}
