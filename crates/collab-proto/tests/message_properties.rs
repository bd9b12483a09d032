//! Round-trip properties for the wire message types.

use collab_proto::{ClientMessage, CursorRange, ServerMessage, decode_client_message, decode_server_message, encode_client_message, encode_server_message};
use proptest::prelude::*;

fn arb_step() -> impl Strategy<Value = serde_json::Value> {
    (0i64..1000, ".*").prop_map(|(at, text)| serde_json::json!({"stepType": "insert", "at": at, "text": text}))
}

proptest! {
    #[test]
    fn client_steps_round_trip(
        version in proptest::option::of(0u64..10_000),
        steps in proptest::collection::vec(arb_step(), 0..5),
        from in -100i64..100,
        to in -100i64..100,
    ) {
        let msg = ClientMessage::Steps {
            room_id: "room-1".to_string(),
            client_id: "client-a".to_string(),
            version,
            steps,
            client_selection: Some(CursorRange { from, to }),
        };
        let wire = encode_client_message(&msg);
        let parsed = decode_client_message(&wire).expect("round trip should parse");
        prop_assert_eq!(msg, parsed);
    }

    #[test]
    fn server_steps_round_trip(
        version in 0u64..10_000,
        steps in proptest::collection::vec(arb_step(), 0..5),
    ) {
        let msg = ServerMessage::Steps {
            room_id: "room-1".to_string(),
            client_id: "client-a".to_string(),
            steps,
            version,
        };
        let wire = encode_server_message(&msg);
        let parsed = decode_server_message(&wire).expect("round trip should parse");
        prop_assert_eq!(msg, parsed);
    }
}

#[test]
fn unknown_type_tag_is_malformed_not_panic() {
    let result = decode_client_message(r#"{"type":"not-a-real-type","roomId":"r","clientId":"c"}"#);
    assert!(result.is_err());
}

#[test]
fn non_json_text_is_malformed() {
    let result = decode_server_message("definitely not json");
    assert!(result.is_err());
}
