//! End-to-end tests over a real QUIC transport (§2, §6): a live
//! `collab-server` bound to a loopback port, driven by `collab-client`'s
//! `Connection`, exercising the wire protocol exactly as a real editor
//! client would see it.

use std::time::Duration;

use collab_client::transport::Connection;
use collab_proto::{ClientMessage, ServerMessage};
use collab_server::{Server, ServerRuntimeConfig};
use tokio::time::timeout;

async fn start_server() -> String {
    let server = Server::<collab_core::ot::text_ot::TextDocument>::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..ServerRuntimeConfig::default()
    })
    .await
    .expect("server should bind to an ephemeral loopback port");
    let addr = server.local_addr().expect("bound server has a local address").to_string();
    tokio::spawn(server.run());
    addr
}

async fn join(conn: &mut Connection, room_id: &str, client_id: &str) -> ServerMessage {
    conn.send(&ClientMessage::Join {
        room_id: room_id.to_string(),
        client_id: client_id.to_string(),
        presence: None,
    })
    .await
    .expect("join should send");

    timeout(Duration::from_secs(2), conn.recv())
        .await
        .expect("doc-snapshot should arrive before the timeout")
        .expect("recv should not error")
        .expect("stream should not close before a reply arrives")
}

#[tokio::test]
async fn join_receives_empty_doc_snapshot_at_version_zero() {
    let addr = start_server().await;
    let mut conn = Connection::connect(&addr).await.expect("client should connect");

    let reply = join(&mut conn, "room-1", "a").await;
    match reply {
        ServerMessage::DocSnapshot { version, doc, .. } => {
            assert_eq!(version, 0);
            assert_eq!(doc, serde_json::json!({ "text": "" }));
        },
        other => panic!("expected doc-snapshot, got {other:?}"),
    }

    let presence_snapshot =
        timeout(Duration::from_secs(2), conn.recv()).await.unwrap().unwrap().unwrap();
    assert!(matches!(presence_snapshot, ServerMessage::PresenceSnapshot { .. }));
}

#[tokio::test]
async fn s1_happy_path_steps_broadcast_to_the_other_client_over_real_quic() {
    let addr = start_server().await;
    let mut a = Connection::connect(&addr).await.expect("a should connect");
    let mut b = Connection::connect(&addr).await.expect("b should connect");

    join(&mut a, "room-1", "a").await;
    join(&mut b, "room-1", "b").await;

    // `join` only drains the doc-snapshot; each side still has its own
    // presence-snapshot queued, and `a` additionally has `b`'s join
    // broadcast. Drain all of that before asserting on the messages this
    // test actually cares about.
    let _presence_a = timeout(Duration::from_secs(2), a.recv()).await.unwrap().unwrap().unwrap();
    let _presence_b = timeout(Duration::from_secs(2), b.recv()).await.unwrap().unwrap().unwrap();
    let _b_joined = timeout(Duration::from_secs(2), a.recv()).await.unwrap().unwrap().unwrap();

    a.send(&ClientMessage::Steps {
        room_id: "room-1".to_string(),
        client_id: "a".to_string(),
        version: Some(0),
        steps: vec![serde_json::json!({"stepType": "insert", "at": 0, "text": "x"})],
        client_selection: None,
    })
    .await
    .expect("steps should send");

    let ack = timeout(Duration::from_secs(2), a.recv()).await.unwrap().unwrap().unwrap();
    match ack {
        ServerMessage::Ack { ack_type, ok, version, .. } => {
            assert_eq!(ack_type, collab_proto::AckType::Steps);
            assert!(ok);
            assert_eq!(version, Some(1));
        },
        other => panic!("expected ack, got {other:?}"),
    }

    let forwarded = timeout(Duration::from_secs(2), b.recv()).await.unwrap().unwrap().unwrap();
    match forwarded {
        ServerMessage::Steps { version, steps, .. } => {
            assert_eq!(version, 1);
            assert_eq!(steps.len(), 1);
        },
        other => panic!("expected steps broadcast, got {other:?}"),
    }
}

#[tokio::test]
async fn s2_stale_version_is_rejected_with_error_then_snapshot() {
    let addr = start_server().await;
    let mut a = Connection::connect(&addr).await.expect("a should connect");
    join(&mut a, "room-1", "a").await;

    a.send(&ClientMessage::Steps {
        room_id: "room-1".to_string(),
        client_id: "a".to_string(),
        version: Some(5),
        steps: vec![serde_json::json!({"stepType": "insert", "at": 0, "text": "x"})],
        client_selection: None,
    })
    .await
    .expect("steps should send");

    let error = timeout(Duration::from_secs(2), a.recv()).await.unwrap().unwrap().unwrap();
    match error {
        ServerMessage::Error { code, reason, .. } => {
            assert_eq!(code, collab_proto::error_code::VERSION_MISMATCH);
            assert!(reason.contains("expected 0"));
        },
        other => panic!("expected version_mismatch error, got {other:?}"),
    }

    let snapshot = timeout(Duration::from_secs(2), a.recv()).await.unwrap().unwrap().unwrap();
    assert!(matches!(snapshot, ServerMessage::DocSnapshot { version: 0, .. }));
}
