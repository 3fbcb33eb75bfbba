//! Integration tests for qwire-client.
//!
//! A loopback `TcpListener` plays the q server: it answers the handshake,
//! then reads frames and writes replies the way the test scripts it.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use qwire_client::codec::{decode_payload, encode_value};
use qwire_client::protocol::{build_frame, Frame, FrameBuffer};
use qwire_client::{
    Capacity, ConnectOptions, Connection, ConnectionBuilder, Endianness, Message, MessageType,
    QwireError, Table, Value, VectorData,
};

/// Server side of one accepted connection.
struct Peer {
    stream: TcpStream,
    frames: FrameBuffer,
    queued: VecDeque<Frame>,
    /// Bytes the client sent in the handshake.
    handshake: Vec<u8>,
}

impl Peer {
    async fn accept(listener: &TcpListener, server_capacity: u8) -> Peer {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut handshake = Vec::new();
        while !handshake.ends_with(&[0]) {
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed during handshake");
            handshake.extend_from_slice(&buf[..n]);
        }
        stream.write_all(&[server_capacity]).await.unwrap();

        Peer {
            stream,
            frames: FrameBuffer::new(),
            queued: VecDeque::new(),
            handshake,
        }
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.queued.pop_front() {
                return Some(frame);
            }
            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return None;
            }
            self.queued.extend(self.frames.push(&buf[..n]).unwrap());
        }
    }

    async fn next_message(&mut self) -> (MessageType, Value) {
        let frame = self.next_frame().await.expect("client closed");
        let value = decode_payload(frame.payload(), frame.endianness(), Capacity::V3).unwrap();
        (frame.message_type(), value)
    }

    async fn send(&mut self, message_type: MessageType, value: &Value) {
        let payload = encode_value(value, Endianness::Little, Capacity::V3).unwrap();
        let bytes = build_frame(message_type, Endianness::Little, &payload).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    async fn respond(&mut self, value: &Value) {
        self.send(MessageType::Response, value).await;
    }
}

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn test_handshake_and_query() {
    let (listener, addr) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        let (message_type, value) = peer.next_message().await;
        assert_eq!(message_type, MessageType::Sync);
        assert_eq!(value.as_str(), Some("1+1"));
        peer.respond(&Value::from(2i64)).await;
        peer.handshake
    });

    let conn = Connection::builder()
        .auth("user:pass")
        .capacity(Capacity::V6)
        .connect(addr)
        .await
        .unwrap();

    assert_eq!(conn.capacity(), Capacity::V3);
    assert_eq!(conn.query("1+1").await.unwrap(), Value::from(2i64));
    assert_eq!(server.await.unwrap(), b"user:pass\x06\x00");
}

#[tokio::test]
async fn test_rejected_handshake_closes_stream() {
    let (listener, addr) = listen().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0);
        // Reject by closing our side; the client must close its side too.
        stream.shutdown().await.unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        rest
    });

    let result = Connection::connect(addr, "bad:creds").await;

    assert!(matches!(result, Err(QwireError::Authentication(_))));
    assert!(server.await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_error_keeps_connection_usable() {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        peer.next_message().await;
        peer.respond(&Value::Error("type".into())).await;
        peer.next_message().await;
        peer.respond(&Value::from(42i64)).await;
    });

    let conn = Connection::connect(addr, "").await.unwrap();

    match conn.query("`a+1").await {
        Err(QwireError::Remote(msg)) => assert_eq!(msg, "type"),
        other => panic!("expected remote error, got {:?}", other),
    }
    assert!(!conn.is_closed());
    assert_eq!(conn.query("42").await.unwrap(), Value::from(42i64));
}

#[tokio::test]
async fn test_async_message_during_pending_call() {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        peer.next_message().await;
        peer.send(MessageType::Async, &Value::symbol("upd")).await;
        peer.respond(&Value::from(true)).await;
        peer.send(MessageType::Response, &Value::symbol("stray")).await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = Connection::builder()
        .on_async(move |msg: Message| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
            }
        })
        .connect(addr)
        .await
        .unwrap();

    assert_eq!(conn.query(".u.sub[`;`]").await.unwrap(), Value::from(true));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.message_type, MessageType::Async);
    assert_eq!(first.value, Value::symbol("upd"));

    // A response nobody waits for also reaches the handler.
    let second = rx.recv().await.unwrap();
    assert_eq!(second.message_type, MessageType::Response);
    assert_eq!(second.value, Value::symbol("stray"));
}

#[tokio::test]
async fn test_concurrent_calls_are_serialized() {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        for _ in 0..10 {
            let (_, value) = peer.next_message().await;
            let n = match value {
                Value::Atom(qwire_client::Atom::Long(n)) => n,
                other => panic!("unexpected request {:?}", other),
            };
            // Nothing else may arrive before this call is answered.
            assert!(peer.queued.is_empty());
            tokio::time::sleep(Duration::from_millis(2)).await;
            peer.respond(&Value::from(n + 100)).await;
        }
    });

    let conn = Arc::new(Connection::connect(addr, "").await.unwrap());

    let mut calls = Vec::new();
    for i in 0..10i64 {
        let conn = conn.clone();
        calls.push(tokio::spawn(async move {
            (i, conn.call(&Value::from(i)).await.unwrap())
        }));
    }

    for call in calls {
        let (i, result) = call.await.unwrap();
        assert_eq!(result, Value::from(i + 100));
    }
}

#[tokio::test]
async fn test_timed_out_call_discards_late_response() {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        peer.next_message().await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        peer.respond(&Value::symbol("late")).await;
        peer.next_message().await;
        peer.respond(&Value::symbol("fresh")).await;
    });

    let conn = Connection::builder()
        .call_timeout(Duration::from_millis(30))
        .connect(addr)
        .await
        .unwrap();

    assert!(matches!(conn.query("slow[]").await, Err(QwireError::Timeout)));
    assert!(!conn.is_closed());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(conn.query("fast[]").await.unwrap(), Value::symbol("fresh"));
}

#[tokio::test]
async fn test_protocol_error_poisons_connection() {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        peer.next_message().await;
        // Reserved byte 2 set.
        peer.stream
            .write_all(&[1, 2, 1, 0, 9, 0, 0, 0, 0xFF])
            .await
            .unwrap();
        // Hold the socket open until the client is done.
        let _ = peer.next_frame().await;
    });

    let conn = Connection::connect(addr, "").await.unwrap();

    assert!(matches!(conn.query("x").await, Err(QwireError::Protocol(_))));
    assert!(conn.is_closed());
    match conn.query("x").await {
        Err(QwireError::ConnectionLost(reason)) => assert!(reason.contains("Reserved")),
        other => panic!("expected ConnectionLost, got {:?}", other),
    }
    assert!(matches!(
        conn.send_async(&Value::IDENTITY).await,
        Err(QwireError::ConnectionLost(_))
    ));
}

#[tokio::test]
async fn test_server_close_fails_pending_call() {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        peer.next_message().await;
        drop(peer);
    });

    let conn = Connection::connect(addr, "").await.unwrap();

    assert!(matches!(conn.query("exit 0").await, Err(QwireError::ConnectionClosed)));
    assert!(matches!(conn.query("1").await, Err(QwireError::ConnectionLost(_))));
}

#[tokio::test]
async fn test_close_is_idempotent_and_flushes() {
    let (listener, addr) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        let (message_type, value) = peer.next_message().await;
        assert_eq!(message_type, MessageType::Async);
        assert_eq!(value, Value::string("a:1"));
        // EOF after the queued frame.
        peer.next_frame().await.is_none()
    });

    let conn = Connection::connect(addr, "").await.unwrap();
    conn.send_async(&Value::string("a:1")).await.unwrap();
    conn.close();
    conn.close();

    assert!(conn.is_closed());
    assert!(matches!(conn.query("a").await, Err(QwireError::ConnectionClosed)));
    assert!(server.await.unwrap());
}

#[tokio::test]
async fn test_big_endian_client_and_table_echo() {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        let mut peer = Peer::accept(&listener, 3).await;
        let frame = peer.next_frame().await.unwrap();
        assert_eq!(frame.endianness(), Endianness::Big);
        let value = decode_payload(frame.payload(), frame.endianness(), Capacity::V3).unwrap();
        peer.respond(&value).await;
    });

    let table = Table::new(
        vec!["sym".into(), "px".into()],
        vec![
            VectorData::Symbol(vec!["ibm".into(), "msft".into()]).into(),
            VectorData::Float(vec![101.5, 33.25]).into(),
        ],
    )
    .unwrap();

    let conn = Connection::builder()
        .endianness(Endianness::Big)
        .connect(addr)
        .await
        .unwrap();

    let echoed = conn.call(&table.clone().into()).await.unwrap();
    let echoed = echoed.as_table().unwrap();
    assert_eq!(echoed, &table);
    assert_eq!(echoed.num_rows(), 2);
}

#[tokio::test]
async fn test_connect_from_json_options() {
    let (listener, addr) = listen().await;

    let server = tokio::spawn(async move {
        let peer = Peer::accept(&listener, 5).await;
        peer.handshake
    });

    let options: ConnectOptions =
        serde_json::from_str(r#"{"auth": "svc", "capacity": 5}"#).unwrap();
    let conn = ConnectionBuilder::from_options(options)
        .connect(addr)
        .await
        .unwrap();

    assert_eq!(conn.capacity(), Capacity::V5);
    assert_eq!(server.await.unwrap(), b"svc\x05\x00");
}
