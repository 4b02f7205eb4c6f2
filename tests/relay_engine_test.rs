//! Tests for the relay engine

use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;

use tinysocks::protocol::{Socks5Request, TargetAddr};
use tinysocks::relay::RelayEngine;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected pair of loopback sockets
async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (connected.unwrap(), accepted.unwrap().0)
}

#[tokio::test]
async fn test_target_connection_establishment() {
    let relay_engine = RelayEngine::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let request = Socks5Request::new(TargetAddr::Ipv4(Ipv4Addr::LOCALHOST), server_addr.port());
    let stream = relay_engine.connect_to_target(&request).await.unwrap();
    assert_eq!(stream.peer_addr().unwrap(), server_addr);
}

#[tokio::test]
async fn test_domain_target_connection() {
    let relay_engine = RelayEngine::new().with_connect_timeout(Some(TEST_TIMEOUT));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let request = Socks5Request::new(TargetAddr::Domain("localhost".to_string()), port);
    assert!(relay_engine.connect_to_target(&request).await.is_ok());
}

#[tokio::test]
async fn test_refused_target_is_an_error() {
    let relay_engine = RelayEngine::new();

    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let request = Socks5Request::new(TargetAddr::Ipv4(Ipv4Addr::LOCALHOST), port);
    let err = relay_engine.connect_to_target(&request).await.unwrap_err();
    assert!(format!("{:#}", err).contains(&format!("127.0.0.1:{}", port)));
}

#[tokio::test]
async fn test_connect_timeout_elapses() {
    // fill the accept queue of a listener that never accepts
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut queued = Vec::new();
    while let Ok(Ok(stream)) = timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
        queued.push(stream);
        assert!(queued.len() < 64, "accept queue never filled");
    }

    let relay_engine = RelayEngine::new().with_connect_timeout(Some(Duration::from_millis(300)));
    let request = Socks5Request::new(TargetAddr::Ipv4(Ipv4Addr::LOCALHOST), addr.port());

    let started = std::time::Instant::now();
    let err = relay_engine.connect_to_target(&request).await.unwrap_err();
    assert!(format!("{:#}", err).contains("timed out"), "unexpected error: {:#}", err);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < TEST_TIMEOUT);

    drop(listener);
}

#[tokio::test]
async fn test_relay_counts_bytes_and_ends_on_client_eof() {
    let relay_engine = RelayEngine::new().with_buffer_size(512);

    let (mut client_peer, client) = socket_pair().await;
    let (target, mut target_peer) = socket_pair().await;

    let relay = tokio::spawn(async move {
        relay_engine.start_relay("relay_test", client, target).await
    });

    client_peer.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    target_peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    target_peer.write_all(b"pong!").await.unwrap();
    let mut buf = [0u8; 5];
    client_peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong!");

    // the client leaving must release the target side even though it stays open
    drop(client_peer);

    let stats = timeout(TEST_TIMEOUT, relay).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.session_id, "relay_test");
    assert_eq!(stats.bytes_up, 4);
    assert_eq!(stats.bytes_down, 5);

    let mut rest = [0u8; 16];
    let read = timeout(TEST_TIMEOUT, target_peer.read(&mut rest)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_relay_ends_on_target_eof() {
    let relay_engine = RelayEngine::new();

    let (mut client_peer, client) = socket_pair().await;
    let (target, mut target_peer) = socket_pair().await;

    let relay = tokio::spawn(async move {
        relay_engine.start_relay("target_eof", client, target).await
    });

    target_peer.write_all(b"goodbye").await.unwrap();
    target_peer.shutdown().await.unwrap();

    let mut received = Vec::new();
    timeout(TEST_TIMEOUT, client_peer.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"goodbye");

    let stats = timeout(TEST_TIMEOUT, relay).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.bytes_down, 7);
    assert_eq!(stats.bytes_up, 0);
}

#[tokio::test]
async fn test_relay_moves_payload_larger_than_buffer() {
    let relay_engine = RelayEngine::new().with_buffer_size(512);

    let (mut client_peer, client) = socket_pair().await;
    let (target, mut target_peer) = socket_pair().await;

    let relay = tokio::spawn(async move {
        relay_engine.start_relay("large", client, target).await
    });

    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();
    let writer = tokio::spawn(async move {
        client_peer.write_all(&payload).await.unwrap();
        client_peer
    });

    let mut received = vec![0u8; expected.len()];
    timeout(TEST_TIMEOUT, target_peer.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, expected);

    drop(writer.await.unwrap());
    let stats = timeout(TEST_TIMEOUT, relay).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.bytes_up, expected.len() as u64);
}
