//! Acceptor lifecycle tests: binding, statistics and graceful shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use tinysocks::{Config, ConnectionManager};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn test_config() -> Config {
    let mut config = Config::default();
    config.server.bind_addr = "127.0.0.1:0".parse().unwrap();
    config.server.shutdown_timeout = Duration::from_secs(2);
    config
}

#[tokio::test]
async fn test_bind_reports_ephemeral_port() {
    let mut manager = ConnectionManager::new(Arc::new(test_config()));
    assert!(manager.get_bind_addr().is_none());

    let addr = manager.bind().await.unwrap();
    assert_ne!(addr.port(), 0);
    assert_eq!(manager.get_bind_addr(), Some(addr));
    assert_eq!(manager.get_active_connections(), 0);
    assert!(!manager.is_shutting_down());
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let mut first = ConnectionManager::new(Arc::new(test_config()));
    let addr = first.bind().await.unwrap();

    let mut config = test_config();
    config.server.bind_addr = addr;
    let mut second = ConnectionManager::new(Arc::new(config));
    assert!(second.bind().await.is_err());
}

#[tokio::test]
async fn test_shutdown_stops_accept_loop_and_counts_connections() {
    let mut manager = ConnectionManager::new(Arc::new(test_config()));
    let addr = manager.bind().await.unwrap();
    let shutdown = manager.shutdown_coordinator();

    let server = tokio::spawn(async move {
        manager.start().await.unwrap();
        manager
    });

    for _ in 0..3 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    shutdown.trigger();
    let manager = timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    assert!(manager.is_shutting_down());

    timeout(TEST_TIMEOUT, manager.wait_for_connections_to_close())
        .await
        .unwrap()
        .unwrap();

    let stats = manager.get_connection_stats();
    assert_eq!(stats.total_connections_served, 3);
    assert_eq!(stats.active_connections, 0);
}

#[tokio::test]
async fn test_shutdown_closes_idle_sessions() {
    let mut manager = ConnectionManager::new(Arc::new(test_config()));
    let addr = manager.bind().await.unwrap();
    let shutdown = manager.shutdown_coordinator();
    let server = tokio::spawn(async move { manager.start().await });

    // connected but silent, so the session is parked in the handshake read
    let mut idle = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown.trigger();
    timeout(TEST_TIMEOUT, server).await.unwrap().unwrap().unwrap();

    let mut buf = [0u8; 1];
    let read = timeout(TEST_TIMEOUT, idle.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_shutdown_before_start_returns_immediately() {
    let mut manager = ConnectionManager::new(Arc::new(test_config()));
    manager.initiate_shutdown();

    timeout(TEST_TIMEOUT, manager.start()).await.unwrap().unwrap();
    timeout(TEST_TIMEOUT, manager.shutdown()).await.unwrap().unwrap();
    assert_eq!(manager.get_connection_stats().total_connections_served, 0);
}
