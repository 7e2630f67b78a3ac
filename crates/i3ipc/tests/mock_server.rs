//! End-to-end tests against a mock i3 listening on a Unix socket.

use std::path::PathBuf;
use std::time::Duration;

use i3ipc::protocol::{self, EVENT_BIT, HEADER_SIZE};
use i3ipc::{Connection, EventKind, I3Error, Reply, RetryPolicy};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing_subscriber::EnvFilter;

/// Route client logs to the test output. Set `RUST_LOG=i3ipc=trace` to see frames.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

struct MockI3 {
    _dir: TempDir,
    socket_path: PathBuf,
    listener: UnixListener,
}

impl MockI3 {
    fn bind() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("ipc-socket");
        let listener = UnixListener::bind(&socket_path).unwrap();
        Self {
            _dir: dir,
            socket_path,
            listener,
        }
    }

    async fn accept(&self) -> UnixStream {
        tokio::time::timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .expect("client never connected")
            .unwrap()
            .0
    }
}

async fn read_message(stream: &mut UnixStream) -> (u32, String) {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(&header[..6], b"i3-ipc");

    let length = u32::from_le_bytes(header[6..10].try_into().unwrap()) as usize;
    let message_type = u32::from_le_bytes(header[10..14].try_into().unwrap());
    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload).await.unwrap();

    (message_type, String::from_utf8(payload).unwrap())
}

async fn write_message(stream: &mut UnixStream, message_type: u32, payload: &str) {
    let frame = protocol::pack(message_type, payload.as_bytes()).unwrap();
    stream.write_all(&frame).await.unwrap();
}

#[tokio::test]
async fn test_command_round_trip() {
    let mock = MockI3::bind();
    let mut connection = Connection::open(&mock.socket_path).await.unwrap();
    let mut server = mock.accept().await;

    let server_task = tokio::spawn(async move {
        let (message_type, payload) = read_message(&mut server).await;
        assert_eq!(message_type, 0);
        assert_eq!(payload, "focus left");
        write_message(&mut server, 0, r#"{"success":true}"#).await;

        let (_, payload) = read_message(&mut server).await;
        assert_eq!(payload, "bogus");
        write_message(&mut server, 0, r#"{"success":false,"error":"wrong command"}"#).await;
    });

    let reply = connection.command("focus left").await.unwrap();
    assert!(reply.is_successful());

    let reply = connection.command("bogus").await.unwrap();
    assert!(!reply.is_successful());
    assert_eq!(reply.get("error").unwrap(), "wrong command");

    server_task.await.unwrap();
}

#[tokio::test]
async fn test_connect_twice_dials_once() {
    let mock = MockI3::bind();
    let mut connection = Connection::new(&mock.socket_path);

    connection.connect().await.unwrap();
    connection.connect().await.unwrap();
    let _server = mock.accept().await;

    let second = tokio::time::timeout(Duration::from_millis(200), mock.listener.accept()).await;
    assert!(second.is_err(), "a second channel was opened");
}

#[tokio::test]
async fn test_disconnect_closes_channel_and_reconnect_dials_again() {
    let mock = MockI3::bind();
    let mut connection = Connection::open(&mock.socket_path).await.unwrap();
    let mut first = mock.accept().await;

    connection.disconnect().await;
    connection.disconnect().await;
    assert!(!connection.is_connected());

    let mut rest = Vec::new();
    assert_eq!(first.read_to_end(&mut rest).await.unwrap(), 0);

    connection.connect().await.unwrap();
    let _second = mock.accept().await;
    assert!(connection.is_connected());
}

#[tokio::test]
async fn test_foreign_magic_rejected() {
    let mock = MockI3::bind();
    let mut connection = Connection::open(&mock.socket_path).await.unwrap();
    let mut server = mock.accept().await;

    let server_task = tokio::spawn(async move {
        read_message(&mut server).await;
        let mut raw = b"i4-ipc".to_vec();
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend_from_slice(&7u32.to_le_bytes());
        raw.extend_from_slice(b"{}");
        server.write_all(&raw).await.unwrap();
        server
    });

    match connection.version().await {
        Err(I3Error::WrongMagicString { magic }) => assert_eq!(magic, "i4-ipc"),
        other => panic!("Expected WrongMagicString, got: {:?}", other),
    }
    server_task.await.unwrap();
}

#[tokio::test]
async fn test_subscription_over_socket() {
    let mock = MockI3::bind();
    let mut connection = Connection::open(&mock.socket_path).await.unwrap();
    let mut server = mock.accept().await;

    let server_task = tokio::spawn(async move {
        let (message_type, payload) = read_message(&mut server).await;
        assert_eq!(message_type, 2);
        assert_eq!(payload, r#"["workspace"]"#);
        write_message(&mut server, 2, r#"{"success":true}"#).await;

        write_message(&mut server, EVENT_BIT, r#"{"change":"focus","current":{"num":2}}"#).await;
        write_message(&mut server, EVENT_BIT, r#"{"change":"empty"}"#).await;
    });

    let (subscription, mut events) = connection.subscribe_channel("workspace").await.unwrap();
    assert_eq!(subscription.event(), EventKind::Workspace);

    let event: Reply = events.recv().await.unwrap();
    assert_eq!(event["change"], "focus");
    assert_eq!(event["current"]["num"].as_i64(), Some(2));
    assert_eq!(events.recv().await.unwrap()["change"], "empty");

    server_task.await.unwrap();
    // Server end dropped: the listener sees EOF and ends cleanly
    tokio::time::timeout(Duration::from_secs(5), subscription.join())
        .await
        .expect("listener did not end")
        .unwrap();
}

#[tokio::test]
async fn test_connect_with_retry_to_missing_socket() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut connection = Connection::new(dir.path().join("absent")).with_retry_policy(RetryPolicy {
        max_retries: 0,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    });

    match connection.connect_with_retry().await {
        Err(I3Error::MaxRetriesExceeded { attempts }) => assert_eq!(attempts, 1),
        other => panic!("Expected MaxRetriesExceeded, got: {:?}", other),
    }
}
