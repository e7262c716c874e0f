//! End-to-end tests over real QUIC on loopback.

use std::net::SocketAddr;
use std::time::Duration;

use qfetch_client::{ClientOptions, FetchClient};
use qfetch_core::constants::{IDLE_TIMEOUT, SERVER_NAME};
use qfetch_core::identity::cert_hash;
use qfetch_core::logging::init_test_logging;
use qfetch_core::transport::{client_endpoint, server_endpoint, QuicConnection};
use qfetch_core::{provision_identity, Error, TlsIdentity};
use qfetch_server::{
    handle_connection, serve, BaseDir, Dispatcher, FileListener, ServerConfig, ShutdownHandle,
};
use qfetch_test_utils::{fixture_dir, sorted};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct TestServer {
    addr: SocketAddr,
    identity: TlsIdentity,
    shutdown: ShutdownHandle,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.close();
    }
}

async fn start_server(dir: &std::path::Path) -> TestServer {
    start_server_with_idle(dir, IDLE_TIMEOUT).await
}

async fn start_server_with_idle(dir: &std::path::Path, idle_timeout: Duration) -> TestServer {
    init_test_logging();
    let identity = provision_identity().unwrap();
    let config = ServerConfig {
        idle_timeout,
        ..ServerConfig::new(
            BaseDir::new(dir).unwrap(),
            "127.0.0.1:0".parse().unwrap(),
            identity.clone(),
        )
    };

    let listener = FileListener::bind(config).await.unwrap();
    let addr = listener.local_addr();
    let shutdown = listener.shutdown_handle();
    tokio::spawn(listener.run());

    TestServer {
        addr,
        identity,
        shutdown,
    }
}

async fn pinned_client(server: &TestServer) -> FetchClient {
    let options = ClientOptions {
        cert_hash: Some(cert_hash(server.identity.cert_der())),
        ..ClientOptions::default()
    };
    FetchClient::connect(server.addr, options).await.unwrap()
}

#[tokio::test]
async fn list_returns_files_but_not_directories() {
    let tmp = fixture_dir(&[("a.txt", b"A"), ("b.bin", b"\x00\x01")], &["sub"]);
    let server = start_server(tmp.path()).await;
    let client = pinned_client(&server).await;

    let names = tokio::time::timeout(TEST_TIMEOUT, client.list())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(sorted(&names), vec!["a.txt", "b.bin"]);
    client.close().await;
}

#[tokio::test]
async fn list_of_empty_directory_is_empty() {
    let tmp = fixture_dir(&[], &[]);
    let server = start_server(tmp.path()).await;
    let client = pinned_client(&server).await;

    let reply = client.request("ls\n").await.unwrap();

    assert!(reply.is_empty());
    client.close().await;
}

#[tokio::test]
async fn get_returns_exact_bytes() {
    let tmp = fixture_dir(&[("a.txt", b"hello\n")], &[]);
    let server = start_server(tmp.path()).await;
    let client = pinned_client(&server).await;

    let data = client.get("a.txt").await.unwrap();

    assert_eq!(data, b"hello\n");
    client.close().await;
}

#[tokio::test]
async fn get_large_binary_file() {
    let payload: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let tmp = fixture_dir(&[("big.bin", &payload)], &[]);
    let server = start_server(tmp.path()).await;
    let client = pinned_client(&server).await;

    let data = tokio::time::timeout(TEST_TIMEOUT, client.get("big.bin"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(data.len(), payload.len());
    assert_eq!(data, payload);
    client.close().await;
}

#[tokio::test]
async fn get_missing_file_is_one_error_line() {
    let tmp = fixture_dir(&[], &[]);
    let server = start_server(tmp.path()).await;
    let client = pinned_client(&server).await;

    let reply = client.request("get nope.txt\n").await.unwrap();
    let text = String::from_utf8(reply).unwrap();
    assert!(text.starts_with("ERR: open nope.txt: "), "{text}");
    assert!(text.ends_with('\n'));
    assert_eq!(text.matches('\n').count(), 1);

    let err = client.get("nope.txt").await.unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));
    client.close().await;
}

#[tokio::test]
async fn traversal_is_rejected() {
    let outer = fixture_dir(&[("secret.txt", b"top secret")], &["served"]);
    let server = start_server(&outer.path().join("served")).await;
    let client = pinned_client(&server).await;

    let reply = client.request("get ../secret.txt\n").await.unwrap();

    assert_eq!(
        reply,
        b"ERR: path escapes base directory: ../secret.txt\n".to_vec()
    );
    client.close().await;
}

#[tokio::test]
async fn unknown_command_gets_error_line() {
    let tmp = fixture_dir(&[("a.txt", b"A")], &[]);
    let server = start_server(tmp.path()).await;
    let client = pinned_client(&server).await;

    let reply = client.request("delete a.txt\n").await.unwrap();

    assert_eq!(reply, b"ERR: unknown command\n".to_vec());
    assert!(tmp.path().join("a.txt").exists());
    client.close().await;
}

#[tokio::test]
async fn each_request_uses_a_fresh_connection() {
    let tmp = fixture_dir(&[("a.txt", b"A"), ("b.txt", b"B")], &[]);
    let server = start_server(tmp.path()).await;
    let client = pinned_client(&server).await;

    assert_eq!(client.get("a.txt").await.unwrap(), b"A");
    assert_eq!(client.get("b.txt").await.unwrap(), b"B");
    assert_eq!(client.list().await.unwrap().len(), 2);
    client.close().await;
}

#[tokio::test]
async fn fingerprint_matches_server_identity() {
    let tmp = fixture_dir(&[], &[]);
    let server = start_server(tmp.path()).await;

    let client = FetchClient::connect(server.addr, ClientOptions::default())
        .await
        .unwrap();

    assert_eq!(client.server_fingerprint(), server.identity.fingerprint());
    client.close().await;
}

#[tokio::test]
async fn wrong_pin_fails_to_connect() {
    let tmp = fixture_dir(&[], &[]);
    let server = start_server(tmp.path()).await;

    let options = ClientOptions {
        cert_hash: Some(vec![0u8; 32]),
        ..ClientOptions::default()
    };
    let result = FetchClient::connect(server.addr, options).await;

    assert!(matches!(result, Err(Error::Transport { .. })));
}

#[tokio::test]
async fn stalled_connection_does_not_block_others() {
    let tmp = fixture_dir(&[("a.txt", b"A")], &[]);
    let server = start_server(tmp.path()).await;

    // Half a command with no newline: the server keeps waiting on this stream.
    let endpoint = client_endpoint(server.addr, None).unwrap();
    let stalled = endpoint
        .connect(server.addr, SERVER_NAME)
        .unwrap()
        .await
        .unwrap();
    let (mut send, _recv) = stalled.open_bi().await.unwrap();
    send.write_all(b"ge").await.unwrap();

    let client = pinned_client(&server).await;
    let data = tokio::time::timeout(Duration::from_secs(5), client.get("a.txt"))
        .await
        .expect("second client should not wait on the stalled one")
        .unwrap();

    assert_eq!(data, b"A");
    client.close().await;
    stalled.close(0u32.into(), b"done");
}

#[tokio::test]
async fn first_request_after_idle_timeout_redials() {
    let tmp = fixture_dir(&[("a.txt", b"A")], &[]);
    let server = start_server_with_idle(tmp.path(), Duration::from_secs(1)).await;
    let client = pinned_client(&server).await;

    // Outlive the negotiated idle timeout of the connection made by connect().
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(client.get("a.txt").await.unwrap(), b"A");
    assert_eq!(client.get("a.txt").await.unwrap(), b"A");
    client.close().await;
}

#[tokio::test]
async fn serve_answers_requests() {
    init_test_logging();
    let tmp = fixture_dir(&[("a.txt", b"served")], &[]);
    let identity = provision_identity().unwrap();

    // Reserve a free port, then hand it to serve().
    let addr = std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let config = ServerConfig::new(BaseDir::new(tmp.path()).unwrap(), addr, identity.clone());
    let server_task = tokio::spawn(serve(config));

    let options = ClientOptions {
        cert_hash: Some(cert_hash(identity.cert_der())),
        connect_timeout: Duration::from_secs(1),
    };
    let mut client = None;
    for _ in 0..10 {
        match FetchClient::connect(addr, options.clone()).await {
            Ok(c) => {
                client = Some(c);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
    let client = client.expect("serve() should accept connections");

    assert_eq!(client.server_addr(), addr);
    assert_eq!(client.get("a.txt").await.unwrap(), b"served");
    client.close().await;
    server_task.abort();
}

#[tokio::test]
async fn second_stream_on_a_connection_is_never_answered() {
    let tmp = fixture_dir(&[("a.txt", b"A")], &[]);
    let server = start_server(tmp.path()).await;

    let endpoint = client_endpoint(server.addr, None).unwrap();
    let conn = endpoint
        .connect(server.addr, SERVER_NAME)
        .unwrap()
        .await
        .unwrap();

    let (mut send, mut recv) = conn.open_bi().await.unwrap();
    send.write_all(b"ls\n").await.unwrap();
    send.finish().unwrap();
    let first = recv.read_to_end(1 << 16).await.unwrap();
    assert_eq!(first, b"a.txt\n");

    let (mut send, mut recv) = conn.open_bi().await.unwrap();
    send.write_all(b"ls\n").await.unwrap();
    send.finish().unwrap();
    let second = tokio::time::timeout(Duration::from_secs(1), recv.read_to_end(1 << 16)).await;

    assert!(second.is_err(), "second stream got a reply: {second:?}");
    conn.close(0u32.into(), b"done");
}

#[tokio::test]
async fn silent_connection_ends_at_idle_timeout() {
    init_test_logging();
    let tmp = fixture_dir(&[], &[]);
    let dispatcher = Dispatcher::new(BaseDir::new(tmp.path()).unwrap());
    let identity = provision_identity().unwrap();
    let endpoint = server_endpoint(
        &identity,
        "127.0.0.1:0".parse().unwrap(),
        Duration::from_secs(1),
    )
    .unwrap();
    let addr = endpoint.local_addr().unwrap();

    let server_task = tokio::spawn(async move {
        let incoming = endpoint.accept().await.expect("incoming");
        let conn = QuicConnection::new(incoming.await.expect("handshake"));
        handle_connection(&conn, &dispatcher).await
    });

    // Connected, but no stream is ever opened.
    let client = client_endpoint(addr, None).unwrap();
    let conn = client.connect(addr, SERVER_NAME).unwrap().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), server_task)
        .await
        .expect("handler should give up after the idle timeout")
        .unwrap();

    assert_eq!(outcome, None);
    drop(conn);
}
