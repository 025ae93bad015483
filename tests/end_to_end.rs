//! Full-stack integration tests: server accept loop, SRP6 handshake,
//! encrypted application traffic, and the goodbye exchange over real TCP.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use realm_protocol::config::NetworkConfig;
use realm_protocol::error::ProtocolError;
use realm_protocol::service::{Client, Server};
use realm_protocol::store::{CredentialCache, FileUserStore};
use realm_protocol::transport::ManagerEvent;
use tempfile::TempDir;
use tokio::sync::mpsc;

const ECHO_ID: u8 = 0x20;

struct TestServer {
    address: String,
    events: mpsc::UnboundedReceiver<ManagerEvent>,
    shutdown: mpsc::Sender<()>,
    _dir: TempDir,
}

/// Bind a server on an ephemeral port with an echo handler and a fresh
/// temp-dir backed store.
async fn spawn_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let config = NetworkConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:0".into();
        c.cache.snapshot_path = dir
            .path()
            .join("credentials.snapshot")
            .to_string_lossy()
            .into_owned();
    });

    let store = FileUserStore::open(dir.path().join("users.db")).await.unwrap();
    let cache = Arc::new(
        CredentialCache::from_config(Box::new(store), &config.cache)
            .await
            .unwrap(),
    );

    let (server, events) = Server::bind(&config, cache).await.unwrap();
    let address = server.local_addr().unwrap().to_string();

    let manager = Arc::clone(server.manager());
    server
        .manager()
        .register_handler(ECHO_ID, move |connection, frame| {
            let manager = Arc::clone(&manager);
            async move {
                let mut echoed = frame.payload;
                echoed.reverse();
                manager
                    .send_to(
                        connection,
                        realm_protocol::Frame {
                            id: ECHO_ID,
                            payload: echoed,
                            encrypted: false,
                        },
                    )
                    .await
            }
            .boxed()
        })
        .unwrap();

    let (shutdown, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(server.run_with_shutdown(shutdown_rx));

    TestServer {
        address,
        events,
        shutdown,
        _dir: dir,
    }
}

fn client_config(address: &str) -> realm_protocol::config::ClientConfig {
    let mut config = realm_protocol::config::ClientConfig::default();
    config.address = address.to_string();
    config.response_timeout = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn signup_authenticate_and_echo() {
    let mut server = spawn_server().await;
    let config = client_config(&server.address);

    let mut channel = Client::signup_and_connect(&config, "mats", "hunter2")
        .await
        .expect("signup and handshake should succeed");

    // The manager reports the authenticated connection.
    loop {
        match server.events.recv().await.unwrap() {
            ManagerEvent::Authenticated(_) => break,
            ManagerEvent::Disconnected(_) => panic!("disconnected before authenticating"),
            ManagerEvent::ConnectionError { error, .. } => panic!("server error: {error}"),
        }
    }

    channel.send(ECHO_ID, b"attack at dawn").await.unwrap();
    let reply = channel.recv().await.unwrap();
    assert_eq!(reply.id, ECHO_ID);
    assert_eq!(reply.payload, b"nwad ta kcatta");

    channel.goodbye().await.unwrap();
}

#[tokio::test]
async fn reconnect_with_stored_credentials() {
    let server = spawn_server().await;
    let config = client_config(&server.address);

    let channel = Client::signup_and_connect(&config, "ana", "correct horse")
        .await
        .unwrap();
    channel.goodbye().await.unwrap();

    // Second connection authenticates against the stored verifier.
    let mut channel = Client::connect(&config, "ana", "correct horse")
        .await
        .expect("re-authentication should succeed");
    channel.send(ECHO_ID, b"ab").await.unwrap();
    assert_eq!(channel.recv().await.unwrap().payload, b"ba");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let server = spawn_server().await;
    let config = client_config(&server.address);

    let channel = Client::signup_and_connect(&config, "bob", "right").await.unwrap();
    channel.goodbye().await.unwrap();

    let result = Client::connect(&config, "bob", "wrong").await;
    assert!(matches!(result, Err(ProtocolError::AuthenticationFailed)));
}

#[tokio::test]
async fn unknown_user_fails_like_wrong_password() {
    let server = spawn_server().await;
    let config = client_config(&server.address);

    // No signup at all. The failure must be indistinguishable from a bad
    // password.
    let result = Client::connect(&config, "nobody", "whatever").await;
    assert!(matches!(result, Err(ProtocolError::AuthenticationFailed)));
}

#[tokio::test]
async fn concurrent_clients_get_isolated_sessions() {
    let server = spawn_server().await;
    let config = client_config(&server.address);

    let a = Client::signup_and_connect(&config, "alice", "pw-a").await.unwrap();
    let b = Client::signup_and_connect(&config, "bella", "pw-b").await.unwrap();

    // Different users derive different session keys.
    assert_ne!(a.encryption_args().key, b.encryption_args().key);

    let mut handles = Vec::new();
    for (mut channel, word, reversed) in [(a, b"left", b"tfel"), (b, b"tree", b"eert")]
        .map(|(c, w, r)| (c, w.to_vec(), r.to_vec()))
    {
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                channel.send(ECHO_ID, &word).await.unwrap();
                assert_eq!(channel.recv().await.unwrap().payload, reversed);
            }
            channel.goodbye().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn plaintext_frame_on_secure_channel_is_rejected() {
    use futures::{SinkExt, StreamExt};
    use realm_protocol::auth::handshake;
    use realm_protocol::auth::packet::{self, id as auth_id};
    use realm_protocol::core::codec::FrameCodec;
    use realm_protocol::{Frame, UserRecord};
    use tokio_util::codec::Framed;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    // A peer that completes the handshake honestly, then sends an
    // application frame without encrypting it.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec);

        let signup = handshake::signup("dana", "pw");
        let user = UserRecord {
            username: signup.username,
            salt: signup.salt,
            verifier: signup.verifier,
        };

        let frame = framed.next().await.unwrap().unwrap();
        assert_eq!(frame.id, auth_id::CLIENT_INITIAL_AUTH);
        let initial: packet::ClientInitialAuth = packet::from_frame(&frame).unwrap();
        let (state, challenge) = handshake::server_respond(&user, &initial).unwrap();
        framed
            .send(packet::to_frame(auth_id::SERVER_INITIAL_AUTH_RESPONSE, &challenge).unwrap())
            .await
            .unwrap();

        let frame = framed.next().await.unwrap().unwrap();
        let proof: packet::ClientAuthProof = packet::from_frame(&frame).unwrap();
        let (args, reply) = handshake::server_verify(state, &proof).unwrap();
        let envelope = args.envelope().unwrap();
        let body = bincode::serialize(&reply).unwrap();
        framed
            .send(Frame::seal(auth_id::SERVER_AUTH_PROOF, &body, envelope.as_ref()).unwrap())
            .await
            .unwrap();

        framed
            .send(Frame {
                id: ECHO_ID,
                payload: b"injected".to_vec(),
                encrypted: false,
            })
            .await
            .unwrap();

        // Hold the socket open until the client has judged the frame.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let config = client_config(&address);
    let mut channel = Client::connect(&config, "dana", "pw").await.unwrap();

    // The unencrypted frame must never surface as application data.
    let result = channel.recv().await;
    assert!(matches!(result, Err(ProtocolError::HandshakeError(_))));
}

#[tokio::test]
async fn server_shuts_down_gracefully() {
    let server = spawn_server().await;
    let config = client_config(&server.address);

    let channel = Client::signup_and_connect(&config, "carol", "pw").await.unwrap();
    channel.goodbye().await.unwrap();

    server.shutdown.send(()).await.unwrap();
    // The drain loop checks connection counts on a 500ms tick.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    // New connections are refused once the accept loop has stopped.
    let result = Client::connect(&config, "carol", "pw").await;
    assert!(result.is_err());
}
