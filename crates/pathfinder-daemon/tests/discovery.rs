//! End-to-end tests driving the daemon over real loopback TCP connections.

use pathfinder_core::{Command, Config, FailReason, MatchType, NotifyPayload, Props, Request, Response, ResponseBody};
use pathfinder_daemon::serve;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (r, w) = stream.into_split();
        Self { reader: BufReader::new(r), writer: w }
    }

    async fn send(&mut self, request: &Request) {
        let mut line = serde_json::to_string(request).unwrap();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Response {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(line.trim_end()).unwrap()
    }

    async fn hello(&mut self) -> u64 {
        self.send(&Request { ta_id: 0, command: Command::Hello { min_version: 1, max_version: 1 } }).await;
        match self.recv().await.body {
            ResponseBody::Accept { client_id, .. } => client_id.unwrap(),
            other => panic!("expected accept, got {other:?}"),
        }
    }
}

async fn spawn_test_server() -> (std::net::SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = serve(listener, Config::default(), server_cancel).await;
    });
    (addr, cancel)
}

fn props(pairs: &[(&str, &str)]) -> Props {
    let mut p = Props::new();
    for (k, v) in pairs {
        p.insert(*k, *v);
    }
    p
}

#[tokio::test]
async fn publish_and_services_round_trip() {
    let (addr, _cancel) = spawn_test_server().await;
    let mut client = TestClient::connect(addr).await;
    client.hello().await;

    client
        .send(&Request {
            ta_id: 1,
            command: Command::Publish {
                service_id: 42,
                generation: 1,
                props: props(&[("name", "widget")]),
                ttl: 60,
            },
        })
        .await;
    assert!(matches!(client.recv().await.body, ResponseBody::Complete));

    client.send(&Request { ta_id: 2, command: Command::Services { filter: None } }).await;
    let row = client.recv().await;
    match row.body {
        ResponseBody::Notify(NotifyPayload::Service { service_id, .. }) => assert_eq!(service_id, 42),
        other => panic!("expected a service row, got {other:?}"),
    }
    assert!(matches!(client.recv().await.body, ResponseBody::Complete));
}

#[tokio::test]
async fn subscriber_receives_appeared_and_disappeared() {
    let (addr, _cancel) = spawn_test_server().await;

    let mut publisher = TestClient::connect(addr).await;
    publisher.hello().await;

    let mut subscriber = TestClient::connect(addr).await;
    subscriber.hello().await;
    subscriber
        .send(&Request {
            ta_id: 1,
            command: Command::Subscribe { subscription_id: 1, filter: "(name=widget)".to_string() },
        })
        .await;
    assert!(matches!(subscriber.recv().await.body, ResponseBody::Accept { .. }));

    publisher
        .send(&Request {
            ta_id: 2,
            command: Command::Publish {
                service_id: 7,
                generation: 1,
                props: props(&[("name", "widget")]),
                ttl: 60,
            },
        })
        .await;
    assert!(matches!(publisher.recv().await.body, ResponseBody::Complete));

    let notify = subscriber.recv().await;
    match notify.body {
        ResponseBody::Notify(NotifyPayload::ServiceChange { match_type, service_id, .. }) => {
            assert_eq!(match_type, MatchType::Appeared);
            assert_eq!(service_id, 7);
        }
        other => panic!("expected an appeared notification, got {other:?}"),
    }

    publisher.send(&Request { ta_id: 3, command: Command::Unpublish { service_id: 7 } }).await;
    assert!(matches!(publisher.recv().await.body, ResponseBody::Complete));

    let notify = subscriber.recv().await;
    match notify.body {
        ResponseBody::Notify(NotifyPayload::ServiceChange { match_type, service_id, .. }) => {
            assert_eq!(match_type, MatchType::Disappeared);
            assert_eq!(service_id, 7);
        }
        other => panic!("expected a disappeared notification, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_over_existing_catalogue_reports_appeared_before_accept() {
    let (addr, _cancel) = spawn_test_server().await;

    let mut publisher = TestClient::connect(addr).await;
    publisher.hello().await;
    publisher
        .send(&Request {
            ta_id: 1,
            command: Command::Publish {
                service_id: 9,
                generation: 1,
                props: props(&[("name", "widget")]),
                ttl: 60,
            },
        })
        .await;
    assert!(matches!(publisher.recv().await.body, ResponseBody::Complete));

    let mut subscriber = TestClient::connect(addr).await;
    subscriber.hello().await;
    subscriber
        .send(&Request {
            ta_id: 1,
            command: Command::Subscribe { subscription_id: 1, filter: "(name=widget)".to_string() },
        })
        .await;

    // The service already matches, so its "appeared" must arrive on the
    // wire before the subscribe transaction is accepted.
    let first = subscriber.recv().await;
    match first.body {
        ResponseBody::Notify(NotifyPayload::ServiceChange { match_type, service_id, .. }) => {
            assert_eq!(match_type, MatchType::Appeared);
            assert_eq!(service_id, 9);
        }
        other => panic!("expected an appeared notification before accept, got {other:?}"),
    }
    assert!(matches!(subscriber.recv().await.body, ResponseBody::Accept { .. }));
}

#[tokio::test]
async fn commands_before_hello_are_rejected() {
    let (addr, _cancel) = spawn_test_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send(&Request { ta_id: 1, command: Command::Ping }).await;
    match client.recv().await.body {
        ResponseBody::Fail { fail_reason } => assert_eq!(fail_reason, FailReason::NoHello),
        other => panic!("expected fail(no-hello), got {other:?}"),
    }
}

#[tokio::test]
async fn publishing_someone_elses_service_is_permission_denied() {
    let (addr, _cancel) = spawn_test_server().await;

    let mut owner = TestClient::connect(addr).await;
    owner.hello().await;
    owner
        .send(&Request {
            ta_id: 1,
            command: Command::Publish { service_id: 1, generation: 1, props: Props::new(), ttl: 60 },
        })
        .await;
    assert!(matches!(owner.recv().await.body, ResponseBody::Complete));

    let mut intruder = TestClient::connect(addr).await;
    intruder.hello().await;
    intruder
        .send(&Request {
            ta_id: 1,
            command: Command::Publish { service_id: 1, generation: 2, props: Props::new(), ttl: 60 },
        })
        .await;
    match intruder.recv().await.body {
        ResponseBody::Fail { fail_reason } => assert_eq!(fail_reason, FailReason::PermissionDenied),
        other => panic!("expected fail(permission-denied), got {other:?}"),
    }
}

#[tokio::test]
async fn repeat_hello_on_greeted_session_is_rejected() {
    let (addr, _cancel) = spawn_test_server().await;
    let mut client = TestClient::connect(addr).await;
    client.hello().await;

    client
        .send(&Request { ta_id: 1, command: Command::Hello { min_version: 1, max_version: 1 } })
        .await;
    match client.recv().await.body {
        ResponseBody::Fail { fail_reason } => assert_eq!(fail_reason, FailReason::ClientIdExists),
        other => panic!("expected fail(client-id-exists), got {other:?}"),
    }
}

#[tokio::test]
async fn unsupported_protocol_version_is_rejected() {
    let (addr, _cancel) = spawn_test_server().await;
    let mut client = TestClient::connect(addr).await;
    client
        .send(&Request { ta_id: 0, command: Command::Hello { min_version: 99, max_version: 100 } })
        .await;
    match client.recv().await.body {
        ResponseBody::Fail { fail_reason } => assert_eq!(fail_reason, FailReason::UnsupportedProtocolVersion),
        other => panic!("expected fail(unsupported-protocol-version), got {other:?}"),
    }
}
