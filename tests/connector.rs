//! End-to-end tests: a connector against an in-process WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use execlink::retry::ReconnectPolicy;
use execlink::session::SessionConfig;
use execlink::transport::{DialRequest, Dialer, WsDialer, stream_url};
use execlink::{Connector, Event, EventReceiver, Phase, SecretString};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

const WAIT: Duration = Duration::from_secs(5);
const INTERVAL: Duration = Duration::from_millis(50);

/// One accepted client, with what it sent during the handshake.
struct Accepted {
    ws: WebSocketStream<TcpStream>,
    uri: String,
    authorization: Option<String>,
}

struct TestServer {
    addr: SocketAddr,
    accepted: mpsc::UnboundedReceiver<Accepted>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, accepted) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let mut uri = String::new();
                let mut authorization = None;
                let handshake = tokio_tungstenite::accept_hdr_async(
                    tcp,
                    |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        uri = req.uri().to_string();
                        authorization = req
                            .headers()
                            .get(AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        Ok(resp)
                    },
                )
                .await;
                if let Ok(ws) = handshake {
                    let _ = tx.send(Accepted {
                        ws,
                        uri,
                        authorization,
                    });
                }
            }
        });

        Self { addr, accepted }
    }

    async fn next_client(&mut self) -> Accepted {
        timeout(WAIT, self.accepted.recv())
            .await
            .expect("no client connected in time")
            .expect("server stopped")
    }

    fn connector(&self, token: Option<&str>) -> (Connector, EventReceiver) {
        let config = SessionConfig {
            url: stream_url(&format!("http://{}", self.addr), "itest").unwrap(),
            policy: ReconnectPolicy::new(2, INTERVAL),
            bearer_token: token.and_then(SecretString::non_empty),
        };
        Connector::from_session_config(config, Arc::new(WsDialer))
    }
}

fn progress(value: i64) -> String {
    format!(r#"{{"type":"progress","data":{{"value":{value},"max":100}}}}"#)
}

async fn next_event(events: &mut EventReceiver) -> Event {
    timeout(WAIT, events.recv())
        .await
        .expect("no event in time")
        .expect("queue closed")
}

async fn wait_for_phase(connector: &Connector, phase: Phase) {
    timeout(WAIT, async {
        while connector.phase() != phase {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("phase not reached in time");
}

#[tokio::test]
async fn test_dials_stream_endpoint_with_client_id() {
    let mut server = TestServer::start().await;
    let (connector, _events) = server.connector(None);
    connector.start().unwrap();

    let client = server.next_client().await;
    assert_eq!(client.uri, "/ws?clientId=itest");
    assert!(connector.wait_until_connected(WAIT).await.unwrap());

    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_events_arrive_in_wire_order() {
    let mut server = TestServer::start().await;
    let (connector, mut events) = server.connector(None);
    connector.start().unwrap();
    let mut client = server.next_client().await;

    for i in 0..20 {
        client.ws.send(Message::text(progress(i))).await.unwrap();
    }
    client
        .ws
        .send(Message::text(r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":4}},"sid":"abc"}}"#))
        .await
        .unwrap();

    for i in 0..20 {
        match next_event(&mut events).await {
            Event::Progress(p) => assert_eq!((p.value, p.max), (i, 100)),
            other => panic!("unexpected {other:?}"),
        }
    }
    match next_event(&mut events).await {
        Event::Status(s) => {
            assert_eq!(s.queue_remaining(), 4);
            assert_eq!(s.session_id(), Some("abc"));
        }
        other => panic!("unexpected {other:?}"),
    }

    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_bad_frames_are_dropped_without_disconnecting() {
    let mut server = TestServer::start().await;
    let (connector, mut events) = server.connector(None);
    connector.start().unwrap();
    let mut client = server.next_client().await;

    client.ws.send(Message::text("not json")).await.unwrap();
    client.ws.send(Message::text(r#"{"data":{}}"#)).await.unwrap();
    client.ws.send(Message::binary(vec![0xff, 0xd8, 0xff])).await.unwrap();
    client
        .ws
        .send(Message::binary(progress(3).into_bytes()))
        .await
        .unwrap();
    client
        .ws
        .send(Message::text(r#"{"type":"crystools.monitor","data":{"cpu":12}}"#))
        .await
        .unwrap();

    match next_event(&mut events).await {
        Event::Progress(p) => assert_eq!(p.value, 3),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        next_event(&mut events).await,
        Event::Unknown {
            tag: "crystools.monitor".into()
        }
    );
    assert!(connector.is_connected());

    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_bearer_header_only_when_configured() {
    let mut server = TestServer::start().await;

    let (with_token, _events) = server.connector(Some("s3cret"));
    with_token.start().unwrap();
    let client = server.next_client().await;
    assert_eq!(client.authorization.as_deref(), Some("Bearer s3cret"));
    with_token.close().await.unwrap();

    let (without_token, _events) = server.connector(None);
    without_token.start().unwrap();
    let client = server.next_client().await;
    assert_eq!(client.authorization, None);
    without_token.close().await.unwrap();
}

#[tokio::test]
async fn test_reconnects_after_server_drops_connection() {
    let mut server = TestServer::start().await;
    let (connector, mut events) = server.connector(Some("first"));
    connector.start().unwrap();

    let mut client = server.next_client().await;
    client.ws.send(Message::text(progress(1))).await.unwrap();
    assert!(matches!(next_event(&mut events).await, Event::Progress(p) if p.value == 1));

    connector
        .set_bearer_token(SecretString::non_empty("second"))
        .await
        .unwrap();
    client.ws.close(None).await.unwrap();
    drop(client);

    let mut client = server.next_client().await;
    assert_eq!(client.authorization.as_deref(), Some("Bearer second"));
    assert!(connector.wait_until_connected(WAIT).await.unwrap());

    client.ws.send(Message::text(progress(2))).await.unwrap();
    assert!(matches!(next_event(&mut events).await, Event::Progress(p) if p.value == 2));

    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_close_sends_close_frame_and_stops() {
    let mut server = TestServer::start().await;
    let (connector, events) = server.connector(None);
    connector.start().unwrap();
    let mut client = server.next_client().await;
    assert!(connector.wait_until_connected(WAIT).await.unwrap());

    connector.close().await.unwrap();
    assert_eq!(connector.phase(), Phase::Closed);

    let next = timeout(WAIT, client.ws.next()).await.unwrap();
    assert!(matches!(next, Some(Ok(Message::Close(_))) | None));

    tokio::time::sleep(INTERVAL * 3).await;
    assert!(server.accepted.try_recv().is_err());
    assert!(matches!(connector.start(), Err(execlink::Error::Closed)));

    drop(connector);
    let mut events = events;
    assert!(timeout(WAIT, events.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_retries_until_server_comes_up() {
    // Reserve a port, then release it so the first dials are refused.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let config = SessionConfig {
        url: stream_url(&format!("http://{addr}"), "itest").unwrap(),
        policy: ReconnectPolicy::new(1, INTERVAL),
        bearer_token: None,
    };
    let (connector, _events) = Connector::from_session_config(config, Arc::new(WsDialer));
    connector.start().unwrap();

    tokio::time::sleep(INTERVAL * 3).await;
    assert!(!connector.is_connected());
    assert_eq!(connector.phase(), Phase::Connecting);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        // Port was taken in the meantime; nothing left to check.
        Err(_) => return connector.close().await.unwrap(),
    };
    let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

    assert!(connector.wait_until_connected(WAIT).await.unwrap());
    wait_for_phase(&connector, Phase::Connected).await;
    connector.close().await.unwrap();
}

/// Plain TCP listener that drops every connection, counting accepts.
async fn refusing_tls_peer() -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicU32::new(0));
    let counter = accepts.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(tcp);
        }
    });
    (addr, accepts)
}

#[tokio::test]
async fn test_wss_dial_returns_error_instead_of_panicking() {
    let (addr, _accepts) = refusing_tls_peer().await;
    let request = DialRequest {
        url: stream_url(&format!("https://{addr}"), "itest").unwrap(),
        bearer_token: None,
    };
    assert_eq!(request.url.scheme(), "wss");

    let dialed = tokio::spawn(async move { WsDialer.dial(&request).await.map(|_| ()) })
        .await
        .expect("dial task panicked");
    assert!(dialed.is_err());
}

#[tokio::test]
async fn test_https_base_keeps_redialing_after_tls_failures() {
    let (addr, accepts) = refusing_tls_peer().await;
    let config = SessionConfig {
        url: stream_url(&format!("https://{addr}"), "itest").unwrap(),
        policy: ReconnectPolicy::new(1, INTERVAL),
        bearer_token: None,
    };
    let (connector, _events) = Connector::from_session_config(config, Arc::new(WsDialer));
    connector.start().unwrap();

    timeout(WAIT, async {
        while accepts.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("supervisor stopped redialing");
    assert_eq!(connector.phase(), Phase::Connecting);

    connector.close().await.unwrap();
}
