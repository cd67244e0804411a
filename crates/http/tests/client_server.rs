mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use brook_http::client::Client;
use brook_http::config::ClientConfig;
use brook_http::protocol::{Body, ClientRequest, ErrorKind};
use brook_http::server::Server;
use common::{Gate, local_config, start, test_handler};
use http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn client_for(address: std::net::SocketAddr) -> Client {
    Client::new(&address.to_string()).unwrap()
}

fn server(gate: &Gate) -> brook_http::server::ServerBuilder {
    Server::builder().config(local_config()).handler(test_handler(gate.clone()))
}

#[tokio::test]
async fn post_string_gets_content_length() {
    let (handle, address) = start(server(&Gate::new()));
    let client = client_for(address);

    let response = client.request(ClientRequest::post("/string").body("A string")).await.unwrap();
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.content_string(), "A string");
    assert_eq!(response.header().find("x-content-length"), Some("8"));
    assert_eq!(response.header().find("content-length"), Some("8"));

    handle.stop();
}

#[tokio::test]
async fn path_capture_echo() {
    let (handle, address) = start(server(&Gate::new()));
    let client = client_for(address);

    let response = client.request(ClientRequest::get("/match/123")).await.unwrap();
    assert_eq!(response.content_string(), "123");

    let response = client.request(ClientRequest::get("/nowhere")).await.unwrap();
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert!(response.content().is_empty());

    handle.stop();
}

#[tokio::test]
async fn chunked_request_body() {
    let (handle, address) = start(server(&Gate::new()));
    let client = client_for(address);

    let request = ClientRequest::post("/chunked").body(Body::chunks(["Simple", "Web", " in\r\n\r\nchunks."]));
    let response = client.request(request).await.unwrap();
    assert_eq!(response.content_string(), "SimpleWeb in\r\n\r\nchunks.");
    assert_eq!(response.header().find("x-content-length"), Some(""));

    handle.stop();
}

#[tokio::test]
async fn request_details_reach_handler() {
    let (handle, address) = start(server(&Gate::new()));
    let client = client_for(address);

    let request = ClientRequest::get("/info?q=a%20b").header("TEST1", "test1 value");
    let response = client.request(request).await.unwrap();
    assert_eq!(response.content_string(), "127.0.0.1 test1 value a b");

    handle.stop();
}

#[tokio::test]
async fn handler_error_is_internal_server_error() {
    let (handle, address) = start(server(&Gate::new()));
    let client = client_for(address);

    let response = client.request(ClientRequest::get("/error")).await.unwrap();
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    // the connection survives the failure
    let response = client.request(ClientRequest::get("/match/1")).await.unwrap();
    assert_eq!(response.content_string(), "1");
    assert_eq!(client.pool_size(), 1);

    handle.stop();
}

#[tokio::test]
async fn sequential_requests_share_a_connection() {
    let (handle, address) = start(server(&Gate::new()));
    let client = client_for(address);

    for i in 0..5 {
        let response = client.request(ClientRequest::get(format!("/match/{i}"))).await.unwrap();
        assert_eq!(response.content_string(), i.to_string());
        assert_eq!(client.pool_size(), 1);
    }

    handle.stop();
}

#[tokio::test]
async fn burst_grows_pool_then_settles_to_one() {
    let gate = Gate::new();
    let (handle, address) = start(server(&gate));
    let client = Arc::new(client_for(address));

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.request(ClientRequest::get("/wait")).await })
        })
        .collect();

    gate.wait_for(100).await;
    assert_eq!(client.pool_size(), 100);

    gate.open(100);
    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap().content_string(), "released");
    }
    assert_eq!(client.pool_size(), 1);

    handle.stop();
}

#[tokio::test]
async fn dropped_client_never_calls_back() {
    let gate = Gate::new();
    let (handle, address) = start(server(&gate));
    let client = client_for(address);
    let called = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&called);
    client.request_with(ClientRequest::get("/wait"), move |_| flag.store(true, Ordering::SeqCst));

    gate.wait_for(1).await;
    drop(client);
    gate.open(1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!called.load(Ordering::SeqCst));

    handle.stop();
}

#[tokio::test]
async fn stop_fails_requests_in_flight() {
    let gate = Gate::new();
    let (handle, address) = start(server(&gate));
    let client = client_for(address);

    let (tx, rx) = oneshot::channel();
    client.request_with(ClientRequest::get("/wait"), move |result| {
        tx.send(result.map(|response| response.status_code())).unwrap();
    });

    gate.wait_for(1).await;
    client.stop();
    let err = rx.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(client.pool_size(), 0);

    gate.open(1);
    handle.stop();
}

#[tokio::test]
async fn callback_receives_response() {
    let (handle, address) = start(server(&Gate::new()));
    let client = client_for(address);

    let (tx, rx) = oneshot::channel();
    client.request_with(ClientRequest::post("/string").body("A string"), move |result| {
        tx.send(result.map(|response| response.content_string())).unwrap();
    });
    assert_eq!(rx.await.unwrap().unwrap(), "A string");

    handle.stop();
}

#[tokio::test]
async fn read_timeout() {
    let gate = Gate::new();
    let (handle, address) = start(server(&gate));
    let config = ClientConfig { timeout: Duration::from_millis(100), ..Default::default() };
    let client = Client::builder(address.to_string()).config(config).build().unwrap();

    let err = client.request(ClientRequest::get("/wait")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(client.pool_size(), 0);

    gate.open(1);
    handle.stop();
}

#[tokio::test]
async fn response_limit() {
    let (handle, address) = start(server(&Gate::new()));
    let config = ClientConfig { max_response_buffer_size: 4, ..Default::default() };
    let client = Client::builder(address.to_string()).config(config).build().unwrap();

    let err = client.request(ClientRequest::post("/string").body("A string")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MessageSize);

    handle.stop();
}

#[tokio::test]
async fn connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let err = client_for(address).request(ClientRequest::get("/")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

/// Serves one response per connection and then closes it without notice.
/// Connections after the first `replies` are closed without any response.
async fn one_shot_server(accepted: Arc<AtomicUsize>, replies: usize) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let count = accepted.fetch_add(1, Ordering::SeqCst) + 1;

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            if count <= replies {
                socket.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await.unwrap();
                socket.flush().await.unwrap();
            }
        }
    });
    address
}

#[tokio::test]
async fn stale_connection_is_reconnected_once() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let address = one_shot_server(Arc::clone(&accepted), usize::MAX).await;
    let client = client_for(address);

    assert_eq!(client.request(ClientRequest::get("/")).await.unwrap().content_string(), "ok");
    assert_eq!(client.pool_size(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.request(ClientRequest::get("/")).await.unwrap().content_string(), "ok");
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_reconnect_is_reported() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let address = one_shot_server(Arc::clone(&accepted), 1).await;
    let client = client_for(address);

    assert_eq!(client.request(ClientRequest::get("/")).await.unwrap().content_string(), "ok");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = client.request(ClientRequest::get("/")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(client.pool_size(), 0);
}

#[tokio::test]
async fn stale_connection_not_replayed_when_disabled() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let address = one_shot_server(Arc::clone(&accepted), usize::MAX).await;
    let config = ClientConfig { reconnect_non_idempotent: false, ..Default::default() };
    let client = Client::builder(address.to_string()).config(config).build().unwrap();

    assert!(client.request(ClientRequest::post("/").body("x")).await.is_ok());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = client.request(ClientRequest::post("/").body("x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stopped_server_refuses() {
    let (handle, address) = start(server(&Gate::new()));
    let client = client_for(address);
    assert!(client.request(ClientRequest::get("/match/1")).await.is_ok());

    handle.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = client.request(ClientRequest::get("/match/1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}
