mod common;

use std::time::Duration;

use brook_http::config::ServerConfig;
use brook_http::protocol::ErrorKind;
use brook_http::server::Server;
use common::{Gate, Observed, local_config, start, test_handler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 4096];
    let mut response = Vec::new();
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        response.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&response);
        if n == 0 || complete(&text) {
            return text.into_owned();
        }
    }
}

/// Whether `text` holds a full response with a `Content-Length` body.
fn complete(text: &str) -> bool {
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    body.len() >= length
}

#[tokio::test]
async fn keep_alive_on_one_connection() {
    let (handle, address) = start(Server::builder().config(local_config()).handler(test_handler(Gate::new())));
    let mut stream = TcpStream::connect(address).await.unwrap();

    stream.write_all(b"GET /match/1 HTTP/1.1\r\nHost: test\r\n\r\n").await.unwrap();
    let first = read_response(&mut stream).await;
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.ends_with("\r\n\r\n1"));

    stream.write_all(b"GET /match/2 HTTP/1.1\r\nHost: test\r\n\r\n").await.unwrap();
    let second = read_response(&mut stream).await;
    assert!(second.ends_with("\r\n\r\n2"));

    handle.stop();
}

#[tokio::test]
async fn http_10_closes_after_response() {
    let (handle, address) = start(Server::builder().config(local_config()).handler(test_handler(Gate::new())));
    let mut stream = TcpStream::connect(address).await.unwrap();

    stream.write_all(b"GET /match/7 HTTP/1.0\r\n\r\n").await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.ends_with("\r\n\r\n7"));

    handle.stop();
}

#[tokio::test]
async fn head_request_has_no_body() {
    let (handle, address) = start(Server::builder().config(local_config()).handler(test_handler(Gate::new())));
    let mut stream = TcpStream::connect(address).await.unwrap();

    stream.write_all(b"HEAD /match/12345 HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 5\r\n"));
    assert!(response.ends_with("\r\n\r\n"));

    handle.stop();
}

#[tokio::test]
async fn expect_continue() {
    let (handle, address) = start(Server::builder().config(local_config()).handler(test_handler(Gate::new())));
    let mut stream = TcpStream::connect(address).await.unwrap();

    stream
        .write_all(b"POST /string HTTP/1.1\r\nContent-Length: 4\r\nExpect: 100-continue\r\n\r\n")
        .await
        .unwrap();
    let mut interim = [0u8; 25];
    stream.read_exact(&mut interim).await.unwrap();
    assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

    stream.write_all(b"body").await.unwrap();
    let response = read_response(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("\r\n\r\nbody"));

    handle.stop();
}

#[tokio::test]
async fn oversized_request_gets_413() {
    let observed = Observed::default();
    let config = ServerConfig { max_request_buffer_size: 64, ..local_config() };
    let builder = observed.attach(Server::builder().config(config).handler(test_handler(Gate::new())));
    let (handle, address) = start(builder);
    let mut stream = TcpStream::connect(address).await.unwrap();

    stream.write_all(b"POST /string HTTP/1.1\r\nContent-Length: 100\r\n\r\n").await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));

    let errors = observed.wait_for(1).await;
    assert_eq!(errors, vec![(Some("/string".to_owned()), ErrorKind::MessageSize)]);

    handle.stop();
}

#[tokio::test]
async fn malformed_request_gets_400() {
    let observed = Observed::default();
    let builder = observed.attach(Server::builder().config(local_config()).handler(test_handler(Gate::new())));
    let (handle, address) = start(builder);
    let mut stream = TcpStream::connect(address).await.unwrap();

    stream.write_all(b"GARBAGE REQUEST LINE\r\n\r\n").await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    let errors = observed.wait_for(1).await;
    assert_eq!(errors, vec![(None, ErrorKind::Protocol)]);

    handle.stop();
}

#[tokio::test]
async fn clean_close_is_not_an_error() {
    let observed = Observed::default();
    let builder = observed.attach(Server::builder().config(local_config()).handler(test_handler(Gate::new())));
    let (handle, address) = start(builder);

    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(b"GET /match/1 HTTP/1.1\r\n\r\n").await.unwrap();
    read_response(&mut stream).await;
    drop(stream);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(observed.errors.lock().unwrap().is_empty());

    handle.stop();
}

#[tokio::test]
async fn idle_request_times_out() {
    let observed = Observed::default();
    let config = ServerConfig { timeout_request: Duration::from_millis(50), ..local_config() };
    let builder = observed.attach(Server::builder().config(config).handler(test_handler(Gate::new())));
    let (handle, address) = start(builder);

    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(b"GET /match/1 HTT").await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty());

    let errors = observed.wait_for(1).await;
    assert_eq!(errors, vec![(None, ErrorKind::Timeout)]);

    handle.stop();
}

#[tokio::test]
async fn trickled_request_head_times_out() {
    let observed = Observed::default();
    let config = ServerConfig { timeout_request: Duration::from_millis(200), ..local_config() };
    let builder = observed.attach(Server::builder().config(config).handler(test_handler(Gate::new())));
    let (handle, address) = start(builder);

    let mut stream = TcpStream::connect(address).await.unwrap();
    for byte in b"GET /match/7 HTTP/1.1\r\nX-Padding: aaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n" {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if stream.write_all(&[*byte]).await.is_err() {
            break;
        }
    }

    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    assert!(response.is_empty());

    let errors = observed.wait_for(1).await;
    assert_eq!(errors, vec![(None, ErrorKind::Timeout)]);

    handle.stop();
}

#[tokio::test]
async fn stop_aborts_live_connections() {
    let gate = Gate::new();
    let server = Server::builder().config(local_config()).handler(test_handler(gate.clone())).build().unwrap();
    let (handle, address) = common::spawn(server);

    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(b"GET /wait HTTP/1.1\r\n\r\n").await.unwrap();
    gate.wait_for(1).await;

    handle.stop();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    assert!(response.is_empty());
    gate.open(1);
}
