#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brook_http::config::ServerConfig;
use brook_http::handler::{BoxError, Handler, make_handler};
use brook_http::protocol::{ErrorKind, Request, Response};
use brook_http::server::{Server, ServerBuilder, ServerHandle};
use http::{Method, StatusCode};
use tokio::sync::Semaphore;

pub fn local_config() -> ServerConfig {
    ServerConfig { address: IpAddr::V4(Ipv4Addr::LOCALHOST), ..Default::default() }
}

/// Binds and starts `server` in the background.
pub fn spawn(server: Server) -> (ServerHandle, SocketAddr) {
    let address = server.bind().unwrap();
    let handle = server.handle();
    tokio::spawn(async move { server.start().await });
    (handle, address)
}

pub fn start(builder: ServerBuilder) -> (ServerHandle, SocketAddr) {
    spawn(builder.build().unwrap())
}

/// Requests to `/wait` block on this gate until the test opens it.
#[derive(Debug, Clone)]
pub struct Gate {
    pub arrived: Arc<AtomicUsize>,
    permits: Arc<Semaphore>,
}

impl Gate {
    pub fn new() -> Self {
        Self { arrived: Arc::new(AtomicUsize::new(0)), permits: Arc::new(Semaphore::new(0)) }
    }

    pub async fn pass(&self) {
        self.arrived.fetch_add(1, Ordering::SeqCst);
        self.permits.acquire().await.unwrap().forget();
    }

    pub fn open(&self, n: usize) {
        self.permits.add_permits(n);
    }

    pub async fn wait_for(&self, n: usize) {
        while self.arrived.load(Ordering::SeqCst) < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// A handler covering the routes the tests talk to.
pub fn test_handler(gate: Gate) -> impl Handler {
    make_handler(move |request: Request| {
        let gate = gate.clone();
        async move { route(request, gate).await }
    })
}

async fn route(request: Request, gate: Gate) -> Result<Response, BoxError> {
    let path = request.path().to_owned();
    match (request.method().clone(), path.as_str()) {
        (Method::POST, "/string" | "/chunked") => {
            let content_length = request.header().find("Content-Length").unwrap_or_default().to_owned();
            Ok(Response::ok(request.content().clone()).with_header("X-Content-Length", content_length))
        }
        (Method::GET | Method::HEAD, path) if path.starts_with("/match/") => Ok(Response::ok(path["/match/".len()..].to_owned())),
        (Method::GET, "/info") => {
            let remote = request.remote_endpoint().map(|addr| addr.ip().to_string()).unwrap_or_default();
            let query = request.parse_query_string();
            let body = format!("{} {} {}", remote, request.header().find("test1").unwrap_or_default(), query.find("q").unwrap_or_default());
            Ok(Response::ok(body))
        }
        (Method::GET, "/wait") => {
            gate.pass().await;
            Ok(Response::ok("released"))
        }
        (Method::GET, "/error") => Err("handler failure".into()),
        _ => Ok(Response::new(StatusCode::NOT_FOUND)),
    }
}

/// Records what the server's error observer was told.
#[derive(Debug, Clone, Default)]
pub struct Observed {
    pub errors: Arc<Mutex<Vec<(Option<String>, ErrorKind)>>>,
}

impl Observed {
    pub fn attach(&self, builder: ServerBuilder) -> ServerBuilder {
        let errors = Arc::clone(&self.errors);
        builder.on_error(move |head, e| {
            errors.lock().unwrap().push((head.map(|head| head.path.clone()), e.kind()));
        })
    }

    pub async fn wait_for(&self, n: usize) -> Vec<(Option<String>, ErrorKind)> {
        for _ in 0..200 {
            if self.errors.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.errors.lock().unwrap().clone()
    }
}
