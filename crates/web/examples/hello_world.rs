use brook_http::protocol::Request;
use brook_web::router::{get, post};
use brook_web::{Router, Server, handler_fn};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

async fn hello_world(_req: Request) -> &'static str {
    "hello world"
}

async fn greet(req: Request) -> String {
    format!("hello {}", req.path_params().get("name").unwrap_or("stranger"))
}

async fn echo(req: Request) -> String {
    req.content_string().into_owned()
}

async fn default_handler(_req: Request) -> &'static str {
    "404 not found"
}

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let router = Router::builder()
        .route("/", get(handler_fn(hello_world)))
        .route("/hello/{name}", get(handler_fn(greet)))
        .route("/echo", post(handler_fn(echo)))
        .build()
        .expect("routes must not conflict");

    let server = Server::builder()
        .router(router)
        .address(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000)
        .default_handler(handler_fn(default_handler))
        .on_error(|head, e| error!(path = head.map(|h| h.path.as_str()), "request failed: {e}"))
        .build()
        .expect("server must build");

    info!("serving on http://127.0.0.1:3000");
    if let Err(e) = server.run() {
        error!("server stopped: {e}");
    }
}
