//! An embeddable asynchronous HTTP/1.1 client and server engine
//!
//! The crate covers the protocol plumbing between a byte stream and
//! application code: message parsing and framing, connection pooling, per
//! operation timeouts, TLS, and the safe teardown of clients and servers
//! while requests are still in flight. Routing lives in a separate crate.
//!
//! # Example
//!
//! ```no_run
//! use brook_http::client::Client;
//! use brook_http::handler::{make_handler, BoxError};
//! use brook_http::protocol::{ClientRequest, Request, Response};
//! use brook_http::server::Server;
//!
//! async fn hello(request: Request) -> Result<Response, BoxError> {
//!     Ok(Response::ok(format!("hello {}", request.path())))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder().handler(make_handler(hello)).build()?;
//!     let address = server.bind()?;
//!     let handle = server.handle();
//!     tokio::spawn(async move { server.start().await });
//!
//!     let client = Client::new(&format!("127.0.0.1:{}", address.port()))?;
//!     let response = client.request(ClientRequest::get("/world")).await?;
//!     assert_eq!(response.content_string(), "hello /world");
//!
//!     handle.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: requests, responses, the case-insensitive header map and errors
//! - [`codec`]: `tokio_util` decoders and encoders for heads and bodies
//! - [`transport`]: the plain and TLS byte streams behind a common trait
//! - [`connection`]: guarded I/O on one transport, and the client pool
//! - [`timeout`] and [`scope`]: per operation deadlines and owner teardown
//! - [`client`] and [`server`]: the session state machines
//! - [`handler`]: what a server calls for each request
//!
//! # Limitations
//!
//! - HTTP/1.x only, one exchange in flight per connection
//! - Bodies are buffered whole, bounded by the configured buffer sizes
//! - No trailers and no obsolete header line folding
//! - At most 64 header fields per message

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod scope;
pub mod server;
pub mod timeout;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
