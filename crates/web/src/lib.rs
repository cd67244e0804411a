//! Route dispatch on top of `brook-http`
//!
//! A [`Router`] maps path patterns to handlers, filtered by method or by any
//! other [`filter::Filter`]. The [`Server`] builder plugs a router into a
//! `brook_http` server as its request handler.
//!
//! ```no_run
//! use brook_http::protocol::Request;
//! use brook_web::router::get;
//! use brook_web::{handler_fn, Router, Server};
//!
//! async fn number(req: Request) -> String {
//!     req.path_params().get("number").unwrap_or_default().to_owned()
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let router = Router::builder().route("/match/{number}", get(handler_fn(number))).build()?;
//! let server = Server::builder().router(router).address([127, 0, 0, 1].into(), 8080).build()?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

mod handler;
mod responder;
mod server;

pub mod filter;
pub mod router;

pub use handler::FnHandler;
pub use handler::RequestHandler;
pub use handler::handler_fn;
pub use responder::IntoResponse;
pub use router::Router;
pub use server::Server;
pub use server::ServerBuildError;
pub use server::ServerBuilder;
