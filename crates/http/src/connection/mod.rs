//! Connections and the per-destination connection pool
//!
//! A [`Connection`] owns one transport together with its read buffer and the
//! shutdown line that in-flight operations race against. The
//! [`ConnectionPool`] hands connections out to client sessions and keeps at
//! most one idle spare per destination for the next request.

mod http_connection;
mod pool;

pub use http_connection::Connection;
pub use pool::ConnectionPool;
