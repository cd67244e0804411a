//! Core HTTP message types.
//!
//! # Architecture
//!
//! - **Payload framing** ([`message`]): [`PayloadItem`] and [`PayloadSize`]
//!   describe how a body is delimited and streamed through the codecs
//!
//! - **Headers** ([`header_map`]): [`CaseInsensitiveMultimap`] holds header
//!   fields with case-insensitive names and duplicate support
//!
//! - **Requests** ([`request`]): [`RequestHead`] for the request line and
//!   headers, [`Request`] for what a server handler receives, and
//!   [`ClientRequest`] for what a client sends
//!
//! - **Responses** ([`response`]): [`ResponseHead`] and [`Response`], used by
//!   both sides
//!
//! - **Outgoing bodies** ([`body`]): [`Body`]
//!
//! - **Errors** ([`error`]): [`HttpError`] with its [`ErrorKind`], plus the
//!   codec level [`ParseError`] and [`SendError`]

mod message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod header_map;
pub use header_map::CaseInsensitiveMultimap;
pub use header_map::case_insensitive_equal;
pub use header_map::case_insensitive_hash;

pub(crate) mod request;
pub use request::ClientRequest;
pub use request::PathParams;
pub use request::Request;
pub use request::RequestHead;
pub use request::create_query;
pub use request::parse_query;
pub use request::percent_decode;
pub use request::percent_encode;

mod response;
pub use response::Response;
pub use response::ResponseHead;

mod body;
pub use body::Body;

mod error;
pub use error::ErrorKind;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
