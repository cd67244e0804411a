//! Encoding and decoding of HTTP/1.x messages.
//!
//! Everything here implements `tokio_util`'s [`Decoder`](tokio_util::codec::Decoder)
//! and [`Encoder`](tokio_util::codec::Encoder) over a `BytesMut` buffer, and
//! none of it performs I/O. The sessions own the buffers and drive the codecs
//! between reads and writes.
//!
//! # Architecture
//!
//! - Heads, via the [`header`] module:
//!   - [`RequestHeadDecoder`] / [`ResponseHeadDecoder`] parse a head and report
//!     the body framing as a [`PayloadSize`](crate::protocol::PayloadSize)
//!   - [`HeaderEncoder`] writes a head plus the framing field
//!
//! - Bodies, via the [`body`] module:
//!   - [`PayloadDecoder`] for length, chunked, close-delimited or empty bodies
//!   - [`PayloadEncoder`] for length, chunked or caller-framed bodies
//!
//! - Whole messages: [`MessageEncoder`] chooses the framing for an outgoing
//!   message and writes head and body together
//!
//! # Example
//!
//! ```
//! use brook_http::codec::{PayloadDecoder, RequestHeadDecoder};
//! use brook_http::protocol::PayloadItem;
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//!
//! let mut buf = BytesMut::from("POST /string HTTP/1.1\r\nContent-Length: 8\r\n\r\nA string");
//! let (head, payload_size) = RequestHeadDecoder::default().decode(&mut buf).unwrap().unwrap();
//! assert_eq!(head.path, "/string");
//!
//! let mut payload = PayloadDecoder::from(payload_size);
//! let item = payload.decode(&mut buf).unwrap().unwrap();
//! assert_eq!(item, PayloadItem::Chunk("A string".into()));
//! ```

mod body;
mod header;
mod message_encoder;

pub use body::{ChunkedDecoder, ChunkedEncoder, EofDecoder, LengthDecoder, LengthEncoder, PayloadDecoder, PayloadEncoder};
pub use header::{HeaderEncoder, MAX_HEADER_NUM, RequestHeadDecoder, ResponseHeadDecoder};
pub use message_encoder::MessageEncoder;
pub(crate) use message_encoder::outgoing_payload_size;
