//! Body framing: decoders and encoders for message payloads.
//!
//! ## Decoders
//! - [`ChunkedDecoder`]: chunked transfer coding
//! - [`LengthDecoder`]: fixed-length payloads
//! - [`EofDecoder`]: payloads delimited by connection close
//! - [`PayloadDecoder`]: picks one of the above from a [`PayloadSize`](crate::protocol::PayloadSize)
//!
//! ## Encoders
//! - [`ChunkedEncoder`]: chunked transfer coding with uppercase hex sizes
//! - [`LengthEncoder`]: fixed-length payloads
//! - [`PayloadEncoder`]: picks one of the above, or passes bytes through verbatim

mod chunked_decoder;
mod chunked_encoder;
mod eof_decoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use eof_decoder::EofDecoder;
pub use length_decoder::LengthDecoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
