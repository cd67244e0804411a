//! Start line and header block processing.
//!
//! - [`RequestHeadDecoder`] and [`ResponseHeadDecoder`] parse a head from raw
//!   bytes and report the body framing
//! - [`HeaderEncoder`] writes a request or response head

mod header_decoder;
mod header_encoder;

pub use header_decoder::MAX_HEADER_NUM;
pub use header_decoder::RequestHeadDecoder;
pub use header_decoder::ResponseHeadDecoder;
pub use header_encoder::HeaderEncoder;
