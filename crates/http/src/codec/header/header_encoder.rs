//! Header block encoder for requests and responses.
//!
//! Writes the start line and every field of the head, then the framing field
//! implied by the [`PayloadSize`] the writer chose, unless the caller already
//! supplied it:
//!
//! - `Length(n)`: `Content-Length: n`
//! - `Chunked`: `Transfer-Encoding: chunked`
//! - `Empty` and `Unframed`: nothing

use std::io;
use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use http::Version;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{CaseInsensitiveMultimap, PayloadSize, RequestHead, ResponseHead, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for request and response heads implementing the [`Encoder`] trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderEncoder;

impl Encoder<(&RequestHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (&RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} {}\r\n", head.method, head.target(), version_str(head.http_version)?)?;
        write_fields(&head.header, payload_size, dst);
        Ok(())
    }
}

impl Encoder<(&ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (&ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        write!(
            FastWrite(dst),
            "{} {} {}\r\n",
            version_str(head.http_version)?,
            head.status_code.as_str(),
            head.reason_phrase()
        )?;
        write_fields(&head.header, payload_size, dst);
        Ok(())
    }
}

fn version_str(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(io::Error::from(ErrorKind::Unsupported).into())
        }
    }
}

fn write_fields(header: &CaseInsensitiveMultimap, payload_size: PayloadSize, dst: &mut BytesMut) {
    for (name, value) in header.iter() {
        put_field(dst, name.as_bytes(), value.as_bytes());
    }

    match payload_size {
        PayloadSize::Length(n) if !header.contains("Content-Length") => {
            put_field(dst, b"Content-Length", n.to_string().as_bytes());
        }
        PayloadSize::Chunked if !header.contains_token("Transfer-Encoding", "chunked") => {
            put_field(dst, b"Transfer-Encoding", b"chunked");
        }
        _ => {}
    }
    dst.put_slice(b"\r\n");
}

#[inline]
fn put_field(dst: &mut BytesMut, name: &[u8], value: &[u8]) {
    dst.put_slice(name);
    dst.put_slice(b": ");
    dst.put_slice(value);
    dst.put_slice(b"\r\n");
}

/// Fast writer implementation for writing to BytesMut.
///
/// This avoids going through an intermediate `String` when formatting the
/// start line, since enough space has already been reserved.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
