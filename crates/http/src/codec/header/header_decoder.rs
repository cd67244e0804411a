//! Header block decoders for requests and responses.
//!
//! Both decoders parse a complete start line plus header block with
//! `httparse`, consume it from the buffer, and report how the body that
//! follows is framed as a [`PayloadSize`].
//!
//! # Limits
//!
//! - Maximum number of header fields: 64
//! - Maximum buffered header size: configurable per decoder, unlimited by default
//! - Only HTTP/1.0 and HTTP/1.1
//!
//! # Body framing
//!
//! The same rules apply to both directions, checked in order:
//!
//! 1. `Transfer-Encoding` whose last coding is `chunked`: chunked body
//! 2. `Content-Length: N`: exactly N bytes
//! 3. responses only, when the version is below 1.1 or `Connection: close` is
//!    present: the body runs until the peer closes
//! 4. otherwise no body
//!
//! Responses to `HEAD` and responses with a 1xx, 204 or 304 status never
//! carry a body.

use bytes::BytesMut;
use http::{Method, StatusCode, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::request::split_target;
use crate::protocol::{CaseInsensitiveMultimap, ParseError, PayloadSize, RequestHead, ResponseHead};

/// Maximum number of header fields allowed in a message
pub const MAX_HEADER_NUM: usize = 64;

/// Decodes a request line and header block.
#[derive(Debug, Clone)]
pub struct RequestHeadDecoder {
    max_size: usize,
}

impl RequestHeadDecoder {
    /// A decoder that fails once more than `max_size` bytes are buffered
    /// without a complete header block.
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }
}

impl Default for RequestHeadDecoder {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl Decoder for RequestHeadDecoder {
    type Item = (RequestHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // "GET / HTTP/1.1\n\n" is the shortest message worth handing to the parser
        if src.len() < 14 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let status = req.parse(src).map_err(map_httparse_error)?;
        let Status::Complete(body_offset) = status else {
            ensure!(src.len() <= self.max_size, ParseError::too_large_header(src.len(), self.max_size));
            return Ok(None);
        };
        trace!(header_size = body_offset, "parsed request header");
        ensure!(body_offset <= self.max_size, ParseError::too_large_header(body_offset, self.max_size));

        let method = Method::from_bytes(req.method.ok_or(ParseError::InvalidMethod)?.as_bytes())
            .map_err(|_| ParseError::InvalidMethod)?;
        let (path, query_string) = split_target(req.path.ok_or_else(|| ParseError::invalid_header("missing request target"))?);
        let http_version = parse_version(req.version)?;
        let header = collect_header(req.headers);

        let head = RequestHead {
            method,
            path: path.to_owned(),
            query_string: query_string.to_owned(),
            http_version,
            header,
        };
        let payload_size = request_payload_size(&head.header)?;

        let _ = src.split_to(body_offset);
        Ok(Some((head, payload_size)))
    }
}

/// Decodes a status line and header block.
///
/// The method of the request being answered is needed to tell whether a body
/// follows, since a response to `HEAD` carries none.
#[derive(Debug, Clone)]
pub struct ResponseHeadDecoder {
    request_method: Method,
    max_size: usize,
}

impl ResponseHeadDecoder {
    pub fn new(request_method: Method, max_size: usize) -> Self {
        Self { request_method, max_size }
    }
}

impl Decoder for ResponseHeadDecoder {
    type Item = (ResponseHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut res = httparse::Response::new(&mut headers);

        let status = res.parse(src).map_err(map_httparse_error)?;
        let Status::Complete(body_offset) = status else {
            ensure!(src.len() <= self.max_size, ParseError::too_large_header(src.len(), self.max_size));
            return Ok(None);
        };
        trace!(header_size = body_offset, "parsed response header");
        ensure!(body_offset <= self.max_size, ParseError::too_large_header(body_offset, self.max_size));

        let code = res.code.ok_or_else(|| ParseError::invalid_header("missing status code"))?;
        let status_code = StatusCode::from_u16(code).map_err(|_| ParseError::InvalidStatus(code))?;
        let head = ResponseHead {
            http_version: parse_version(res.version)?,
            status_code,
            reason: res.reason.unwrap_or_default().to_owned(),
            header: collect_header(res.headers),
        };
        let payload_size = response_payload_size(&head, &self.request_method)?;

        let _ = src.split_to(body_offset);
        Ok(Some((head, payload_size)))
    }
}

fn map_httparse_error(e: Error) -> ParseError {
    match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        Error::Version => ParseError::InvalidVersion(None),
        Error::Status => ParseError::InvalidStatus(0),
        e => ParseError::invalid_header(e.to_string()),
    }
}

fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        _ => Err(ParseError::InvalidVersion(version)),
    }
}

fn collect_header(headers: &[httparse::Header<'_>]) -> CaseInsensitiveMultimap {
    let mut header = CaseInsensitiveMultimap::with_capacity(headers.len());
    for field in headers {
        // httparse guarantees names are tokens; values may hold obs-text
        header.insert(field.name, String::from_utf8_lossy(field.value).trim());
    }
    header
}

fn request_payload_size(header: &CaseInsensitiveMultimap) -> Result<PayloadSize, ParseError> {
    match framed_payload_size(header)? {
        Some(size) => Ok(size),
        None => Ok(PayloadSize::Empty),
    }
}

fn response_payload_size(head: &ResponseHead, request_method: &Method) -> Result<PayloadSize, ParseError> {
    let status = head.status_code;
    if *request_method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(PayloadSize::Empty);
    }

    if let Some(size) = framed_payload_size(&head.header)? {
        return Ok(size);
    }

    if head.http_version < Version::HTTP_11 || head.header.contains_token("Connection", "close") {
        Ok(PayloadSize::Unframed)
    } else {
        Ok(PayloadSize::Empty)
    }
}

/// Applies the `Transfer-Encoding` and `Content-Length` rules, in that order.
fn framed_payload_size(header: &CaseInsensitiveMultimap) -> Result<Option<PayloadSize>, ParseError> {
    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
    if header.find("Transfer-Encoding").is_some_and(is_chunked) {
        return Ok(Some(PayloadSize::Chunked));
    }

    match header.find("Content-Length") {
        Some(value) => {
            let length = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {value} is not u64")))?;
            Ok(Some(PayloadSize::Length(length)))
        }
        None => Ok(None),
    }
}

/// Checks if a Transfer-Encoding value ends with the chunked coding.
///
/// According to RFC 7230, chunked must be the last encoding if present.
fn is_chunked(value: &str) -> bool {
    value.rsplit(',').next().is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}
