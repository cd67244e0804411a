use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode};
use tokio_util::codec::Encoder;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Body, CaseInsensitiveMultimap, PayloadItem, PayloadSize, RequestHead, ResponseHead, SendError};

/// Serializes a whole message, head and body, in one pass.
///
/// The framing is picked from the body and from what the caller already put
/// in the header:
///
/// - a caller-supplied `Content-Length` or `Transfer-Encoding` is trusted and
///   the body is written verbatim, except that [`Body::Chunks`] under
///   `Transfer-Encoding: chunked` is still chunk-encoded
/// - otherwise [`Body::Chunks`] is sent chunked
/// - otherwise `Content-Length` is added: always for responses, and for
///   requests when the body is non-empty or the method is POST, PUT or PATCH
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageEncoder {
    header_encoder: HeaderEncoder,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<(&RequestHead, &Body)> for MessageEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (&RequestHead, &Body), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, body) = item;
        let length_when_empty = matches!(head.method, Method::POST | Method::PUT | Method::PATCH);
        let payload_size = outgoing_payload_size(&head.header, body, length_when_empty);

        self.header_encoder.encode((head, payload_size), dst)?;
        encode_body(payload_size, body, dst)
    }
}

impl Encoder<(&ResponseHead, &Body)> for MessageEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (&ResponseHead, &Body), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, body) = item;
        let status = head.status_code;
        let bodiless = status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED;
        let payload_size = if bodiless { PayloadSize::Empty } else { outgoing_payload_size(&head.header, body, true) };

        self.header_encoder.encode((head, payload_size), dst)?;
        encode_body(payload_size, body, dst)
    }
}

pub(crate) fn outgoing_payload_size(header: &CaseInsensitiveMultimap, body: &Body, length_when_empty: bool) -> PayloadSize {
    if header.contains("Transfer-Encoding") {
        return match body {
            Body::Chunks(_) if header.contains_token("Transfer-Encoding", "chunked") => PayloadSize::Chunked,
            _ => PayloadSize::Unframed,
        };
    }
    if header.contains("Content-Length") {
        return PayloadSize::Unframed;
    }

    match body {
        Body::Chunks(_) => PayloadSize::Chunked,
        body if body.is_empty() && !length_when_empty => PayloadSize::Empty,
        body => PayloadSize::Length(body.len() as u64),
    }
}

fn encode_body(payload_size: PayloadSize, body: &Body, dst: &mut BytesMut) -> Result<(), SendError> {
    let mut encoder = PayloadEncoder::from(payload_size);
    match body {
        Body::Empty => {}
        Body::Full(bytes) => encoder.encode(PayloadItem::Chunk(bytes.clone()), dst)?,
        Body::Chunks(chunks) => {
            for chunk in chunks {
                encoder.encode(PayloadItem::Chunk(chunk.clone()), dst)?;
            }
        }
    }
    encoder.encode(PayloadItem::<Bytes>::Eof, dst)
}
