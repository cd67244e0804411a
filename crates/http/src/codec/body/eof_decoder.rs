use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// A decoder for bodies that end when the peer closes the connection.
///
/// Every buffered byte is body; the end is only known once the reader
/// reports end of stream and calls [`Decoder::decode_eof`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EofDecoder {
    finished: bool,
}

impl EofDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for EofDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(Some(PayloadItem::Eof));
        }
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(PayloadItem::Chunk(src.split().freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            return self.decode(src);
        }
        self.finished = true;
        Ok(Some(PayloadItem::Eof))
    }
}
