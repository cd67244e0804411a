//! Error types for the engine.
//!
//! [`ParseError`] covers everything that can go wrong while decoding a message,
//! [`SendError`] covers encoding, and [`HttpError`] is what sessions, clients and
//! servers surface to callers. Every [`HttpError`] maps to exactly one
//! [`ErrorKind`], so callers can branch on the category without matching on
//! variant payloads.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// The category of an [`HttpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect, read, write or handshake failure, including a peer closing early.
    Transport,
    /// A timeout guard fired before the operation finished.
    Timeout,
    /// Malformed status line, request line, header block or body framing.
    Protocol,
    /// A message exceeded the configured buffer limit.
    MessageSize,
    /// Proxy tunnel refused or a certificate rejected.
    Permission,
    /// The owning client or server went away; never reported to a callback.
    Cancelled,
    /// Invalid construction input, such as an unparsable destination.
    Config,
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: io::Error,
    },

    #[error("timed out after {timeout:?} while {stage}")]
    Timeout { stage: &'static str, timeout: Duration },

    #[error("protocol error: {source}")]
    Protocol { source: ParseError },

    #[error("message size {current_size} exceeds the limit {max_size}")]
    MessageSize { current_size: usize, max_size: usize },

    #[error("permission denied: {reason}")]
    Permission { reason: String },

    #[error("operation cancelled, the owner has been dropped")]
    Cancelled,

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl HttpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::MessageSize { .. } => ErrorKind::MessageSize,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    pub fn timeout(stage: &'static str, timeout: Duration) -> Self {
        Self::Timeout { stage, timeout }
    }

    pub fn message_size(current_size: usize, max_size: usize) -> Self {
        Self::MessageSize { current_size, max_size }
    }

    pub fn permission<S: ToString>(reason: S) -> Self {
        Self::Permission { reason: reason.to_string() }
    }

    pub fn config<S: ToString>(reason: S) -> Self {
        Self::Config { reason: reason.to_string() }
    }

    pub fn connection_closed(while_doing: &str) -> Self {
        Self::Transport {
            source: io::Error::new(io::ErrorKind::UnexpectedEof, format!("connection closed by peer while {while_doing}")),
        }
    }
}

impl From<ParseError> for HttpError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::TooLargeHeader { current_size, max_size } | ParseError::TooLargeBody { current_size, max_size } => {
                Self::MessageSize { current_size, max_size }
            }
            ParseError::Io { source } => Self::Transport { source },
            e => Self::Protocol { source: e },
        }
    }
}

impl From<SendError> for HttpError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => Self::Transport { source },
            SendError::InvalidBody { reason } => Self::Protocol { source: ParseError::InvalidBody { reason } },
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("body size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeBody { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http status code: {0}")]
    InvalidStatus(u16),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_large_body(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeBody { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_errors_become_message_size() {
        let e: HttpError = ParseError::too_large_header(9000, 8192).into();
        assert_eq!(e.kind(), ErrorKind::MessageSize);

        let e: HttpError = ParseError::too_large_body(20, 10).into();
        assert!(matches!(e, HttpError::MessageSize { current_size: 20, max_size: 10 }));
    }

    #[test]
    fn io_errors_become_transport() {
        let e: HttpError = ParseError::io(io::Error::from(io::ErrorKind::UnexpectedEof)).into();
        assert_eq!(e.kind(), ErrorKind::Transport);

        let e: HttpError = SendError::io(io::Error::from(io::ErrorKind::BrokenPipe)).into();
        assert_eq!(e.kind(), ErrorKind::Transport);
    }

    #[test]
    fn framing_errors_become_protocol() {
        let e: HttpError = ParseError::invalid_chunk("bad size").into();
        assert_eq!(e.kind(), ErrorKind::Protocol);

        let e: HttpError = ParseError::InvalidMethod.into();
        assert_eq!(e.kind(), ErrorKind::Protocol);
        assert!(e.to_string().contains("invalid http method"));
    }
}
