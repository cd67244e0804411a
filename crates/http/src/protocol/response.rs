//! Response types shared by both sides of a connection.
//!
//! A server handler builds a [`Response`] to be written back; a client
//! receives one populated from the wire, whose body is always [`Body::Full`]
//! or [`Body::Empty`].

use std::borrow::Cow;

use bytes::Bytes;
use http::{StatusCode, Version};

use crate::protocol::{Body, CaseInsensitiveMultimap};

/// The status line and header block of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub http_version: Version,
    pub status_code: StatusCode,
    /// The reason phrase; empty means the canonical phrase of `status_code`.
    pub reason: String,
    pub header: CaseInsensitiveMultimap,
}

impl ResponseHead {
    pub fn new(status_code: StatusCode) -> Self {
        Self {
            http_version: Version::HTTP_11,
            status_code,
            reason: String::new(),
            header: CaseInsensitiveMultimap::new(),
        }
    }

    /// The reason phrase to put on the status line.
    pub fn reason_phrase(&self) -> &str {
        if self.reason.is_empty() { self.status_code.canonical_reason().unwrap_or("") } else { &self.reason }
    }

    /// Whether the connection may carry another exchange after this response.
    pub fn keep_alive(&self) -> bool {
        crate::protocol::request::keep_alive(self.http_version, &self.header)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    head: ResponseHead,
    body: Body,
}

impl Response {
    pub fn new(status_code: StatusCode) -> Self {
        Self { head: ResponseHead::new(status_code), body: Body::Empty }
    }

    pub fn from_parts(head: ResponseHead, body: Body) -> Self {
        Self { head, body }
    }

    /// A `200 OK` response carrying `body`.
    pub fn ok<B: Into<Body>>(body: B) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    #[must_use]
    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.head.header.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body<B: Into<Body>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.head.status_code = status_code;
        self
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    pub fn http_version(&self) -> Version {
        self.head.http_version
    }

    pub fn status_code(&self) -> StatusCode {
        self.head.status_code
    }

    pub fn reason(&self) -> &str {
        self.head.reason_phrase()
    }

    pub fn header(&self) -> &CaseInsensitiveMultimap {
        &self.head.header
    }

    pub fn header_mut(&mut self) -> &mut CaseInsensitiveMultimap {
        &mut self.head.header
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The body as one contiguous buffer.
    pub fn content(&self) -> Bytes {
        self.body.to_bytes()
    }

    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn content_string(&self) -> String {
        match String::from_utf8_lossy(&self.content()) {
            Cow::Borrowed(s) => s.to_owned(),
            Cow::Owned(s) => s,
        }
    }

    pub fn into_parts(self) -> (ResponseHead, Body) {
        (self.head, self.body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
