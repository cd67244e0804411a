//! Request types.
//!
//! [`RequestHead`] is the parsed or to-be-written request line plus header
//! block. [`Request`] is what a server hands to its handler, and
//! [`ClientRequest`] is what a client caller fills in before sending.

use std::borrow::Cow;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{Method, Version};

use crate::protocol::{Body, CaseInsensitiveMultimap};

/// The request line and header block of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    pub query_string: String,
    pub http_version: Version,
    pub header: CaseInsensitiveMultimap,
}

impl RequestHead {
    /// Creates an HTTP/1.1 head, splitting `target` into path and query string
    /// at the last `?`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query_string) = split_target(target);
        Self {
            method,
            path: path.to_owned(),
            query_string: query_string.to_owned(),
            http_version: Version::HTTP_11,
            header: CaseInsensitiveMultimap::new(),
        }
    }

    /// The request target as it appears on the request line.
    pub fn target(&self) -> Cow<'_, str> {
        if self.query_string.is_empty() {
            Cow::Borrowed(&self.path)
        } else {
            Cow::Owned(format!("{}?{}", self.path, self.query_string))
        }
    }

    /// Whether the connection may carry another request after this one.
    ///
    /// HTTP/1.1 connections persist unless `Connection: close` is present;
    /// older versions persist only with an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        keep_alive(self.http_version, &self.header)
    }

    pub fn expects_continue(&self) -> bool {
        self.header.find("Expect").is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
    }
}

pub(crate) fn split_target(target: &str) -> (&str, &str) {
    match target.rfind('?') {
        Some(position) => (&target[..position], &target[position + 1..]),
        None => (target, ""),
    }
}

pub(crate) fn keep_alive(version: Version, header: &CaseInsensitiveMultimap) -> bool {
    if header.contains_token("Connection", "close") {
        return false;
    }
    version >= Version::HTTP_11 || header.contains_token("Connection", "keep-alive")
}

/// Path parameters captured by a route pattern, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.params.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// A fully received request, as handed to a server handler.
#[derive(Debug, Clone)]
pub struct Request {
    head: RequestHead,
    content: Bytes,
    remote_endpoint: Option<SocketAddr>,
    path_params: PathParams,
}

impl Request {
    pub fn new(head: RequestHead, content: Bytes) -> Self {
        Self { head, content, remote_endpoint: None, path_params: PathParams::new() }
    }

    pub(crate) fn with_remote_endpoint(mut self, remote_endpoint: Option<SocketAddr>) -> Self {
        self.remote_endpoint = remote_endpoint;
        self
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        &self.head.path
    }

    pub fn query_string(&self) -> &str {
        &self.head.query_string
    }

    pub fn http_version(&self) -> Version {
        self.head.http_version
    }

    pub fn header(&self) -> &CaseInsensitiveMultimap {
        &self.head.header
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn content_string(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// The address of the peer that sent this request, when known.
    pub fn remote_endpoint(&self) -> Option<SocketAddr> {
        self.remote_endpoint
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn set_path_params(&mut self, path_params: PathParams) {
        self.path_params = path_params;
    }

    /// Parses the query string into a multimap with percent-decoded values.
    ///
    /// ```
    /// # use brook_http::protocol::{Request, RequestHead};
    /// # use http::Method;
    /// let request = Request::new(RequestHead::new(Method::GET, "/search?q=a%20b&lang=en"), Default::default());
    /// let query = request.parse_query_string();
    /// assert_eq!(query.find("q"), Some("a b"));
    /// assert_eq!(query.find("LANG"), Some("en"));
    /// ```
    pub fn parse_query_string(&self) -> CaseInsensitiveMultimap {
        parse_query(&self.head.query_string)
    }

    pub fn into_parts(self) -> (RequestHead, Bytes) {
        (self.head, self.content)
    }
}

/// A request to be sent by a client.
///
/// ```
/// # use brook_http::protocol::ClientRequest;
/// let request = ClientRequest::post("/json").header("Content-Type", "application/json").body(r#"{"a":1}"#);
/// assert_eq!(request.path(), "/json");
/// ```
#[derive(Debug, Clone)]
pub struct ClientRequest {
    method: Method,
    path: String,
    header: CaseInsensitiveMultimap,
    body: Body,
}

impl ClientRequest {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self { method, path: path.into(), header: CaseInsensitiveMultimap::new(), body: Body::Empty }
    }

    pub fn get<P: Into<String>>(path: P) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post<P: Into<String>>(path: P) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put<P: Into<String>>(path: P) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete<P: Into<String>>(path: P) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.header.insert(name, value);
        self
    }

    #[must_use]
    pub fn headers(mut self, header: CaseInsensitiveMultimap) -> Self {
        self.header.extend(header.iter());
        self
    }

    #[must_use]
    pub fn body<B: Into<Body>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn header_map(&self) -> &CaseInsensitiveMultimap {
        &self.header
    }

    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    pub(crate) fn into_parts(self) -> (Method, String, CaseInsensitiveMultimap, Body) {
        (self.method, self.path, self.header, self.body)
    }
}

/// Splits `name=value` pairs on `&`; values are percent-decoded, pairs with
/// an empty name are skipped.
pub fn parse_query(query_string: &str) -> CaseInsensitiveMultimap {
    query_string
        .split('&')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (!name.is_empty()).then(|| (name.to_owned(), percent_decode(value)))
        })
        .collect()
}

/// Builds a query string from fields, percent-encoding the values.
pub fn create_query(fields: &CaseInsensitiveMultimap) -> String {
    fields.iter().map(|(name, value)| format!("{name}={}", percent_encode(value))).collect::<Vec<_>>().join("&")
}

/// Decodes `%XX` escapes and `+` as space. Malformed escapes are kept verbatim.
pub fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => match (bytes.get(i + 1).and_then(hex_value), bytes.get(i + 2).and_then(hex_value)) {
                (Some(high), Some(low)) => {
                    decoded.push(high << 4 | low);
                    i += 3;
                    continue;
                }
                _ => decoded.push(b'%'),
            },
            b'+' => decoded.push(b' '),
            other => decoded.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: &u8) -> Option<u8> {
    char::from(*byte).to_digit(16).and_then(|digit| u8::try_from(digit).ok())
}

/// Percent-encodes everything except unreserved characters.
pub fn percent_encode(value: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push('%');
            encoded.push(char::from(HEX[usize::from(byte >> 4)]));
            encoded.push(char::from(HEX[usize::from(byte & 15)]));
        }
    }
    encoded
}
