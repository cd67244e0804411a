//! Conversion of handler return values into responses.
//!
//! [`IntoResponse`] lets a handler return whatever is most natural, a
//! string, a status code paired with a body, a `Result`, and have it turned
//! into a [`Response`] by the router.

use std::convert::Infallible;

use brook_http::protocol::Response;
use bytes::Bytes;
use http::StatusCode;

pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

/// Both variants must convert, so handlers can return `Result` directly.
impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(t) => t.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

/// `None` is answered with `404 Not Found`.
impl<T: IntoResponse> IntoResponse for Option<T> {
    fn into_response(self) -> Response {
        match self {
            Some(t) => t.into_response(),
            None => Response::new(StatusCode::NOT_FOUND),
        }
    }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let (status, responder) = self;
        responder.into_response().with_status(status)
    }
}

impl<T: IntoResponse> IntoResponse for (T, StatusCode) {
    fn into_response(self) -> Response {
        let (responder, status) = self;
        (status, responder).into_response()
    }
}

impl<T: IntoResponse> IntoResponse for Box<T> {
    fn into_response(self) -> Response {
        (*self).into_response()
    }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        Response::new(self)
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::new(StatusCode::OK)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        text(self)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        text(self)
    }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response {
        Response::ok(self).with_header("Content-Type", "application/octet-stream")
    }
}

impl IntoResponse for Infallible {
    fn into_response(self) -> Response {
        match self {}
    }
}

fn text<B: Into<brook_http::protocol::Body>>(body: B) -> Response {
    Response::ok(body).with_header("Content-Type", "text/plain; charset=utf-8")
}
