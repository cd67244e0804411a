use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use brook_http::protocol::{Request, Response};

use crate::responder::IntoResponse;

/// A routed handler: receives the request with its path captures filled in.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: Request) -> Response;
}

/// Holds an async function usable as a [`RequestHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> std::fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: IntoResponse,
{
    FnHandler { f, _phantom: PhantomData }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F, Fut>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: IntoResponse,
{
    async fn invoke(&self, req: Request) -> Response {
        (self.f)(req).await.into_response()
    }
}

#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for Box<H> {
    async fn invoke(&self, req: Request) -> Response {
        (**self).invoke(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_http::protocol::RequestHead;
    use bytes::Bytes;
    use http::{Method, StatusCode};

    async fn created(req: Request) -> (StatusCode, String) {
        (StatusCode::CREATED, req.path().to_owned())
    }

    fn assert_is_handler<T: RequestHandler>(_handler: &T) {}

    #[tokio::test]
    async fn fn_is_handler() {
        let handler = handler_fn(created);
        assert_is_handler(&handler);

        let response = handler.invoke(Request::new(RequestHead::new(Method::POST, "/users"), Bytes::new())).await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        assert_eq!(response.content_string(), "/users");
    }
}
