use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use brook_http::config::{ServerConfig, ServerTlsConfig};
use brook_http::handler::{BoxError, Handler};
use brook_http::protocol::{HttpError, Request, RequestHead, Response};
use brook_http::server::{Server as HttpServer, ServerHandle};
use http::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::handler::RequestHandler;
use crate::router::Router;

type ErrorObserver = Box<dyn Fn(Option<&RequestHead>, &HttpError) + Send + Sync>;

pub struct ServerBuilder {
    router: Option<Router>,
    default_handler: Option<Box<dyn RequestHandler>>,
    config: ServerConfig,
    tls: Option<ServerTlsConfig>,
    on_error: Option<ErrorObserver>,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder").field("config", &self.config).field("tls", &self.tls).finish_non_exhaustive()
    }
}

impl ServerBuilder {
    fn new() -> Self {
        Self { router: None, default_handler: None, config: ServerConfig::default(), tls: None, on_error: None }
    }

    #[must_use]
    pub fn address(mut self, address: IpAddr, port: u16) -> Self {
        self.config.address = address;
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Handles requests no route accepts; without one they get `404 Not Found`.
    #[must_use]
    pub fn default_handler(mut self, request_handler: impl RequestHandler + 'static) -> Self {
        self.default_handler = Some(Box::new(request_handler));
        self
    }

    #[must_use]
    pub fn tls(mut self, tls: ServerTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(Option<&RequestHead>, &HttpError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(observer));
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let router = self.router.ok_or(ServerBuildError::MissingRouter)?;
        let dispatcher = Dispatcher { router, default_handler: self.default_handler };

        let mut builder = HttpServer::builder().config(self.config).shared_handler(Arc::new(dispatcher));
        if let Some(tls) = self.tls {
            builder = builder.tls(tls);
        }
        if let Some(on_error) = self.on_error {
            builder = builder.on_error(on_error);
        }
        Ok(Server { inner: builder.build()? })
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("router must be set")]
    MissingRouter,
    #[error("invalid server setup: {0}")]
    Http(#[from] HttpError),
}

/// A router served by a [`brook_http::server::Server`].
#[derive(Debug)]
pub struct Server {
    inner: HttpServer,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn bind(&self) -> Result<SocketAddr, HttpError> {
        self.inner.bind()
    }

    pub async fn start(&self) -> Result<(), HttpError> {
        self.inner.start().await
    }

    pub fn run(self) -> Result<(), HttpError> {
        self.inner.run()
    }

    pub fn handle(&self) -> ServerHandle {
        self.inner.handle()
    }
}

/// Routes each request to the first matching item of the matched pattern.
struct Dispatcher {
    router: Router,
    default_handler: Option<Box<dyn RequestHandler>>,
}

#[async_trait]
impl Handler for Dispatcher {
    async fn call(&self, mut req: Request) -> Result<Response, BoxError> {
        let route_result = self.router.at(req.path());
        let handler = route_result.router_items().iter().find(|item| item.filter().check(&req)).map(|item| item.handler());

        match handler {
            Some(handler) => {
                req.set_path_params(route_result.into_params());
                Ok(handler.invoke(req).await)
            }
            None => match &self.default_handler {
                Some(default_handler) => Ok(default_handler.invoke(req).await),
                None => {
                    debug!(method = %req.method(), path = req.path(), "no handler matched");
                    Ok(Response::new(StatusCode::NOT_FOUND))
                }
            },
        }
    }
}
