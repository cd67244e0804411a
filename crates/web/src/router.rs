use std::collections::HashMap;
use std::fmt;

use brook_http::protocol::PathParams;
use tracing::trace;

use crate::filter::{self, AllFilter, Filter};
use crate::handler::RequestHandler;

type InnerRouter<T> = matchit::Router<T>;

/// Maps path patterns such as `/match/{id}` to handlers.
///
/// Each pattern holds a list of items in registration order; the first item
/// whose filter accepts the request handles it.
pub struct Router {
    inner_router: InnerRouter<Vec<RouterItem>>,
}

pub struct RouterItem {
    filter: AllFilter,
    handler: Box<dyn RequestHandler>,
}

/// The items registered for a matched pattern, with the captured parameters.
pub struct RouteResult<'router> {
    router_items: &'router [RouterItem],
    params: PathParams,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    pub fn at(&self, path: &str) -> RouteResult<'_> {
        match self.inner_router.at(path) {
            Ok(matched) => {
                let mut params = PathParams::new();
                for (name, value) in matched.params.iter() {
                    params.push(name, value);
                }
                RouteResult { router_items: matched.value.as_slice(), params }
            }
            Err(e) => {
                trace!(path, cause = %e, "no route");
                RouteResult { router_items: &[], params: PathParams::new() }
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl RouterItem {
    pub fn filter(&self) -> &dyn Filter {
        &self.filter
    }

    pub fn handler(&self) -> &dyn RequestHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for RouterItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterItem").field("filter", &self.filter).finish_non_exhaustive()
    }
}

impl<'router> RouteResult<'router> {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.router_items.is_empty()
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn into_params(self) -> PathParams {
        self.params
    }

    pub fn router_items(&self) -> &'router [RouterItem] {
        self.router_items
    }
}

impl fmt::Debug for RouteResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteResult").field("items", &self.router_items.len()).field("params", &self.params).finish()
    }
}

#[derive(Default)]
pub struct RouterBuilder {
    data: HashMap<String, Vec<RouterItemBuilder>>,
    order: Vec<String>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder").field("routes", &self.order).finish()
    }
}

impl RouterBuilder {
    #[must_use]
    pub fn route(mut self, route: impl Into<String>, item_builder: RouterItemBuilder) -> Self {
        let route = route.into();
        if !self.data.contains_key(&route) {
            self.order.push(route.clone());
        }
        self.data.entry(route).or_default().push(item_builder);
        self
    }

    /// Fails when a pattern is malformed or conflicts with another one.
    pub fn build(mut self) -> Result<Router, matchit::InsertError> {
        let mut inner_router = InnerRouter::new();

        for path in self.order {
            let items = self.data.remove(&path).unwrap_or_default();
            let router_items = items.into_iter().map(RouterItemBuilder::build).collect::<Vec<_>>();
            inner_router.insert(path, router_items)?;
        }

        Ok(Router { inner_router })
    }
}

macro_rules! method_router_filter {
    ($method:ident, $method_name:ident) => {
        pub fn $method<H: RequestHandler + 'static>(handler: H) -> RouterItemBuilder {
            let mut filters = filter::all_filter();
            filters.and(filter::$method_name());
            RouterItemBuilder { filters, handler: Box::new(handler) }
        }
    };
}

method_router_filter!(get, get_method);
method_router_filter!(post, post_method);
method_router_filter!(put, put_method);
method_router_filter!(delete, delete_method);
method_router_filter!(head, head_method);
method_router_filter!(options, options_method);
method_router_filter!(connect, connect_method);
method_router_filter!(patch, patch_method);
method_router_filter!(trace, trace_method);

/// Accepts every method.
pub fn any<H: RequestHandler + 'static>(handler: H) -> RouterItemBuilder {
    RouterItemBuilder { filters: filter::all_filter(), handler: Box::new(handler) }
}

pub struct RouterItemBuilder {
    filters: AllFilter,
    handler: Box<dyn RequestHandler>,
}

impl fmt::Debug for RouterItemBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterItemBuilder").field("filters", &self.filters).finish_non_exhaustive()
    }
}

impl RouterItemBuilder {
    #[must_use]
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.and(filter);
        self
    }

    fn build(self) -> RouterItem {
        RouterItem { filter: self.filters, handler: self.handler }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::header;
    use crate::handler_fn;
    use brook_http::protocol::{Request, RequestHead};
    use bytes::Bytes;
    use http::Method;

    async fn hello(_req: Request) -> &'static str {
        "hello world"
    }

    fn router() -> Router {
        Router::builder()
            .route("/", get(handler_fn(hello)))
            .route("/", post(handler_fn(hello)).with(header("Content-Type", "application/x-www-form-urlencoded")))
            .route("/", post(handler_fn(hello)))
            .route("/match/{number}", get(handler_fn(hello)))
            .build()
            .unwrap()
    }

    fn request(method: Method) -> Request {
        Request::new(RequestHead::new(method, "/"), Bytes::new())
    }

    #[test]
    fn route_by_method() {
        let router = router();
        let route_result = router.at("/");
        assert!(route_result.params().is_empty());

        let items = route_result.router_items();
        assert_eq!(items.len(), 3);

        let get = request(Method::GET);
        assert!(items[0].filter().check(&get));
        assert!(!items[1].filter().check(&get));
        assert!(!items[2].filter().check(&get));

        let post = request(Method::POST);
        assert!(!items[0].filter().check(&post));
        assert!(!items[1].filter().check(&post));
        assert!(items[2].filter().check(&post));
    }

    #[test]
    fn captures_params() {
        let router = router();
        let route_result = router.at("/match/123");
        assert_eq!(route_result.router_items().len(), 1);
        assert_eq!(route_result.params().get("number"), Some("123"));

        assert!(router.at("/nowhere").is_empty());
    }

    #[test]
    fn conflicting_patterns() {
        let result = Router::builder().route("/{a}", get(handler_fn(hello))).route("/{b}", get(handler_fn(hello))).build();
        assert!(result.is_err());
    }
}
