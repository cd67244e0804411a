//! Request predicates that pick between handlers registered on one route.

use std::fmt;

use brook_http::protocol::Request;
use http::Method;

pub trait Filter: Send + Sync {
    fn check(&self, req: &Request) -> bool;
}

struct FnFilter<F: Fn(&Request) -> bool>(F);

impl<F: Fn(&Request) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn check(&self, req: &Request) -> bool {
        (self.0)(req)
    }
}

pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&Request) -> bool + Send + Sync,
{
    FnFilter(f)
}

pub fn always() -> TrueFilter {
    TrueFilter
}

#[derive(Debug, Clone, Copy)]
pub struct TrueFilter;

impl Filter for TrueFilter {
    #[inline]
    fn check(&self, _req: &Request) -> bool {
        true
    }
}

pub fn any_filter() -> AnyFilter {
    AnyFilter::default()
}

/// Passes when any inner filter passes, or when there are none.
#[derive(Default)]
pub struct AnyFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AnyFilter {
    pub fn or<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl fmt::Debug for AnyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyFilter").field("filters", &self.filters.len()).finish()
    }
}

impl Filter for AnyFilter {
    fn check(&self, req: &Request) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|filter| filter.check(req))
    }
}

pub fn all_filter() -> AllFilter {
    AllFilter::default()
}

/// Passes when every inner filter passes.
#[derive(Default)]
pub struct AllFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AllFilter {
    pub fn and<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl fmt::Debug for AllFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllFilter").field("filters", &self.filters.len()).finish()
    }
}

impl Filter for AllFilter {
    fn check(&self, req: &Request) -> bool {
        self.filters.iter().all(|filter| filter.check(req))
    }
}

#[derive(Debug, Clone)]
pub struct MethodFilter(Method);

impl Filter for MethodFilter {
    fn check(&self, req: &Request) -> bool {
        self.0 == *req.method()
    }
}

macro_rules! method_filter {
    ($method:ident, $upper_case_method:ident) => {
        #[inline]
        pub fn $method() -> MethodFilter {
            MethodFilter(Method::$upper_case_method)
        }
    };
}

method_filter!(get_method, GET);
method_filter!(post_method, POST);
method_filter!(put_method, PUT);
method_filter!(delete_method, DELETE);
method_filter!(head_method, HEAD);
method_filter!(options_method, OPTIONS);
method_filter!(connect_method, CONNECT);
method_filter!(patch_method, PATCH);
method_filter!(trace_method, TRACE);

/// Matches a header value exactly; the name is compared case-insensitively.
pub fn header<N: Into<String>, V: Into<String>>(name: N, value: V) -> HeaderFilter {
    HeaderFilter { name: name.into(), value: value.into() }
}

#[derive(Debug, Clone)]
pub struct HeaderFilter {
    name: String,
    value: String,
}

impl Filter for HeaderFilter {
    fn check(&self, req: &Request) -> bool {
        req.header().equal_range(&self.name).any(|value| value == self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_http::protocol::RequestHead;
    use bytes::Bytes;

    fn request(method: Method, content_type: Option<&str>) -> Request {
        let mut head = RequestHead::new(method, "/");
        if let Some(content_type) = content_type {
            head.header.insert("Content-Type", content_type);
        }
        Request::new(head, Bytes::new())
    }

    #[test]
    fn method_and_header() {
        let mut filter = all_filter();
        filter.and(post_method()).and(header("content-type", "application/json"));

        assert!(filter.check(&request(Method::POST, Some("application/json"))));
        assert!(!filter.check(&request(Method::POST, Some("text/plain"))));
        assert!(!filter.check(&request(Method::GET, Some("application/json"))));
    }

    #[test]
    fn any_of() {
        let mut filter = any_filter();
        assert!(filter.check(&request(Method::PUT, None)));

        filter.or(get_method()).or(head_method());
        assert!(filter.check(&request(Method::HEAD, None)));
        assert!(!filter.check(&request(Method::PUT, None)));
        assert!(fn_filter(|req| req.path() == "/").check(&request(Method::PUT, None)));
    }
}
