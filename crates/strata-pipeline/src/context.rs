//! Per-request context.
//!
//! The [`Context`] is the single mutable object threaded through every
//! middleware invocation for one request/response cycle. It carries the
//! incoming request, the outgoing response under construction, and a typed
//! extension store that middleware use to hand values downstream (a decoded
//! body, a cross-origin decision, extracted route parameters).
//!
//! A `Context` is created by the [`Dispatcher`](crate::Dispatcher) when a
//! request arrives, is owned exclusively by that request's chain, and is
//! consumed when the response is finalized. It is never shared or reused
//! across requests.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use http_body_util::Full;

use strata_core::RequestId;

use crate::types::{Request, Response};

/// The outgoing response under construction.
///
/// `status == None` means no middleware has produced a response yet; the
/// dispatcher maps that terminal condition to 404 Not Found.
#[derive(Debug, Default)]
pub struct ResponseParts {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseParts {
    /// Returns the status, if any middleware has set one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns mutable access to the response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Inserts a response header, replacing any previous value.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Returns the response body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Sets the response body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }
}

/// Mutable per-request state shared by all middleware in one invocation.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use http::StatusCode;
/// use strata_pipeline::Context;
///
/// let request = http::Request::builder()
///     .uri("/hello")
///     .body(Bytes::new())
///     .unwrap();
///
/// let mut ctx = Context::new(request);
/// ctx.response_mut().set_status(StatusCode::OK);
/// ctx.response_mut().set_body("hello");
/// assert_eq!(ctx.response().status(), Some(StatusCode::OK));
/// ```
pub struct Context {
    /// Immutable parts of the incoming request.
    request: Parts,

    /// The collected request body.
    body: Bytes,

    /// The outgoing response under construction.
    response: ResponseParts,

    /// Unique identifier for this request.
    request_id: RequestId,

    /// When the request started processing.
    started_at: Instant,

    /// Type-erased extension data for inter-middleware communication.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,

    /// Set once by the dispatcher when the response is finalized.
    settled: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The extension store is type-erased and cannot be printed.
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("method", &self.request.method)
            .field("path", &self.request.uri.path())
            .field("response", &self.response)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a context for one incoming request with a fresh request ID.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self::with_request_id(request, RequestId::new())
    }

    /// Creates a context with a specific request ID.
    ///
    /// Useful when the ID was propagated from an upstream service.
    #[must_use]
    pub fn with_request_id(request: Request, request_id: RequestId) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            request: parts,
            body,
            response: ResponseParts::default(),
            request_id,
            started_at: Instant::now(),
            extensions: HashMap::new(),
            settled: false,
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.request.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.request.uri.path()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    /// Returns a request header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn request_header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the collected request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the response under construction.
    #[must_use]
    pub fn response(&self) -> &ResponseParts {
        &self.response
    }

    /// Returns mutable access to the response under construction.
    pub fn response_mut(&mut self) -> &mut ResponseParts {
        &mut self.response
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Returns `true` once the dispatcher has finalized the response.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Stores a typed extension value.
    ///
    /// Extensions let a middleware hand arbitrary data to later stages or
    /// to the route handler.
    ///
    /// # Example
    ///
    /// ```
    /// use bytes::Bytes;
    /// use strata_pipeline::Context;
    ///
    /// #[derive(Clone)]
    /// struct ParsedQuery(Vec<(String, String)>);
    ///
    /// let request = http::Request::builder().uri("/").body(Bytes::new()).unwrap();
    /// let mut ctx = Context::new(request);
    /// ctx.set_extension(ParsedQuery(vec![]));
    /// assert!(ctx.has_extension::<ParsedQuery>());
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    ///
    /// Returns `None` if no extension of the given type was stored.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }

    /// Finalizes the context into an HTTP response.
    ///
    /// Defaults the status to the given fallback when no middleware set
    /// one, and marks the context settled. Called once per request by the
    /// dispatcher.
    pub(crate) fn finish(mut self, fallback: StatusCode, fallback_body: Bytes) -> Response {
        self.settled = true;

        let (status, body) = match self.response.status {
            Some(status) => (status, self.response.body),
            None => (fallback, fallback_body),
        };

        let mut builder = http::Response::builder().status(status);
        if let Some(headers) = builder.headers_mut() {
            std::mem::swap(headers, &mut self.response.headers);
        }

        builder
            .body(Full::new(body))
            .unwrap_or_else(|_| http::Response::new(Full::new(Bytes::new())))
    }
}
