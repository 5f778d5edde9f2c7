//! Request dispatch.
//!
//! The [`Dispatcher`] is the pipeline's public entry point, invoked once
//! per incoming request. It owns the composed [`Chain`] and the
//! [`ErrorTrap`]; its contract is total: `handle` always produces a
//! well-formed response, whatever happens inside the chain.

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};

use strata_core::RequestId;

use crate::chain::Chain;
use crate::context::Context;
use crate::registry::Registry;
use crate::trap::ErrorTrap;
use crate::types::{error_envelope, Request, Response};

/// Header used to propagate request IDs across services.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The pipeline entry point.
///
/// Built once at startup from a fully populated [`Registry`]; the
/// registry can be discarded (or mutated for another dispatcher)
/// afterwards without affecting this one.
///
/// # Example
///
/// ```
/// use strata_pipeline::{Dispatcher, ErrorTrap, Registry};
///
/// let registry = Registry::new();
/// let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
/// assert!(dispatcher.chain().is_empty());
/// ```
pub struct Dispatcher {
    chain: Chain,
    trap: ErrorTrap,
}

impl Dispatcher {
    /// Builds a dispatcher by snapshotting the registry.
    #[must_use]
    pub fn new(registry: &Registry, trap: ErrorTrap) -> Self {
        Self {
            chain: Chain::new(registry.snapshot()),
            trap,
        }
    }

    /// Returns the composed chain.
    #[must_use]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Processes one request to a final response.
    ///
    /// Creates the per-request [`Context`], runs the chain, traps any
    /// failure, and finalizes the response descriptor. When no middleware
    /// set a status, the request fell through the whole chain and the
    /// response defaults to 404 Not Found.
    ///
    /// Dropping the returned future (for example because the client
    /// disconnected) cancels in-flight middleware cooperatively at their
    /// next suspension point.
    pub async fn handle(&self, request: Request) -> Response {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::parse)
            .unwrap_or_default();

        let mut ctx = Context::with_request_id(request, request_id);
        tracing::debug!(
            request_id = %request_id,
            method = %ctx.method(),
            path = ctx.path(),
            "dispatching request"
        );

        let mut guard = self.trap.begin();
        match self.chain.run(&mut ctx).await {
            Ok(()) => guard.settle(),
            Err(error) => guard.capture(&mut ctx, &error),
        }

        let fell_through = ctx.response().status().is_none();
        let fallback_body = error_envelope(
            "NOT_FOUND",
            "the requested resource was not found",
            &request_id.to_string(),
        );

        let mut response = ctx.finish(StatusCode::NOT_FOUND, fallback_body);
        if fell_through {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{BoxFuture, Middleware, Next};
    use bytes::Bytes;
    use strata_core::{StrataError, StrataResult};

    fn make_request(path: &str) -> Request {
        http::Request::builder()
            .uri(path)
            .body(Bytes::new())
            .unwrap()
    }

    struct Ok200;

    impl Middleware for Ok200 {
        fn name(&self) -> &'static str {
            "ok200"
        }

        fn handle<'a>(
            &'a self,
            ctx: &'a mut Context,
            _next: Next<'a>,
        ) -> BoxFuture<'a, StrataResult<()>> {
            Box::pin(async move {
                ctx.response_mut().set_status(StatusCode::OK);
                ctx.response_mut().set_body("ok");
                Ok(())
            })
        }
    }

    struct Failing;

    impl Middleware for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn handle<'a>(
            &'a self,
            _ctx: &'a mut Context,
            _next: Next<'a>,
        ) -> BoxFuture<'a, StrataResult<()>> {
            Box::pin(async move { Err(StrataError::internal("stage exploded")) })
        }
    }

    #[tokio::test]
    async fn test_empty_registry_defaults_to_not_found() {
        let dispatcher = Dispatcher::new(&Registry::new(), ErrorTrap::new());
        let response = dispatcher.handle(make_request("/anything")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_middleware_response_is_returned_as_is() {
        let mut registry = Registry::new();
        registry.register(Ok200).unwrap();

        let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
        let response = dispatcher.handle(make_request("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_failure_is_trapped_not_propagated() {
        let mut registry = Registry::new();
        registry.register(Failing).unwrap();

        let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
        let response = dispatcher.handle(make_request("/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_response_carries_request_id_header() {
        let dispatcher = Dispatcher::new(&Registry::new(), ErrorTrap::new());
        let response = dispatcher.handle(make_request("/")).await;
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_request_id_propagated_from_header() {
        let upstream_id = RequestId::new();
        let request = http::Request::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, upstream_id.to_string())
            .body(Bytes::new())
            .unwrap();

        let dispatcher = Dispatcher::new(&Registry::new(), ErrorTrap::new());
        let response = dispatcher.handle(request).await;

        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            &upstream_id.to_string()
        );
    }

    #[tokio::test]
    async fn test_registration_after_build_has_no_effect() {
        let mut registry = Registry::new();
        let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());

        registry.register(Ok200).unwrap();

        // The dispatcher snapshotted an empty registry; the late stage
        // never runs.
        let response = dispatcher.handle(make_request("/")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(dispatcher.chain().is_empty());
    }
}
