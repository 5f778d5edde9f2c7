//! Application router middleware.
//!
//! The router is the terminal stage of a typical pipeline: it matches the
//! request against its route table and invokes the matching handler,
//! which writes the response onto the context. When no route matches it
//! delegates downstream; with the router registered last, the chain then
//! settles without a response and the dispatcher's 404 default applies.
//!
//! Patterns are `/`-separated segments, either static (`/users`) or named
//! captures (`/users/{id}`). A static segment always wins over a capture
//! for the same position.
//!
//! # Example
//!
//! ```rust
//! use strata_core::StrataResult;
//! use strata_pipeline::{BoxFuture, Context};
//! use strata_server::{Params, Router};
//! use http::StatusCode;
//!
//! fn get_user<'a>(ctx: &'a mut Context, params: Params) -> BoxFuture<'a, StrataResult<()>> {
//!     Box::pin(async move {
//!         let id = params.get("id").unwrap_or("unknown").to_string();
//!         ctx.response_mut().set_status(StatusCode::OK);
//!         ctx.response_mut().set_body(id);
//!         Ok(())
//!     })
//! }
//!
//! let router = Router::new().get("/users/{id}", get_user);
//! ```

use std::sync::Arc;

use http::Method;

use strata_core::StrataResult;
use strata_pipeline::{BoxFuture, Context, Middleware, Next};

/// Path parameters captured while matching a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Returns the captured value for a parameter name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no parameters were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn push(&mut self, name: &str, value: &str) {
        self.0.push((name.to_string(), value.to_string()));
    }
}

/// A route handler: writes the response onto the context.
pub type RouteHandler = Arc<
    dyn for<'a> Fn(&'a mut Context, Params) -> BoxFuture<'a, StrataResult<()>> + Send + Sync,
>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

struct Route {
    method: Method,
    segments: Vec<Segment>,
    handler: RouteHandler,
}

impl Route {
    /// Matches the route against path segments, capturing parameters.
    ///
    /// Returns the captures plus the number of static segments matched,
    /// used to rank competing candidates.
    fn matches(&self, method: &Method, path_segments: &[&str]) -> Option<(Params, usize)> {
        if &self.method != method || self.segments.len() != path_segments.len() {
            return None;
        }

        let mut params = Params::default();
        let mut static_hits = 0;
        for (segment, part) in self.segments.iter().zip(path_segments) {
            match segment {
                Segment::Static(expected) => {
                    if expected != part {
                        return None;
                    }
                    static_hits += 1;
                }
                Segment::Param(name) => params.push(name, part),
            }
        }

        Some((params, static_hits))
    }
}

/// The application router, used as a terminal pipeline stage.
pub struct Router {
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Adds a route for an arbitrary method.
    #[must_use]
    pub fn route<H>(mut self, method: Method, pattern: &str, handler: H) -> Self
    where
        H: for<'a> Fn(&'a mut Context, Params) -> BoxFuture<'a, StrataResult<()>>
            + Send
            + Sync
            + 'static,
    {
        let segments = Self::parse_pattern(pattern);
        self.routes.push(Route {
            method,
            segments,
            handler: Arc::new(handler),
        });
        self
    }

    /// Adds a GET route.
    #[must_use]
    pub fn get<H>(self, pattern: &str, handler: H) -> Self
    where
        H: for<'a> Fn(&'a mut Context, Params) -> BoxFuture<'a, StrataResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.route(Method::GET, pattern, handler)
    }

    /// Adds a POST route.
    #[must_use]
    pub fn post<H>(self, pattern: &str, handler: H) -> Self
    where
        H: for<'a> Fn(&'a mut Context, Params) -> BoxFuture<'a, StrataResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.route(Method::POST, pattern, handler)
    }

    /// Adds a PUT route.
    #[must_use]
    pub fn put<H>(self, pattern: &str, handler: H) -> Self
    where
        H: for<'a> Fn(&'a mut Context, Params) -> BoxFuture<'a, StrataResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.route(Method::PUT, pattern, handler)
    }

    /// Adds a DELETE route.
    #[must_use]
    pub fn delete<H>(self, pattern: &str, handler: H) -> Self
    where
        H: for<'a> Fn(&'a mut Context, Params) -> BoxFuture<'a, StrataResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.route(Method::DELETE, pattern, handler)
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    fn parse_pattern(pattern: &str) -> Vec<Segment> {
        pattern
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.strip_prefix('{')
                    .and_then(|p| p.strip_suffix('}'))
                    .map_or_else(
                        || Segment::Static(part.to_string()),
                        |name| Segment::Param(name.to_string()),
                    )
            })
            .collect()
    }

    /// Finds the best-matching route for a request.
    ///
    /// Among the candidates, the route matching the most static segments
    /// wins; the earliest-registered route breaks remaining ties.
    fn match_route(&self, method: &Method, path: &str) -> Option<(&Route, Params)> {
        let path_segments: Vec<&str> =
            path.split('/').filter(|part| !part.is_empty()).collect();

        let mut best: Option<(&Route, Params, usize)> = None;
        for route in &self.routes {
            if let Some((params, static_hits)) = route.matches(method, &path_segments) {
                let better = best
                    .as_ref()
                    .map_or(true, |(_, _, best_hits)| static_hits > *best_hits);
                if better {
                    best = Some((route, params, static_hits));
                }
            }
        }

        best.map(|(route, params, _)| (route, params))
    }
}

impl Middleware for Router {
    fn name(&self) -> &'static str {
        "router"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            let method = ctx.method().clone();
            let path = ctx.path().to_string();

            match self.match_route(&method, &path) {
                Some((route, params)) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        method = %method,
                        path = path,
                        "route matched"
                    );
                    (route.handler)(ctx, params).await
                }
                None => next.run(ctx).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;

    fn make_context(method: &str, path: &str) -> Context {
        let request = http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap();
        Context::new(request)
    }

    fn respond_listed<'a>(
        ctx: &'a mut Context,
        _params: Params,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            ctx.response_mut().set_status(StatusCode::OK);
            ctx.response_mut().set_body("listed");
            Ok(())
        })
    }

    fn respond_current<'a>(
        ctx: &'a mut Context,
        _params: Params,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            ctx.response_mut().set_status(StatusCode::OK);
            ctx.response_mut().set_body("current");
            Ok(())
        })
    }

    fn respond_healthy<'a>(
        ctx: &'a mut Context,
        _params: Params,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            ctx.response_mut().set_status(StatusCode::OK);
            ctx.response_mut().set_body("healthy");
            Ok(())
        })
    }

    fn echo_param<'a>(ctx: &'a mut Context, params: Params) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            let id = params.get("id").unwrap_or("none").to_string();
            ctx.response_mut().set_status(StatusCode::OK);
            ctx.response_mut().set_body(id);
            Ok(())
        })
    }

    async fn run(router: &Router, ctx: &mut Context) -> StrataResult<()> {
        let next = Next::terminal("router");
        router.handle(ctx, next).await
    }

    #[tokio::test]
    async fn test_static_route_match() {
        let router = Router::new().get("/health", respond_healthy);
        let mut ctx = make_context("GET", "/health");

        run(&router, &mut ctx).await.unwrap();
        assert_eq!(ctx.response().status(), Some(StatusCode::OK));
        assert_eq!(ctx.response().body().as_ref(), b"healthy");
    }

    #[tokio::test]
    async fn test_param_capture() {
        let router = Router::new().get("/users/{id}", echo_param);
        let mut ctx = make_context("GET", "/users/42");

        run(&router, &mut ctx).await.unwrap();
        assert_eq!(ctx.response().body().as_ref(), b"42");
    }

    #[tokio::test]
    async fn test_static_wins_over_param() {
        let router = Router::new()
            .get("/users/{id}", echo_param)
            .get("/users/me", respond_current);
        let mut ctx = make_context("GET", "/users/me");

        run(&router, &mut ctx).await.unwrap();
        assert_eq!(ctx.response().body().as_ref(), b"current");
    }

    #[tokio::test]
    async fn test_method_mismatch_falls_through() {
        let router = Router::new().get("/users", respond_listed);
        let mut ctx = make_context("POST", "/users");

        run(&router, &mut ctx).await.unwrap();
        assert!(ctx.response().status().is_none());
    }

    #[tokio::test]
    async fn test_no_match_falls_through() {
        let router = Router::new().get("/users", respond_listed);
        let mut ctx = make_context("GET", "/missing");

        run(&router, &mut ctx).await.unwrap();
        assert!(ctx.response().status().is_none());
    }

    #[tokio::test]
    async fn test_segment_count_must_match() {
        let router = Router::new().get("/users/{id}", echo_param);
        let mut ctx = make_context("GET", "/users/42/posts");

        run(&router, &mut ctx).await.unwrap();
        assert!(ctx.response().status().is_none());
    }

    #[tokio::test]
    async fn test_trailing_slash_is_equivalent() {
        let router = Router::new().get("/users", respond_listed);
        let mut ctx = make_context("GET", "/users/");

        run(&router, &mut ctx).await.unwrap();
        assert_eq!(ctx.response().status(), Some(StatusCode::OK));
    }

    #[test]
    fn test_params_accessors() {
        let mut params = Params::default();
        params.push("id", "42");
        params.push("section", "posts");

        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.len(), 2);
        assert!(!params.is_empty());
        assert_eq!(
            params.iter().collect::<Vec<_>>(),
            vec![("id", "42"), ("section", "posts")]
        );
    }

    #[test]
    fn test_pattern_parsing() {
        let router = Router::new()
            .get("/a/{b}/c", respond_healthy)
            .post("/a", respond_listed);
        assert_eq!(router.route_count(), 2);
    }
}
