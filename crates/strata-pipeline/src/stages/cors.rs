//! Cross-origin resource sharing middleware.
//!
//! Handles preflight requests and injects access-control headers into
//! responses based on configured allowed-origin rules.
//!
//! A preflight request (`OPTIONS` with `Origin` and
//! `Access-Control-Request-Method` headers) is answered directly with
//! 204 No Content and never reaches downstream stages. A preflight from
//! a disallowed origin, or requesting a disallowed method or header,
//! fails with [`StrataError::Forbidden`] and is mapped to a 403 envelope
//! by the error trap.
//!
//! For every other request the middleware records its [`CorsDecision`] on
//! the context, delegates downstream, and adds the response headers on
//! the unwind path once the rest of the chain has settled.

use std::collections::HashSet;
use std::time::Duration;

use http::{HeaderValue, Method, StatusCode};

use strata_core::{StrataError, StrataResult};

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// The set of origins a [`Cors`] stage accepts.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    /// Allow any origin (wildcard `*`).
    Any,
    /// Allow specific origins.
    List(HashSet<String>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    /// Returns the `Access-Control-Allow-Origin` value for an origin.
    fn header_value(&self, origin: &str) -> Option<HeaderValue> {
        match self {
            Self::Any => Some(HeaderValue::from_static("*")),
            Self::List(origins) => {
                if origins.contains(origin) {
                    HeaderValue::from_str(origin).ok()
                } else {
                    None
                }
            }
        }
    }
}

/// The cross-origin decision recorded for each non-preflight request,
/// available to downstream stages and handlers as a context extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsDecision {
    /// The request carried no `Origin` header; CORS does not apply.
    NotApplicable,
    /// The origin is in the allowed set; headers will be injected.
    Allowed {
        /// The requesting origin.
        origin: String,
    },
    /// The origin is not allowed; the response carries no CORS headers.
    Disallowed {
        /// The requesting origin.
        origin: String,
    },
}

/// CORS middleware configuration and stage.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use http::Method;
/// use strata_pipeline::stages::Cors;
///
/// let cors = Cors::builder()
///     .allow_origin("https://app.example.com")
///     .allow_methods([Method::GET, Method::POST])
///     .allow_headers(["content-type", "authorization"])
///     .allow_credentials(true)
///     .max_age(Duration::from_secs(3600))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct Cors {
    allowed_origins: AllowedOrigins,
    allowed_methods: HashSet<Method>,
    allowed_headers: HashSet<String>,
    expose_headers: HashSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Cors {
    /// Creates a new CORS builder with conservative defaults
    /// (no origins allowed until configured).
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::default()
    }

    /// Creates a permissive stage that allows any origin.
    ///
    /// **Warning**: development only.
    #[must_use]
    pub fn permissive() -> Self {
        CorsBuilder::default()
            .allow_any_origin()
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ])
            .allow_headers(["*"])
            .build()
    }

    /// Checks if a request is a CORS preflight request.
    fn is_preflight(ctx: &Context) -> bool {
        ctx.method() == Method::OPTIONS
            && ctx.request_headers().contains_key(headers::ORIGIN)
            && ctx.request_headers().contains_key(headers::REQUEST_METHOD)
    }

    /// Validates a preflight request and writes the 204 response.
    fn handle_preflight(&self, ctx: &mut Context) -> StrataResult<()> {
        let origin = ctx
            .request_header(headers::ORIGIN)
            .map(String::from)
            .ok_or_else(|| StrataError::forbidden("missing Origin header"))?;

        if !self.allowed_origins.is_allowed(&origin) {
            return Err(StrataError::forbidden(format!(
                "origin `{origin}` is not allowed"
            )));
        }

        if let Some(requested) = ctx.request_header(headers::REQUEST_METHOD) {
            if let Ok(method) = requested.parse::<Method>() {
                if !self.allowed_methods.contains(&method) {
                    return Err(StrataError::forbidden(format!(
                        "method `{method}` is not allowed"
                    )));
                }
            }
        }

        if let Some(requested) = ctx.request_header(headers::REQUEST_HEADERS) {
            let requested = requested.to_string();
            for name in requested.split(',').map(|h| h.trim().to_lowercase()) {
                if self.allowed_headers.contains("*") {
                    continue;
                }
                if !self.allowed_headers.contains(&name) {
                    return Err(StrataError::forbidden(format!(
                        "header `{name}` is not allowed"
                    )));
                }
            }
        }

        self.write_preflight_response(ctx, &origin);
        Ok(())
    }

    /// Writes the 204 No Content preflight response onto the context.
    fn write_preflight_response(&self, ctx: &mut Context, origin: &str) {
        let allow_origin = self.allowed_origins.header_value(origin);
        let response = ctx.response_mut();
        response.set_status(StatusCode::NO_CONTENT);

        if let Some(value) = allow_origin {
            if let Ok(name) = headers::ALLOW_ORIGIN.parse::<http::HeaderName>() {
                response.insert_header(name, value);
            }
        }

        let mut methods: Vec<_> = self
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect();
        methods.sort_unstable();
        Self::insert(response, headers::ALLOW_METHODS, &methods.join(", "));

        let mut allow_headers: Vec<_> =
            self.allowed_headers.iter().map(String::as_str).collect();
        allow_headers.sort_unstable();
        if !allow_headers.is_empty() {
            Self::insert(response, headers::ALLOW_HEADERS, &allow_headers.join(", "));
        }

        if self.allow_credentials {
            Self::insert(response, headers::ALLOW_CREDENTIALS, "true");
        }

        if let Some(max_age) = self.max_age {
            Self::insert(response, headers::MAX_AGE, &max_age.as_secs().to_string());
        }

        Self::insert(
            response,
            headers::VARY,
            "Origin, Access-Control-Request-Method, Access-Control-Request-Headers",
        );
    }

    /// Adds CORS headers to a settled response for non-preflight requests.
    fn apply_response_headers(&self, ctx: &mut Context, origin: &str) {
        let allow_origin = self.allowed_origins.header_value(origin);
        let response = ctx.response_mut();

        if let Some(value) = allow_origin {
            if let Ok(name) = headers::ALLOW_ORIGIN.parse::<http::HeaderName>() {
                response.insert_header(name, value);
            }
        }

        if self.allow_credentials {
            Self::insert(response, headers::ALLOW_CREDENTIALS, "true");
        }

        let mut expose: Vec<_> = self.expose_headers.iter().map(String::as_str).collect();
        expose.sort_unstable();
        if !expose.is_empty() {
            Self::insert(response, headers::EXPOSE_HEADERS, &expose.join(", "));
        }

        Self::insert(response, headers::VARY, "Origin");
    }

    fn insert(response: &mut crate::context::ResponseParts, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            name.parse::<http::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            response.insert_header(name, value);
        }
    }
}

impl Middleware for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            if Self::is_preflight(ctx) {
                // Preflight never reaches downstream stages.
                return self.handle_preflight(ctx);
            }

            let origin = ctx.request_header(headers::ORIGIN).map(String::from);
            let decision = match &origin {
                None => CorsDecision::NotApplicable,
                Some(origin) if self.allowed_origins.is_allowed(origin) => {
                    CorsDecision::Allowed {
                        origin: origin.clone(),
                    }
                }
                Some(origin) => CorsDecision::Disallowed {
                    origin: origin.clone(),
                },
            };
            let allowed = matches!(decision, CorsDecision::Allowed { .. });
            ctx.set_extension(decision);

            next.run(ctx).await?;

            if allowed {
                if let Some(origin) = origin {
                    self.apply_response_headers(ctx, &origin);
                }
            }
            Ok(())
        })
    }
}

/// Builder for the [`Cors`] stage.
#[derive(Debug, Clone)]
pub struct CorsBuilder {
    allowed_origins: AllowedOrigins,
    allowed_methods: HashSet<Method>,
    allowed_headers: HashSet<String>,
    expose_headers: HashSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsBuilder {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::List(HashSet::new()),
            allowed_methods: HashSet::from([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ]),
            allowed_headers: HashSet::from([
                "content-type".to_string(),
                "authorization".to_string(),
                "x-request-id".to_string(),
            ]),
            expose_headers: HashSet::new(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }
}

impl CorsBuilder {
    /// Allows any origin (wildcard `*`).
    ///
    /// **Warning**: browsers reject `*` combined with credentials.
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.allowed_origins = AllowedOrigins::Any;
        self
    }

    /// Adds an allowed origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        match &mut self.allowed_origins {
            AllowedOrigins::Any => {}
            AllowedOrigins::List(origins) => {
                origins.insert(origin.into());
            }
        }
        self
    }

    /// Replaces the allowed-origin set.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins =
            AllowedOrigins::List(origins.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the allowed HTTP methods.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    /// Sets the allowed request headers.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers = headers
            .into_iter()
            .map(|h| h.into().to_lowercase())
            .collect();
        self
    }

    /// Sets the headers exposed to browser JavaScript.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expose_headers = headers
            .into_iter()
            .map(|h| h.into().to_lowercase())
            .collect();
        self
    }

    /// Sets whether to allow credentials (cookies, authorization headers).
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Sets the preflight cache duration.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.max_age = Some(duration);
        self
    }

    /// Builds the CORS stage.
    #[must_use]
    pub fn build(self) -> Cors {
        Cors {
            allowed_origins: self.allowed_origins,
            allowed_methods: self.allowed_methods,
            allowed_headers: self.allowed_headers,
            expose_headers: self.expose_headers,
            allow_credentials: self.allow_credentials,
            max_age: self.max_age,
        }
    }
}
