//! Request body decoding middleware.
//!
//! Decodes the collected request body according to its content type and
//! stores the result as a [`DecodedBody`] extension for downstream stages
//! and route handlers. Enforces a configurable size limit before any
//! parsing happens.
//!
//! This stage never short-circuits on success: after decoding it always
//! delegates downstream.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use http::Method;

use strata_core::{StrataError, StrataResult};

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Default body size limit: 1 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// The decoded request body, stored as a context extension.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    /// `application/json` (or `+json` suffixed) body.
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` body.
    Form(HashMap<String, String>),
    /// `text/*` body decoded as UTF-8.
    Text(String),
    /// Any other content type, passed through untouched.
    Raw(Bytes),
    /// The request carried no body.
    Empty,
}

/// Body decoding middleware.
///
/// # Example
///
/// ```
/// use strata_pipeline::stages::BodyDecoder;
///
/// let decoder = BodyDecoder::new().limit(64 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct BodyDecoder {
    limit_bytes: usize,
    methods: HashSet<Method>,
}

impl Default for BodyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyDecoder {
    /// Creates a decoder with the default 1 MiB limit, applied to the
    /// methods that conventionally carry bodies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            limit_bytes: DEFAULT_BODY_LIMIT,
            methods: HashSet::from([Method::POST, Method::PUT, Method::PATCH, Method::DELETE]),
        }
    }

    /// Sets the maximum accepted body size in bytes.
    #[must_use]
    pub fn limit(mut self, limit_bytes: usize) -> Self {
        self.limit_bytes = limit_bytes;
        self
    }

    /// Sets the methods whose bodies are decoded.
    #[must_use]
    pub fn methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Decodes the context's body according to its content type.
    fn decode(&self, ctx: &Context) -> StrataResult<DecodedBody> {
        let body = ctx.body();
        if body.len() > self.limit_bytes {
            return Err(StrataError::PayloadTooLarge {
                limit_bytes: self.limit_bytes,
            });
        }
        if body.is_empty() {
            return Ok(DecodedBody::Empty);
        }

        let content_type = ctx
            .request_header(http::header::CONTENT_TYPE)
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        if content_type == "application/json" || content_type.ends_with("+json") {
            let value = serde_json::from_slice(body).map_err(|e| {
                StrataError::validation(format!("malformed JSON body: {e}"))
            })?;
            return Ok(DecodedBody::Json(value));
        }

        if content_type == "application/x-www-form-urlencoded" {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_bytes(body).map_err(|e| {
                    StrataError::validation(format!("malformed form body: {e}"))
                })?;
            return Ok(DecodedBody::Form(pairs.into_iter().collect()));
        }

        if content_type.starts_with("text/") {
            let text = std::str::from_utf8(body).map_err(|e| {
                StrataError::validation(format!("text body is not valid UTF-8: {e}"))
            })?;
            return Ok(DecodedBody::Text(text.to_string()));
        }

        Ok(DecodedBody::Raw(body.clone()))
    }
}

impl Middleware for BodyDecoder {
    fn name(&self) -> &'static str {
        "body_decoder"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            if self.methods.contains(ctx.method()) {
                let decoded = self.decode(ctx)?;
                tracing::trace!(
                    request_id = %ctx.request_id(),
                    bytes = ctx.body().len(),
                    "decoded request body"
                );
                ctx.set_extension(decoded);
            }
            next.run(ctx).await
        })
    }
}
