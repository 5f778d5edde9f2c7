//! Centralized error trapping.
//!
//! The [`ErrorTrap`] converts any failure that escapes the chain into a
//! well-formed response on the context, so the dispatcher's caller never
//! observes an unanswered request. It is installed as a constructor
//! argument of the [`Dispatcher`](crate::Dispatcher) rather than as a
//! registered stage: the trap wraps the whole chain structurally, so the
//! "always respond" guarantee cannot be lost by reordering registration.
//!
//! Per request the trap moves through an explicit state machine:
//!
//! ```text
//! Idle → Dispatching → Settled   (chain resolved without failure)
//!                    → Trapped   (a failure was intercepted exactly once)
//! ```
//!
//! Both `Settled` and `Trapped` are terminal; the trap never re-runs the
//! chain.
//!
//! By default failure bodies carry only the stable error code, a safe
//! message, and the request ID. Internal diagnostic detail is suppressed
//! unless [`ErrorTrap::expose_internal_errors`] is enabled, which is
//! meant for development environments only.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};

use strata_core::StrataError;

use crate::context::Context;
use crate::types::error_envelope;

/// Lifecycle of one request's trip through the trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapState {
    /// No dispatch has begun.
    Idle,
    /// The chain is executing.
    Dispatching,
    /// The chain resolved without failure. Terminal.
    Settled,
    /// A failure was intercepted and converted into a response. Terminal.
    Trapped,
}

impl TrapState {
    /// Returns `true` for the two terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Settled | Self::Trapped)
    }
}

/// Configuration for failure-to-response conversion.
#[derive(Debug, Clone)]
pub struct ErrorTrap {
    /// Whether to expose internal error details (development mode).
    expose_internal_errors: bool,
    /// Message substituted for suppressed internal errors.
    internal_error_message: String,
}

impl Default for ErrorTrap {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorTrap {
    /// Creates a trap with safe production defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            expose_internal_errors: false,
            internal_error_message: "An internal error occurred".to_string(),
        }
    }

    /// Sets whether to expose internal error details in response bodies.
    ///
    /// **Warning**: only enable this in development environments.
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Sets the message substituted for suppressed internal errors.
    #[must_use]
    pub fn internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = message.into();
        self
    }

    /// Begins tracking one request's dispatch.
    #[must_use]
    pub fn begin(&self) -> TrapGuard<'_> {
        TrapGuard {
            trap: self,
            state: TrapState::Dispatching,
        }
    }

    /// Returns the client-facing message for an error.
    fn client_message(&self, error: &StrataError) -> String {
        if error.is_internal() && !self.expose_internal_errors {
            self.internal_error_message.clone()
        } else {
            error.to_string()
        }
    }
}

/// Per-request trap state.
///
/// Created by [`ErrorTrap::begin`] when dispatch starts; driven to a
/// terminal state exactly once by the dispatcher.
pub struct TrapGuard<'a> {
    trap: &'a ErrorTrap,
    state: TrapState,
}

impl TrapGuard<'_> {
    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TrapState {
        self.state
    }

    /// Records that the chain resolved without failure.
    pub fn settle(&mut self) {
        if !self.state.is_terminal() {
            self.state = TrapState::Settled;
        }
    }

    /// Intercepts a failure and writes the mapped response onto the
    /// context, replacing any partial response a failing middleware left
    /// behind.
    ///
    /// The failure is logged exactly once; further captures for the same
    /// request are no-ops because the state is already terminal.
    pub fn capture(&mut self, ctx: &mut Context, error: &StrataError) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TrapState::Trapped;

        let status = error.status_code();
        tracing::error!(
            request_id = %ctx.request_id(),
            code = error.code(),
            status = status.as_u16(),
            error = %error,
            "request failed"
        );

        let body = error_envelope(
            error.code(),
            &self.trap.client_message(error),
            &ctx.request_id().to_string(),
        );

        let response = ctx.response_mut();
        response.set_status(status);
        // Discard headers written before the failure; the trapped response
        // must reflect the trap's mapping, not the partial mutation.
        *response.headers_mut() = HeaderMap::new();
        response.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.set_body(body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;

    fn make_context() -> Context {
        let request = http::Request::builder()
            .uri("/test")
            .body(Bytes::new())
            .unwrap();
        Context::new(request)
    }

    #[test]
    fn test_settle_is_terminal() {
        let trap = ErrorTrap::new();
        let mut guard = trap.begin();
        assert_eq!(guard.state(), TrapState::Dispatching);

        guard.settle();
        assert_eq!(guard.state(), TrapState::Settled);
        assert!(guard.state().is_terminal());
    }

    #[test]
    fn test_capture_writes_error_response() {
        let trap = ErrorTrap::new();
        let mut guard = trap.begin();
        let mut ctx = make_context();

        guard.capture(&mut ctx, &StrataError::validation("bad input"));

        assert_eq!(guard.state(), TrapState::Trapped);
        assert_eq!(ctx.response().status(), Some(StatusCode::BAD_REQUEST));

        let parsed: serde_json::Value =
            serde_json::from_slice(ctx.response().body()).unwrap();
        assert_eq!(parsed["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(parsed["error"]["message"], "validation error: bad input");
        assert_eq!(
            parsed["error"]["request_id"],
            ctx.request_id().to_string()
        );
    }

    #[test]
    fn test_internal_detail_suppressed_by_default() {
        let trap = ErrorTrap::new();
        let mut guard = trap.begin();
        let mut ctx = make_context();

        guard.capture(
            &mut ctx,
            &StrataError::internal("connection string leaked secrets"),
        );

        let parsed: serde_json::Value =
            serde_json::from_slice(ctx.response().body()).unwrap();
        assert_eq!(parsed["error"]["message"], "An internal error occurred");
    }

    #[test]
    fn test_internal_detail_exposed_when_configured() {
        let trap = ErrorTrap::new().expose_internal_errors(true);
        let mut guard = trap.begin();
        let mut ctx = make_context();

        guard.capture(&mut ctx, &StrataError::internal("boom"));

        let parsed: serde_json::Value =
            serde_json::from_slice(ctx.response().body()).unwrap();
        assert_eq!(parsed["error"]["message"], "internal error: boom");
    }

    #[test]
    fn test_capture_replaces_partial_response() {
        let trap = ErrorTrap::new();
        let mut guard = trap.begin();
        let mut ctx = make_context();

        // A failing middleware got halfway through building a response.
        ctx.response_mut().set_status(StatusCode::OK);
        ctx.response_mut().set_body("partial");
        ctx.response_mut().insert_header(
            http::header::ETAG,
            HeaderValue::from_static("\"stale\""),
        );

        guard.capture(&mut ctx, &StrataError::internal("died mid-flight"));

        assert_eq!(
            ctx.response().status(),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert!(ctx.response().headers().get(http::header::ETAG).is_none());
        assert_ne!(ctx.response().body().as_ref(), b"partial");
    }

    #[test]
    fn test_capture_is_exactly_once() {
        let trap = ErrorTrap::new();
        let mut guard = trap.begin();
        let mut ctx = make_context();

        guard.capture(&mut ctx, &StrataError::validation("first"));
        let first_body = ctx.response().body().clone();

        // A second capture must not rewrite the response.
        guard.capture(&mut ctx, &StrataError::internal("second"));
        assert_eq!(ctx.response().body(), &first_body);
        assert_eq!(ctx.response().status(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_double_next_maps_to_server_error() {
        let trap = ErrorTrap::new();
        let mut guard = trap.begin();
        let mut ctx = make_context();

        guard.capture(&mut ctx, &StrataError::DoubleNext { middleware: "cors" });

        assert_eq!(
            ctx.response().status(),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        let parsed: serde_json::Value =
            serde_json::from_slice(ctx.response().body()).unwrap();
        assert_eq!(parsed["error"]["code"], "DOUBLE_NEXT");
        // Defect detail (the stage name) is internal and stays out of the body.
        assert_eq!(parsed["error"]["message"], "An internal error occurred");
    }
}
