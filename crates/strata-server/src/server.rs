//! HTTP server front-end.
//!
//! The server owns the TCP accept loop and the hyper connection plumbing.
//! Its only job per request is to collect the body, hand the buffered
//! request to the [`Dispatcher`], and write the resulting response back;
//! every behavioral decision lives in the pipeline.
//!
//! Graceful shutdown: on signal the accept loop stops, in-flight
//! connections are drained up to the configured timeout, and connections
//! still running after that are dropped, cancelling their pipeline
//! futures at the next suspension point.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_pipeline::{Dispatcher, ErrorTrap, Registry};
//! use strata_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), strata_server::ServerError> {
//!     let registry = Registry::new();
//!     let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
//!
//!     let config = ServerConfig::builder().http_addr("0.0.0.0:8080").build();
//!     Server::new(config, dispatcher).run().await
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;

use strata_core::RequestId;
use strata_pipeline::types::error_envelope;
use strata_pipeline::{Dispatcher, Response, REQUEST_ID_HEADER};

use crate::config::ServerConfig;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address could not be bound.
    #[error("failed to bind: {0}")]
    Bind(String),
}

/// The strata HTTP server.
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Creates a server from its configuration and a built dispatcher.
    #[must_use]
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Runs the server until SIGTERM / Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Runs the server until the given shutdown signal triggers.
    ///
    /// Useful for tests and for embedding the server under an external
    /// lifecycle manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|e| {
            ServerError::Bind(format!(
                "invalid address '{}': {e}",
                self.config.http_addr()
            ))
        })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("failed to bind to {addr}: {e}")))?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already-bound listener.
    ///
    /// # Errors
    ///
    /// Currently infallible after binding; the `Result` is kept for
    /// symmetry with [`run_with_shutdown`](Self::run_with_shutdown).
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        if let Ok(local) = listener.local_addr() {
            tracing::info!("server listening on {local}");
        }

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) =
                                    server.handle_connection(stream, remote_addr, shutdown).await
                                {
                                    tracing::debug!("connection error from {remote_addr}: {e}");
                                }
                                drop(token);
                            });
                        }
                        Err(e) => {
                            tracing::error!("failed to accept connection: {e}");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    tracing::info!("shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout();
        tracing::info!(
            "waiting up to {timeout:?} for {} connections to close",
            tracker.active_connections()
        );

        tokio::select! {
            _ = tracker.drained() => {
                tracing::info!("all connections closed");
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    "shutdown timeout reached, {} connections still active",
                    tracker.active_connections()
                );
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }

    /// Handles a single connection until it closes or shutdown triggers.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);

        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { server.handle_request(req).await }
        });

        let conn = http1::Builder::new().serve_connection(io, service);

        tokio::select! {
            result = conn => result,
            _ = shutdown.recv() => {
                // Dropping the connection cancels its in-flight pipeline
                // futures at their next suspension point.
                tracing::debug!("connection from {remote_addr} closed due to shutdown");
                Ok(())
            }
        }
    }

    /// Collects the body and dispatches one request through the pipeline.
    async fn handle_request(
        self: &Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response, Infallible> {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::parse)
            .unwrap_or_default();

        let (mut parts, body) = req.into_parts();
        if !parts.headers.contains_key(REQUEST_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                parts.headers.insert(REQUEST_ID_HEADER, value);
            }
        }

        let body = match tokio::time::timeout(
            self.config.request_timeout(),
            Self::collect_body(body),
        )
        .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                tracing::warn!(request_id = %request_id, "failed to collect request body: {e}");
                return Ok(Self::error_response(
                    StatusCode::BAD_REQUEST,
                    "BODY_READ_ERROR",
                    "failed to read request body",
                    &request_id,
                ));
            }
            Err(_) => {
                tracing::warn!(request_id = %request_id, "request body collection timed out");
                return Ok(Self::error_response(
                    StatusCode::REQUEST_TIMEOUT,
                    "REQUEST_TIMEOUT",
                    "request body collection timed out",
                    &request_id,
                ));
            }
        };

        let request = Request::from_parts(parts, body);
        let dispatched = tokio::time::timeout(
            self.config.request_timeout(),
            self.dispatcher.handle(request),
        )
        .await;

        match dispatched {
            Ok(response) => Ok(response),
            Err(_) => {
                tracing::warn!(request_id = %request_id, "pipeline dispatch timed out");
                Ok(Self::error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    "TIMEOUT",
                    "request processing timed out",
                    &request_id,
                ))
            }
        }
    }

    /// Collects the request body into contiguous bytes.
    async fn collect_body(body: Incoming) -> Result<Bytes, hyper::Error> {
        let collected = body.collect().await?;
        Ok(collected.to_bytes())
    }

    /// Builds an error response for failures outside the pipeline.
    fn error_response(
        status: StatusCode,
        code: &str,
        message: &str,
        request_id: &RequestId,
    ) -> Response {
        let body = error_envelope(code, message, &request_id.to_string());
        let mut builder = http::Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            builder = builder.header(REQUEST_ID_HEADER, value);
        }
        builder
            .body(Full::new(body))
            .unwrap_or_else(|_| http::Response::new(Full::new(Bytes::new())))
    }
}
