//! # Strata
//!
//! **An onion-model HTTP middleware pipeline for Rust services**
//!
//! Strata composes an ordered sequence of middleware into a single
//! request-processing chain. Each stage may act before and after
//! delegating downstream, short-circuit with its own response, or fail --
//! in which case the built-in error trap converts the failure into a
//! well-formed response. No request goes unanswered.
//!
//! ```text
//! Request → static_files → body_decoder → cors → router ─┐
//!                                                        │
//! Response ←──────────────── cors (headers) ←────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = Registry::new();
//!     registry.register(StaticFiles::new("./public").index("index.html"))?;
//!     registry.register(BodyDecoder::new())?;
//!     registry.register(Cors::permissive())?;
//!     registry.register(Router::new().get("/hello", hello))?;
//!
//!     let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
//!     let config = ServerConfig::builder().http_addr("0.0.0.0:8080").build();
//!     Server::new(config, dispatcher).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/strata/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use strata_core as core;

// Re-export the pipeline
pub use strata_pipeline as pipeline;

// Re-export server types
pub use strata_server as server;

// Re-export telemetry setup
pub use strata_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use strata::prelude::*;
///
/// let mut registry = Registry::new();
/// registry.register(BodyDecoder::new()).unwrap();
/// let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
/// assert_eq!(dispatcher.chain().len(), 1);
/// ```
pub mod prelude {
    pub use strata_core::{RequestId, StrataError, StrataResult};
    pub use strata_pipeline::stages::{BodyDecoder, Cors, DecodedBody};
    pub use strata_pipeline::{
        BoxFuture, Context, Dispatcher, ErrorTrap, FnMiddleware, Middleware, Next, Registry,
    };
    pub use strata_server::{
        Params, Router, Server, ServerConfig, ShutdownSignal, StaticFiles,
    };
    pub use strata_telemetry::{init_logging, LogConfig};
}
