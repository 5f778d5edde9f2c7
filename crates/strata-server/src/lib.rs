//! # Strata Server
//!
//! HTTP server front-end and filesystem-backed stages for the strata
//! pipeline.
//!
//! This crate provides:
//!
//! - [`Server`] - hyper/tokio accept loop with graceful shutdown that
//!   feeds buffered requests into a [`Dispatcher`](strata_pipeline::Dispatcher)
//! - [`ServerConfig`] - explicit configuration assembled at startup
//! - [`StaticFiles`] - static file serving middleware
//! - [`Router`] - terminal routing middleware with `{param}` captures
//! - [`ShutdownSignal`] / [`shutdown::ConnectionTracker`] - shutdown
//!   coordination primitives

#![doc(html_root_url = "https://docs.rs/strata-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod router;
mod server;
pub mod shutdown;
mod static_files;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use router::{Params, RouteHandler, Router};
pub use server::{Server, ServerError};
pub use shutdown::ShutdownSignal;
pub use static_files::StaticFiles;
