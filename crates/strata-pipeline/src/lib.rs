//! # Strata Pipeline
//!
//! Onion-model middleware pipeline for the strata framework.
//!
//! An ordered chain of independent middleware cooperatively inspects,
//! transforms, and responds to each incoming request. Every stage
//! receives the mutable per-request [`Context`] and a [`Next`] handle to
//! the rest of the chain; it may delegate, short-circuit, and do work on
//! both sides of the delegation:
//!
//! ```text
//! Request → a:pre → b:pre → c:pre ─┐
//!                                  │  (terminal no-op)
//! Response ← a:post ← b:post ← c:post
//! ```
//!
//! Pre-delegation work runs in registration order, post-delegation work
//! in reverse registration order. A stage that never runs `next` resolves
//! the request on its own and nothing downstream executes.
//!
//! ## Composition
//!
//! Middleware are collected in a [`Registry`] at startup, snapshotted
//! into an immutable [`Chain`] by the [`Dispatcher`], and driven once per
//! request. Failures anywhere in the chain are intercepted by the
//! [`ErrorTrap`], which is part of the dispatcher itself — outermost by
//! construction — so every request receives a well-formed response.
//!
//! ## Example
//!
//! ```
//! use strata_pipeline::stages::{BodyDecoder, Cors};
//! use strata_pipeline::{Dispatcher, ErrorTrap, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register(BodyDecoder::new()).unwrap();
//! registry.register(Cors::permissive()).unwrap();
//!
//! let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
//! assert_eq!(dispatcher.chain().stage_names(), vec!["body_decoder", "cors"]);
//! ```

#![doc(html_root_url = "https://docs.rs/strata-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod chain;
mod context;
mod dispatch;
mod middleware;
mod registry;
pub mod stages;
mod trap;
pub mod types;

pub use chain::Chain;
pub use context::{Context, ResponseParts};
pub use dispatch::{Dispatcher, REQUEST_ID_HEADER};
pub use middleware::{BoxFuture, BoxedMiddleware, FnMiddleware, Middleware, Next};
pub use registry::Registry;
pub use trap::{ErrorTrap, TrapGuard, TrapState};
pub use types::{Request, Response};
