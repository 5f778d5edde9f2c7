//! Core middleware trait and the `Next` continuation.
//!
//! A middleware receives the mutable per-request [`Context`] and a [`Next`]
//! handle representing everything downstream of it. It may mutate the
//! context, run `next` to delegate, await the downstream result, and do
//! further work after `next` settles. Skipping `next` short-circuits the
//! chain; everything downstream is never invoked for that request.
//!
//! # Example
//!
//! ```ignore
//! use strata_pipeline::{BoxFuture, Context, Middleware, Next};
//! use strata_core::StrataResult;
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         ctx: &'a mut Context,
//!         mut next: Next<'a>,
//!     ) -> BoxFuture<'a, StrataResult<()>> {
//!         Box::pin(async move {
//!             next.run(ctx).await?;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "request finished");
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use strata_core::{StrataError, StrataResult};

use crate::context::Context;

/// A boxed future, as returned by middleware.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased middleware stage shared by all requests.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The capability every pipeline stage implements.
///
/// # Invariants
///
/// - A middleware runs `next` at most once per request; a second
///   invocation settles with [`StrataError::DoubleNext`].
/// - A middleware must not swallow errors from downstream stages unless
///   it deliberately converts them into a response.
/// - Synchronous and suspending middleware are treated uniformly: every
///   `handle` call settles with `Ok(())` or an error, whether or not it
///   awaited anything internally.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    ///
    /// The name is used for logging and for attributing defects such as
    /// a double `next` invocation. Names must be non-empty and unique
    /// within a [`Registry`](crate::Registry).
    fn name(&self) -> &'static str;

    /// Processes the request through this stage.
    ///
    /// Run `next` to delegate downstream; return without running it to
    /// short-circuit with whatever response is on the context.
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>>;
}

/// Handle to the remainder of the chain, handed to each middleware.
///
/// Running a `Next` executes the entire downstream chain; the returned
/// future resolves only once everything downstream (and everything it
/// transitively triggered) has settled. It is an ordinary future, so a
/// deadline can be raced against it:
///
/// ```ignore
/// match tokio::time::timeout(deadline, next.run(ctx)).await {
///     Ok(result) => result,
///     Err(_) => Err(StrataError::timeout("downstream deadline expired")),
/// }
/// ```
pub struct Next<'a> {
    /// Name of the middleware this handle was given to.
    owner: &'static str,

    /// The remaining chain; `None` once consumed.
    inner: Option<NextInner<'a>>,
}

enum NextInner<'a> {
    /// More middleware downstream.
    Stage {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain: a no-op that settles immediately.
    Terminal,
}

impl<'a> Next<'a> {
    /// Creates a terminal no-op continuation.
    ///
    /// Running it settles immediately without touching the context. This
    /// is the seed of every composed chain; it is public so a middleware
    /// can be exercised in isolation in tests:
    ///
    /// ```ignore
    /// let next = Next::terminal("my_stage");
    /// my_stage.handle(&mut ctx, next).await?;
    /// ```
    #[must_use]
    pub fn terminal(owner: &'static str) -> Self {
        Self {
            owner,
            inner: Some(NextInner::Terminal),
        }
    }

    /// Creates a continuation that will invoke `middleware` with `next`.
    pub(crate) fn stage(
        owner: &'static str,
        middleware: &'a dyn Middleware,
        next: Next<'a>,
    ) -> Self {
        Self {
            owner,
            inner: Some(NextInner::Stage {
                middleware,
                next: Box::new(next),
            }),
        }
    }

    /// Runs the downstream chain to settlement.
    ///
    /// The first invocation consumes the continuation; a second invocation
    /// for the same request is a programming defect in the calling
    /// middleware and settles with [`StrataError::DoubleNext`], which the
    /// error trap converts into a server-error response.
    pub async fn run(&mut self, ctx: &mut Context) -> StrataResult<()> {
        match self.inner.take() {
            None => Err(StrataError::DoubleNext {
                middleware: self.owner,
            }),
            Some(NextInner::Terminal) => Ok(()),
            Some(NextInner::Stage { middleware, next }) => middleware.handle(ctx, *next).await,
        }
    }
}

/// A middleware defined by a function or closure.
///
/// Allows small stages without a dedicated type. The closure must return
/// a boxed future:
///
/// ```ignore
/// let stage = FnMiddleware::new("marker", |ctx, mut next| {
///     Box::pin(async move {
///         next.run(ctx).await?;
///         Ok(())
///     })
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, StrataResult<()>>
        + Send
        + Sync
        + 'static,
{
    /// Creates a new function-based middleware with the given stage name.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, StrataResult<()>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        (self.func)(ctx, next)
    }
}
