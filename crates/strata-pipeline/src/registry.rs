//! Ordered middleware registry.
//!
//! The [`Registry`] is the configuration object assembled at startup and
//! handed to the [`Dispatcher`](crate::Dispatcher), which snapshots it
//! into an immutable [`Chain`](crate::Chain). Registration order is
//! significant: it determines the order of pre-delegation work and the
//! reverse order of post-delegation work.
//!
//! The registry is an explicit value owned by the composition root, not
//! process-wide state; it is expected to be fully populated before the
//! server accepts traffic.

use strata_core::{StrataError, StrataResult};

use crate::middleware::{BoxedMiddleware, Middleware};

/// An ordered sequence of middleware stages.
///
/// # Example
///
/// ```ignore
/// let mut registry = Registry::new();
/// registry.register(StaticFiles::new("./public"))?;
/// registry.register(BodyDecoder::new())?;
/// registry.register(Cors::permissive())?;
/// registry.register(router)?;
/// ```
#[derive(Default)]
pub struct Registry {
    stages: Vec<BoxedMiddleware>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a middleware to the sequence.
    ///
    /// The middleware's capability is guaranteed by the trait bound; what
    /// remains to validate at registration time is name hygiene. Fails
    /// with [`StrataError::InvalidMiddleware`] when the stage name is
    /// empty or duplicates an already-registered stage.
    pub fn register<M: Middleware>(&mut self, middleware: M) -> StrataResult<()> {
        self.register_boxed(std::sync::Arc::new(middleware))
    }

    /// Appends an already type-erased middleware to the sequence.
    pub fn register_boxed(&mut self, middleware: BoxedMiddleware) -> StrataResult<()> {
        let name = middleware.name();
        if name.is_empty() {
            return Err(StrataError::invalid_middleware(
                "middleware stage name must not be empty",
            ));
        }
        if self.stages.iter().any(|stage| stage.name() == name) {
            return Err(StrataError::invalid_middleware(format!(
                "middleware stage `{name}` is already registered"
            )));
        }

        tracing::debug!(stage = name, position = self.stages.len(), "registered middleware");
        self.stages.push(middleware);
        Ok(())
    }

    /// Returns the current ordered sequence for composition.
    ///
    /// The snapshot shares the stage instances but not the sequence:
    /// registering after a snapshot was taken never affects a chain built
    /// from it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BoxedMiddleware> {
        self.stages.clone()
    }

    /// Returns the names of all registered stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if no middleware has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
