//! Chain composition.
//!
//! The [`Chain`] is the fully composed, immutable invocation structure
//! derived from a [`Registry`](crate::Registry) snapshot. Composition is
//! a right fold over the stage sequence: the seed is a terminal no-op
//! continuation, and each step wraps the accumulated continuation as the
//! `next` of the preceding middleware. Running the chain therefore
//! executes pre-`next` work in registration order and post-`next` work in
//! reverse registration order.

use strata_core::StrataResult;

use crate::context::Context;
use crate::middleware::{BoxedMiddleware, Next};

/// Name attributed to the chain entry point when composing the head
/// continuation. Only visible in defect reports if the dispatcher itself
/// were to run the head twice, which it never does.
const ENTRY: &str = "dispatcher";

/// The composed middleware chain for a pipeline.
///
/// Immutable once built; registering further middleware on the source
/// registry has no effect on an existing chain. Built once per
/// [`Dispatcher`](crate::Dispatcher), composed into a fresh borrowed
/// continuation per request.
pub struct Chain {
    stages: Vec<BoxedMiddleware>,
}

impl Chain {
    /// Builds a chain from an ordered stage snapshot.
    #[must_use]
    pub fn new(stages: Vec<BoxedMiddleware>) -> Self {
        Self { stages }
    }

    /// Returns the number of stages in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the chain has no stages.
    ///
    /// An empty chain is a no-op: running it settles immediately and
    /// leaves the context unmodified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stage names in invocation order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs the chain to settlement for one request.
    pub async fn run(&self, ctx: &mut Context) -> StrataResult<()> {
        let mut head = self.compose();
        head.run(ctx).await
    }

    /// Folds the stage sequence into the head continuation.
    ///
    /// Each `Next` records the name of the stage it is handed to, so a
    /// double invocation can be attributed to the misbehaving middleware.
    fn compose(&self) -> Next<'_> {
        let mut next = Next::terminal(self.stages.last().map_or(ENTRY, |stage| stage.name()));

        for (i, stage) in self.stages.iter().enumerate().rev() {
            let owner = if i == 0 {
                ENTRY
            } else {
                self.stages[i - 1].name()
            };
            next = Next::stage(owner, stage.as_ref(), next);
        }

        next
    }
}
