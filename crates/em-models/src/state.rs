//! Scoped ownership of per-tree model state.

use crate::Model;

/// Owns the opaque per-tree state a model may allocate during a sequence of
/// queries, and guarantees `free_state` runs exactly once on every exit
/// path, including unwinding.
pub struct StateGuard<'m, M: Model> {
    model: &'m M,
    state: Option<M::State>,
}

impl<'m, M: Model> StateGuard<'m, M> {
    /// Acquire a guard for `model` with no state allocated yet.
    pub fn new(model: &'m M) -> Self {
        Self { model, state: None }
    }

    /// The state slot, for passing into model calls.
    pub fn state(&mut self) -> &mut Option<M::State> {
        &mut self.state
    }

    /// Force the model to drop any cached derived data.
    pub fn invalidate(&mut self) {
        self.model.invalidate_state(&mut self.state);
    }
}

impl<M: Model> Drop for StateGuard<'_, M> {
    fn drop(&mut self) {
        self.model.free_state(&mut self.state);
    }
}
