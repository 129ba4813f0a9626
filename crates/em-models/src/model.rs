//! The diversification-model interface.

use em_core::{Params, Real, Result, Time};
use em_math::random_numbers::Reng;
use em_tree::Tree;

/// A stochastic birth–death diversification model.
///
/// Implementations answer rate and likelihood queries about a tree.  A
/// non-finite return value is a *signal*, not an error: the E-step treats it
/// as a zero-weight tree and the optimizer as `±∞`.  A genuine failure is
/// reported as `Err` and is fatal to the surrounding E-step.
///
/// Models may memoize per-tree derived data in an associated [`Model::State`]
/// value, passed by `&mut Option<_>`.  The state is created lazily on first
/// use, invalidated whenever the tree mutates, and freed by the owning
/// [`crate::StateGuard`].
pub trait Model: Send + Sync {
    /// Opaque per-tree scratch state.
    type State: Send;

    /// Textual description of the model.
    fn description(&self) -> &'static str {
        "not set"
    }

    /// Whether distinct threads may call non-state-mutating methods
    /// concurrently with distinct state objects.
    fn is_threadsafe(&self) -> bool {
        false
    }

    /// Parameter arity.
    fn nparams(&self) -> usize;

    /// Release per-tree state.
    fn free_state(&self, state: &mut Option<Self::State>) {
        *state = None;
    }

    /// Drop any cached derived data; the tree is about to change or has
    /// changed.
    fn invalidate_state(&self, _state: &mut Option<Self::State>) {}

    /// Sample an extinction time for a species that appears at `t_spec`.
    fn extinction_time(
        &self,
        state: &mut Option<Self::State>,
        t_spec: Time,
        pars: &[Real],
        tree: &Tree,
        rng: &mut Reng,
    ) -> Result<Real>;

    /// The instantaneous per-lineage speciation rate λ(t), clamped to 0
    /// where the analytic formula would be negative.
    fn speciation_rate(
        &self,
        state: &mut Option<Self::State>,
        t: Time,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real>;

    /// The non-homogeneous thinning rate used by augmentation:
    /// `λ(t)·N(t)·(1 − exp(−μ·(t_end − t)))`.
    fn nh_rate(
        &self,
        state: &mut Option<Self::State>,
        t: Time,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real>;

    /// The integrated augmentation intensity over the whole tree.
    fn intensity(
        &self,
        state: &mut Option<Self::State>,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real>;

    /// Log density that augmentation would produce exactly this augmented
    /// tree; the denominator of the importance weight.
    fn sampling_prob(
        &self,
        state: &mut Option<Self::State>,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real>;

    /// Complete-data log-likelihood of the (possibly augmented) tree.
    fn loglik(
        &self,
        state: &mut Option<Self::State>,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real>;

    /// Optimizer hint: lower parameter bounds.  May be empty.
    fn lower_bound(&self) -> Params {
        Params::new()
    }

    /// Optimizer hint: upper parameter bounds.  May be empty.
    fn upper_bound(&self) -> Params {
        Params::new()
    }
}
