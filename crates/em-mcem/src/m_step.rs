//! The maximization step: Subplex over the weighted expected log-likelihood.

use std::sync::Mutex;
use std::time::Instant;

use em_core::{ensure, Error, Params, Real, Result};
use em_math::array::Array;
use em_math::optimization::{OptStatus, Subplex};
use em_models::{Model, StateGuard};
use em_tree::Tree;
use rayon::prelude::*;

use crate::mcem::McemOptions;
use crate::resolve_threads;

/// Result of one M-step.
#[derive(Debug, Clone)]
pub struct MStep {
    /// Optimized parameter vector.
    pub estimates: Params,
    /// Optimizer status; `code()` is negative on failure, 0 on generic
    /// success, positive for a specific stop reason.
    pub opt: OptStatus,
    /// The minimized objective `−Σ wᵢ·loglik(pars, treeᵢ)`.
    pub minf: Real,
    /// Elapsed wall time in milliseconds.
    pub elapsed_ms: f64,
}

/// Maximize the weighted expected log-likelihood over the accepted trees,
/// starting from `pars`.
///
/// Bounds come from `options` when non-empty, else from the model's hints.
/// The objective is evaluated in parallel across trees when the model is
/// thread-safe, with per-tree model state.
pub fn m_step<M: Model>(
    pars: &[Real],
    trees: &[Tree],
    weights: &[Real],
    model: &M,
    options: &McemOptions,
) -> Result<MStep> {
    ensure!(
        trees.len() == weights.len(),
        "{} trees but {} weights",
        trees.len(),
        weights.len()
    );
    ensure!(!trees.is_empty(), "no trees, no optimization");
    let t0 = Instant::now();
    let num_threads = resolve_threads(options.num_threads, model.is_threadsafe());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| Error::InvalidArgument(format!("thread pool: {e}")))?;

    let mut states: Vec<StateGuard<'_, M>> = trees
        .iter()
        .map(|_| {
            let mut guard = StateGuard::new(model);
            guard.invalidate();
            guard
        })
        .collect();
    let model_err: Mutex<Option<Error>> = Mutex::new(None);

    let lower = if options.lower_bound.is_empty() {
        model.lower_bound()
    } else {
        options.lower_bound.clone()
    };
    let upper = if options.upper_bound.is_empty() {
        model.upper_bound()
    } else {
        options.upper_bound.clone()
    };

    let parallel = num_threads > 1;
    let objective = |x: &Array| -> Real {
        let pars = x.as_slice();
        let weighted = |guard: &mut StateGuard<'_, M>, tree: &Tree, w: Real| -> Real {
            match model.loglik(guard.state(), pars, tree) {
                Ok(loglik) => loglik * w,
                Err(e) => {
                    model_err.lock().unwrap().get_or_insert(e);
                    Real::NAN
                }
            }
        };
        let q: Real = if parallel {
            pool.install(|| {
                states
                    .par_iter_mut()
                    .zip(trees.par_iter())
                    .zip(weights.par_iter())
                    .map(|((guard, tree), &w)| weighted(guard, tree, w))
                    .sum()
            })
        } else {
            states
                .iter_mut()
                .zip(trees.iter())
                .zip(weights.iter())
                .map(|((guard, tree), &w)| weighted(guard, tree, w))
                .sum()
        };
        -q
    };

    let result = Subplex::new(options.xtol_rel).minimize(
        objective,
        &Array::from_slice(pars),
        &lower,
        &upper,
    )?;
    if let Some(e) = model_err.into_inner().unwrap() {
        return Err(e);
    }
    Ok(MStep {
        estimates: result.x.to_vec(),
        opt: result.status,
        minf: result.fmin,
        elapsed_ms: t0.elapsed().as_secs_f64() * 1e3,
    })
}
